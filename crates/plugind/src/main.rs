/// RBD 资源插件入口
///
/// 每次调用执行一个子命令：载荷从标准输入读 JSON，结果以 JSON 写标准输出。
/// 标准输出是协议通道，日志一律走标准错误

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::debug;

use rbd::backend::rbd::RbdCliBackend;
use rbd::config::Config;
use rbd::idgen::UuidGenerator;
use rbd::store::file::FileStore;
use rbd::Plugin;

mod payload;

use payload::*;

#[derive(Parser)]
#[command(name = "rbd-plugind", about = "RBD 块存储资源插件", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 插件名
    Name,
    /// 指标描述
    MetricsDescription,
    /// 节点指标取值
    GetMetrics,
    /// 注册节点
    AddNode,
    /// 注销节点
    RemoveNode,
    /// 估算各节点还能部署的副本数
    GetNodesDeployCapacity,
    /// 用量占比最低的节点
    GetMostIdleNode,
    /// 节点资源信息与差异诊断
    GetNodeResourceInfo,
    /// 覆盖节点资源信息
    SetNodeResourceInfo,
    /// 更新节点容量
    SetNodeResourceCapacity,
    /// 更新节点用量
    SetNodeResourceUsage,
    /// 按工作负载校正节点用量
    FixNodeResource,
    /// 计算部署方案
    CalculateDeploy,
    /// 计算重分配方案
    CalculateRealloc,
    /// 节点内重排的引擎参数（恒为空）
    CalculateRemap,
    /// 把卷绑定落实到存储后端
    Provision,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let cli = Cli::parse();

    let store = Arc::new(FileStore::open(&config.store_path).await?);
    let backend = Arc::new(RbdCliBackend::new(&config));
    let plugin = Plugin::new(config, store, backend, Arc::new(UuidGenerator));

    match cli.command {
        Command::Name => {
            println!("{}", plugin.name());
        }
        Command::MetricsDescription => {
            respond(&rbd::metrics::metrics_description())?;
        }
        Command::GetMetrics => {
            let payload: GetMetricsPayload = read_payload().await?;
            respond(
                &plugin
                    .get_metrics(&payload.podname, &payload.nodename)
                    .await?,
            )?;
        }
        Command::AddNode => {
            let payload: AddNodePayload = read_payload().await?;
            respond(
                &plugin
                    .node()
                    .add_node(&payload.nodename, &payload.resource)
                    .await?,
            )?;
        }
        Command::RemoveNode => {
            let payload: NodePayload = read_payload().await?;
            plugin.node().remove_node(&payload.nodename).await?;
            respond(&serde_json::json!({}))?;
        }
        Command::GetNodesDeployCapacity => {
            let payload: GetNodesDeployCapacityPayload = read_payload().await?;
            respond(
                &plugin
                    .node()
                    .get_nodes_deploy_capacity(&payload.nodenames, &payload.request)
                    .await?,
            )?;
        }
        Command::GetMostIdleNode => {
            let payload: NodesPayload = read_payload().await?;
            respond(&plugin.node().get_most_idle_node(&payload.nodenames).await?)?;
        }
        Command::GetNodeResourceInfo => {
            let payload: NodeWorkloadsPayload = read_payload().await?;
            respond(
                &plugin
                    .node()
                    .get_node_resource_info(&payload.nodename, &payload.workloads)
                    .await?,
            )?;
        }
        Command::SetNodeResourceInfo => {
            let payload: SetNodeResourceInfoPayload = read_payload().await?;
            plugin
                .node()
                .set_node_resource_info(&payload.nodename, payload.capacity, payload.usage)
                .await?;
            respond(&serde_json::json!({}))?;
        }
        Command::SetNodeResourceCapacity => {
            let payload: SetNodeResourcePayload = read_payload().await?;
            respond(
                &plugin
                    .node()
                    .set_node_resource_capacity(
                        &payload.nodename,
                        payload.resource,
                        payload.request,
                        payload.delta,
                        payload.incr,
                    )
                    .await?,
            )?;
        }
        Command::SetNodeResourceUsage => {
            let payload: SetNodeResourcePayload = read_payload().await?;
            respond(
                &plugin
                    .node()
                    .set_node_resource_usage(
                        &payload.nodename,
                        payload.resource,
                        payload.request,
                        &payload.workloads,
                        payload.delta,
                        payload.incr,
                    )
                    .await?,
            )?;
        }
        Command::FixNodeResource => {
            let payload: NodeWorkloadsPayload = read_payload().await?;
            respond(
                &plugin
                    .node()
                    .fix_node_resource(&payload.nodename, &payload.workloads)
                    .await?,
            )?;
        }
        Command::CalculateDeploy => {
            let payload: CalculateDeployPayload = read_payload().await?;
            respond(
                &plugin
                    .calculate()
                    .calculate_deploy(&payload.nodename, payload.deploy_count, &payload.request)
                    .await?,
            )?;
        }
        Command::CalculateRealloc => {
            let payload: CalculateReallocPayload = read_payload().await?;
            respond(
                &plugin
                    .calculate()
                    .calculate_realloc(
                        &payload.nodename,
                        &payload.workload_resource,
                        &payload.request,
                    )
                    .await?,
            )?;
        }
        Command::CalculateRemap => {
            let payload: CalculateRemapPayload = read_payload().await?;
            respond(&plugin.calculate().calculate_remap(&payload.workloads))?;
        }
        Command::Provision => {
            let payload: ProvisionPayload = read_payload().await?;
            plugin
                .provisioner()
                .provision(&payload.request.volumes)
                .await?;
            respond(&serde_json::json!({}))?;
        }
    }

    Ok(())
}

/// 把标准输入整体读完并按 JSON 解析
async fn read_payload<T: DeserializeOwned>() -> anyhow::Result<T> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    debug!("载荷: {buf}");
    Ok(serde_json::from_str(&buf)?)
}

fn respond<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
