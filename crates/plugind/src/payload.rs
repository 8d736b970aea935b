/// 子命令的标准输入载荷
///
/// 调度器以 JSON 形式从标准输入传参，这里为每个子命令定义载荷结构

use serde::Deserialize;

use common::models::{
    NodeResource, NodeResourceRequest, WorkloadResource, WorkloadResourceRequest,
};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AddNodePayload {
    pub nodename: String,
    #[serde(default)]
    pub resource: NodeResourceRequest,
}

#[derive(Debug, Deserialize)]
pub struct NodePayload {
    pub nodename: String,
}

#[derive(Debug, Deserialize)]
pub struct NodesPayload {
    pub nodenames: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetNodesDeployCapacityPayload {
    pub nodenames: Vec<String>,
    #[serde(flatten)]
    pub request: WorkloadResourceRequest,
}

/// 容量/用量更新载荷
///
/// resource 与 request 二选一给出新值，都缺省时用 workloads 求和；
/// delta 控制增量还是覆盖，incr 控制增量方向
#[derive(Debug, Deserialize)]
pub struct SetNodeResourcePayload {
    pub nodename: String,
    #[serde(default)]
    pub resource: Option<NodeResource>,
    #[serde(default)]
    pub request: Option<NodeResourceRequest>,
    #[serde(default)]
    pub workloads: Vec<WorkloadResource>,
    #[serde(default)]
    pub delta: bool,
    #[serde(default = "default_true")]
    pub incr: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetNodeResourceInfoPayload {
    pub nodename: String,
    pub capacity: NodeResource,
    pub usage: NodeResource,
}

#[derive(Debug, Deserialize)]
pub struct NodeWorkloadsPayload {
    pub nodename: String,
    #[serde(default)]
    pub workloads: Vec<WorkloadResource>,
}

#[derive(Debug, Deserialize)]
pub struct GetMetricsPayload {
    pub podname: String,
    pub nodename: String,
}

#[derive(Debug, Deserialize)]
pub struct CalculateDeployPayload {
    pub nodename: String,
    pub deploy_count: usize,
    #[serde(flatten)]
    pub request: WorkloadResourceRequest,
}

#[derive(Debug, Deserialize)]
pub struct CalculateReallocPayload {
    pub nodename: String,
    /// 工作负载当前占用的资源
    #[serde(default, alias = "old")]
    pub workload_resource: WorkloadResource,
    #[serde(flatten)]
    pub request: WorkloadResourceRequest,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRemapPayload {
    #[serde(default)]
    pub workloads: std::collections::HashMap<String, WorkloadResource>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionPayload {
    #[serde(flatten)]
    pub request: WorkloadResourceRequest,
}
