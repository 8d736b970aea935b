/// 节点账本服务
///
/// 每个节点一条账本记录（容量 + 用量），按节点名推导的键持久化。
/// 读-改-写路径带版本号写回，并发更新冲突以 StoreConflict 报出

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use common::models::{
    NodeResource, NodeResourceInfo, NodeResourceRequest, WorkloadResource,
    WorkloadResourceRequest,
};
use common::{Error, Result};

use crate::store::{KvStore, PutCondition};

const NODE_RESOURCE_KEY_PREFIX: &str = "/resource/rbd/";

/// 注册节点时未显式给出容量则视为不设上限
const MAX_CAPACITY: i64 = i64::MAX;

/// 最空闲节点的调度优先级
const PRIORITY: i64 = 100;

fn node_resource_key(nodename: &str) -> String {
    format!("{NODE_RESOURCE_KEY_PREFIX}{nodename}")
}

pub struct NodeService {
    store: Arc<dyn KvStore>,
}

/// 单节点的部署容量估算
#[derive(Debug, Clone, Serialize)]
pub struct NodeDeployCapacity {
    pub weight: i64,
    /// 还能容纳多少个副本
    pub capacity: i64,
    /// usage / capacity
    pub usage: f64,
    /// 请求大小 / capacity
    pub rate: f64,
}

/// get_nodes_deploy_capacity 的返回
#[derive(Debug, Clone, Serialize)]
pub struct NodesDeployCapacity {
    pub nodes: HashMap<String, NodeDeployCapacity>,
    pub total: i64,
}

/// get_most_idle_node 的返回
#[derive(Debug, Clone, Serialize)]
pub struct MostIdleNode {
    pub nodename: String,
    pub priority: i64,
}

/// 资源更新前后的快照
#[derive(Debug, Clone, Serialize)]
pub struct ResourceChange {
    pub before: NodeResource,
    pub after: NodeResource,
}

/// 节点资源信息与用量差异诊断
#[derive(Debug, Clone, Serialize)]
pub struct NodeResourceReport {
    pub capacity: NodeResource,
    pub usage: NodeResource,
    pub diffs: Vec<String>,
}

impl NodeService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// 注册节点；容量请求为 0 时默认不设上限
    pub async fn add_node(
        &self,
        nodename: &str,
        req: &NodeResourceRequest,
    ) -> Result<NodeResourceInfo> {
        if self.try_get(nodename).await?.is_some() {
            return Err(Error::NodeExists(nodename.to_string()));
        }

        let size = if req.size_in_bytes == 0 {
            MAX_CAPACITY
        } else {
            req.size_in_bytes
        };
        let info = NodeResourceInfo {
            capacity: NodeResource::new(size),
            usage: NodeResource::new(0),
        };

        self.put(nodename, &info, PutCondition::IfAbsent).await?;
        info!("节点 {nodename} 注册成功，容量 {size}");
        Ok(info)
    }

    pub async fn remove_node(&self, nodename: &str) -> Result<()> {
        if let Err(err) = self.store.delete(&node_resource_key(nodename)).await {
            error!("删除节点 {nodename} 失败: {err}");
            return Err(err);
        }
        Ok(())
    }

    /// 读取节点账本，同时返回记录版本供写回使用
    pub async fn get(&self, nodename: &str) -> Result<(NodeResourceInfo, u64)> {
        self.try_get(nodename)
            .await?
            .ok_or_else(|| Error::NodeNotExists(nodename.to_string()))
    }

    async fn try_get(&self, nodename: &str) -> Result<Option<(NodeResourceInfo, u64)>> {
        match self.store.get(&node_resource_key(nodename)).await? {
            Some(entry) => {
                let info: NodeResourceInfo = serde_json::from_str(&entry.value)?;
                Ok(Some((info, entry.version)))
            }
            None => Ok(None),
        }
    }

    /// 批量读取账本；缺失的节点被跳过，顺序与入参一致
    pub async fn get_multi(
        &self,
        nodenames: &[String],
    ) -> Result<Vec<(String, NodeResourceInfo)>> {
        let keys: Vec<String> = nodenames
            .iter()
            .map(|nodename| node_resource_key(nodename))
            .collect();
        let entries = self.store.get_multi(&keys).await?;

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let info: NodeResourceInfo = serde_json::from_str(&entry.value)?;
            let nodename = entry
                .key
                .strip_prefix(NODE_RESOURCE_KEY_PREFIX)
                .unwrap_or(&entry.key)
                .to_string();
            result.push((nodename, info));
        }
        Ok(result)
    }

    async fn put(
        &self,
        nodename: &str,
        info: &NodeResourceInfo,
        cond: PutCondition,
    ) -> Result<u64> {
        info.validate()?;
        let data = serde_json::to_string(info)?;
        self.store
            .put(&node_resource_key(nodename), &data, cond)
            .await
    }

    /// 估算每个节点还能部署多少副本
    pub async fn get_nodes_deploy_capacity(
        &self,
        nodenames: &[String],
        req: &WorkloadResourceRequest,
    ) -> Result<NodesDeployCapacity> {
        req.validate()?;
        let total_size = req.volumes.total_size();
        if total_size <= 0 {
            return Err(Error::InvalidParams(
                "请求的卷总大小必须为正".to_string(),
            ));
        }

        let mut nodes = HashMap::new();
        let mut total = 0;
        for (nodename, info) in self.get_multi(nodenames).await? {
            if info.cap_size() == 0 {
                return Err(Error::InvalidParams(format!("节点容量为零: {nodename}")));
            }
            let count = info.available_size() / total_size;
            total += count;
            nodes.insert(
                nodename,
                NodeDeployCapacity {
                    weight: 1,
                    capacity: count,
                    usage: info.usage_size() as f64 / info.cap_size() as f64,
                    rate: total_size as f64 / info.cap_size() as f64,
                },
            );
        }
        Ok(NodesDeployCapacity { nodes, total })
    }

    /// 用量占比最低的节点，占比相同时先出现的胜出
    pub async fn get_most_idle_node(&self, nodenames: &[String]) -> Result<MostIdleNode> {
        if nodenames.is_empty() {
            return Err(Error::InvalidParams("节点列表为空".to_string()));
        }

        let mut most_idle: Option<(String, f64)> = None;
        for (nodename, info) in self.get_multi(nodenames).await? {
            if info.cap_size() == 0 {
                return Err(Error::InvalidParams(format!("节点容量为零: {nodename}")));
            }
            let idle = info.usage_size() as f64 / info.cap_size() as f64;
            if most_idle.as_ref().map_or(true, |(_, min)| idle < *min) {
                most_idle = Some((nodename, idle));
            }
        }

        match most_idle {
            Some((nodename, _)) => Ok(MostIdleNode {
                nodename,
                priority: PRIORITY,
            }),
            None => Err(Error::NodeNotExists(nodenames.join(","))),
        }
    }

    /// 直接覆盖节点的容量与用量
    pub async fn set_node_resource_info(
        &self,
        nodename: &str,
        capacity: NodeResource,
        usage: NodeResource,
    ) -> Result<()> {
        let info = NodeResourceInfo { capacity, usage };
        self.put(nodename, &info, PutCondition::Always).await?;
        Ok(())
    }

    /// 更新节点容量，返回更新前后的快照
    pub async fn set_node_resource_capacity(
        &self,
        nodename: &str,
        resource: Option<NodeResource>,
        request: Option<NodeResourceRequest>,
        delta: bool,
        incr: bool,
    ) -> Result<ResourceChange> {
        let (mut info, version) = self.get(nodename).await?;
        let before = info.capacity;

        info.capacity = calculate_node_resource(
            request.as_ref(),
            resource.as_ref(),
            Some(&info.capacity),
            &[],
            delta,
            incr,
        );

        self.put(nodename, &info, PutCondition::IfVersion(version))
            .await?;
        Ok(ResourceChange {
            before,
            after: info.capacity,
        })
    }

    /// 更新节点用量，返回更新前后的快照
    pub async fn set_node_resource_usage(
        &self,
        nodename: &str,
        resource: Option<NodeResource>,
        request: Option<NodeResourceRequest>,
        workloads: &[WorkloadResource],
        delta: bool,
        incr: bool,
    ) -> Result<ResourceChange> {
        let (mut info, version) = self.get(nodename).await?;
        let before = info.usage;

        info.usage = calculate_node_resource(
            request.as_ref(),
            resource.as_ref(),
            Some(&info.usage),
            workloads,
            delta,
            incr,
        );

        self.put(nodename, &info, PutCondition::IfVersion(version))
            .await?;
        Ok(ResourceChange {
            before,
            after: info.usage,
        })
    }

    /// 读取节点资源信息，并给出与工作负载实际用量的差异诊断
    pub async fn get_node_resource_info(
        &self,
        nodename: &str,
        workloads: &[WorkloadResource],
    ) -> Result<NodeResourceReport> {
        let (info, _, _, diffs) = self.diff_node_resource(nodename, workloads).await?;
        Ok(NodeResourceReport {
            capacity: info.capacity,
            usage: info.usage,
            diffs,
        })
    }

    /// 用工作负载列表校正节点用量
    ///
    /// 差异只作为诊断信息放进返回值；校正写回失败也不报错，
    /// 把错误追加到诊断里交给调用方处理
    pub async fn fix_node_resource(
        &self,
        nodename: &str,
        workloads: &[WorkloadResource],
    ) -> Result<NodeResourceReport> {
        let (mut info, version, actual, mut diffs) =
            self.diff_node_resource(nodename, workloads).await?;

        if !diffs.is_empty() {
            info.usage = NodeResource::new(actual.size());
            if let Err(err) = self
                .put(nodename, &info, PutCondition::IfVersion(version))
                .await
            {
                error!("校正节点 {nodename} 用量失败: {err}");
                diffs.push(err.to_string());
            } else {
                warn!("节点 {nodename} 用量已校正为 {}", actual.size());
            }
        }

        Ok(NodeResourceReport {
            capacity: info.capacity,
            usage: info.usage,
            diffs,
        })
    }

    async fn diff_node_resource(
        &self,
        nodename: &str,
        workloads: &[WorkloadResource],
    ) -> Result<(NodeResourceInfo, u64, WorkloadResource, Vec<String>)> {
        let (info, version) = self.get(nodename).await?;

        let mut actual = WorkloadResource::default();
        for workload in workloads {
            actual.add(workload);
        }

        let mut diffs = Vec::new();
        if actual.size() != info.usage_size() {
            diffs.push(format!(
                "节点记录的用量与工作负载实际用量不一致: {} != {}",
                info.usage_size(),
                actual.size()
            ));
        }

        Ok((info, version, actual, diffs))
    }
}

/// 计算新的资源值
///
/// 输入优先级: 显式请求 > 显式资源值 > 工作负载列表求和，只应用最高优先级的一项。
/// delta 为真时在原值上增量加减，否则从零开始全量覆盖
pub(crate) fn calculate_node_resource(
    req: Option<&NodeResourceRequest>,
    resource: Option<&NodeResource>,
    origin: Option<&NodeResource>,
    workloads: &[WorkloadResource],
    delta: bool,
    incr: bool,
) -> NodeResource {
    let applied = req
        .map(|r| NodeResource::new(r.size_in_bytes))
        .or(resource.copied());

    if delta {
        let mut resp = origin.copied().unwrap_or_default();
        match applied {
            Some(value) => {
                if incr {
                    resp.add(&value);
                } else {
                    resp.sub(&value);
                }
            }
            None => {
                for workload in workloads {
                    let value = NodeResource::new(workload.size());
                    if incr {
                        resp.add(&value);
                    } else {
                        resp.sub(&value);
                    }
                }
            }
        }
        resp
    } else {
        let mut resp = NodeResource::default();
        match applied {
            Some(value) => resp.add(&value),
            None => {
                for workload in workloads {
                    resp.add(&NodeResource::new(workload.size()));
                }
            }
        }
        resp
    }
}
