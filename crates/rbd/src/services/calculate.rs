/// 部署与重分配计算引擎
///
/// 纯记账：只根据账本状态计算分配方案，不触碰存储后端。
/// 卷的真实创建/扩容由调用方在计算之后通过 Provisioner 显式完成

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use common::models::{
    EngineParams, VolumeBindings, WorkloadResource, WorkloadResourceRequest,
};
use common::utils::format_bytes;
use common::{Error, Result};

use crate::idgen::IdGenerator;
use crate::services::node::NodeService;

pub struct CalculateService {
    node: NodeService,
    idgen: Arc<dyn IdGenerator>,
    default_pool: String,
}

/// calculate_deploy 的返回：每个副本一份引擎参数和一份资源记录
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    pub engines_params: Vec<EngineParams>,
    pub workloads_resource: Vec<WorkloadResource>,
}

/// calculate_realloc 的返回
#[derive(Debug, Clone, Serialize)]
pub struct ReallocPlan {
    pub engine_params: EngineParams,
    pub delta_resource: WorkloadResource,
    pub workload_resource: WorkloadResource,
}

/// calculate_remap 的返回
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemapPlan {
    pub engine_params_map: HashMap<String, EngineParams>,
}

impl CalculateService {
    pub fn new(node: NodeService, idgen: Arc<dyn IdGenerator>, default_pool: String) -> Self {
        Self {
            node,
            idgen,
            default_pool,
        }
    }

    /// 为一次部署计算每个副本的卷分配
    ///
    /// 容量检查先于一切副作用：可用量必须覆盖 deploy_count 份请求总量
    pub async fn calculate_deploy(
        &self,
        nodename: &str,
        deploy_count: usize,
        req: &WorkloadResourceRequest,
    ) -> Result<DeployPlan> {
        req.validate().map_err(|err| {
            warn!("非法的资源请求: {err}");
            err
        })?;

        let (node_info, _) = self.node.get(nodename).await?;
        let total_size = req.volumes.total_size();
        let required = (deploy_count as i64).checked_mul(total_size).ok_or_else(|| {
            Error::InvalidParams(format!(
                "请求总量溢出: {deploy_count} x {total_size}"
            ))
        })?;
        let available = node_info.available_size();
        if available < required {
            return Err(Error::InsufficientResource(format!(
                "节点 {nodename} 可用 {}，需要 {}",
                format_bytes(available),
                format_bytes(required)
            )));
        }

        let mut engines_params = Vec::with_capacity(deploy_count);
        let mut workloads_resource = Vec::with_capacity(deploy_count);
        for _ in 0..deploy_count {
            // 每个副本独立克隆请求并生成自己的镜像名
            let assigned = self.assign_bindings(&req.volumes);
            engines_params.push(self.render_engine_params(&assigned, false));
            workloads_resource.push(WorkloadResource::new(assigned));
        }

        info!(
            "节点 {nodename} 分配 {deploy_count} 副本，共 {}",
            format_bytes(required)
        );
        Ok(DeployPlan {
            engines_params,
            workloads_resource,
        })
    }

    /// 对已有工作负载做增量重分配
    ///
    /// 请求与原资源按身份键加法合并，负值缩容，合并后不为正的卷被删除。
    /// 容量检查把原有占用先归还资源池再算
    pub async fn calculate_realloc(
        &self,
        nodename: &str,
        origin: &WorkloadResource,
        req: &WorkloadResourceRequest,
    ) -> Result<ReallocPlan> {
        req.validate()?;
        origin.volumes.validate()?;

        let (node_info, _) = self.node.get(nodename).await?;

        let merged = VolumeBindings::merge(&origin.volumes, &[&req.volumes]);
        let assigned = self.assign_bindings(&merged);
        let target = WorkloadResource::new(assigned);
        // 合并结果可能引入单个输入里没有的冲突，比如两个来源共用同一目的路径
        target.volumes.validate()?;

        // 原有占用先归还，只比较净增量，避免与无上限容量相加
        let growth = target.size().saturating_sub(origin.size());
        if growth > node_info.available_size() {
            return Err(Error::InsufficientResource(format!(
                "节点 {nodename} 可用 {}，重分配还需 {}",
                format_bytes(node_info.available_size()),
                format_bytes(growth)
            )));
        }

        // 只有成员集合变化才算卷变更，单纯的尺寸调整不触发重新挂载
        let origin_keys: HashSet<_> = origin.volumes.iter().map(|vb| vb.map_key()).collect();
        let target_keys: HashSet<_> = target.volumes.iter().map(|vb| vb.map_key()).collect();
        let volume_changed = origin_keys != target_keys;

        let engine_params = self.render_engine_params(&target.volumes, volume_changed);
        let delta_resource = delta_workload_resource(origin, &target);

        Ok(ReallocPlan {
            engine_params,
            delta_resource,
            workload_resource: target,
        })
    }

    /// 节点内重排不改变卷绑定，引擎参数恒为空
    pub fn calculate_remap(
        &self,
        _workloads: &HashMap<String, WorkloadResource>,
    ) -> RemapPlan {
        RemapPlan::default()
    }

    /// 补全默认 pool，为未命名镜像生成名字
    fn assign_bindings(&self, volumes: &VolumeBindings) -> VolumeBindings {
        let mut assigned = Vec::with_capacity(volumes.len());
        for vb in volumes.iter() {
            let mut vb = vb.clone();
            if vb.pool.is_empty() {
                vb.pool = self.default_pool.clone();
            }
            if vb.image.is_empty() {
                vb.image = format!("img-{}", self.idgen.generate_id());
            }
            assigned.push(vb);
        }
        VolumeBindings(assigned)
    }

    fn render_engine_params(
        &self,
        volumes: &VolumeBindings,
        volume_changed: bool,
    ) -> EngineParams {
        EngineParams {
            volumes: volumes
                .iter()
                .map(|vb| vb.to_volume_string(true))
                .collect(),
            volume_changed,
            storage: volumes.total_size(),
        }
    }
}

/// 计算目标资源相对原始资源的增量
///
/// 目标里已有的绑定取尺寸差，新出现的绑定整体计入
pub fn delta_workload_resource(
    origin: &WorkloadResource,
    target: &WorkloadResource,
) -> WorkloadResource {
    let mut bindings = Vec::with_capacity(target.volumes.len());
    for vb in target.volumes.iter() {
        let mut delta_vb = vb.clone();
        if let Some(origin_vb) = origin
            .volumes
            .iter()
            .find(|o| o.map_key() == vb.map_key())
        {
            delta_vb.size_in_bytes = vb.size_in_bytes - origin_vb.size_in_bytes;
        }
        bindings.push(delta_vb);
    }
    WorkloadResource::new(VolumeBindings(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::NodeResourceRequest;

    use crate::idgen::SequenceGenerator;
    use crate::store::memory::MemoryStore;

    const GIB: i64 = 1 << 30;

    async fn service_with_node(capacity: i64) -> CalculateService {
        let store = Arc::new(MemoryStore::new());
        let node = NodeService::new(store.clone());
        node.add_node(
            "node0",
            &NodeResourceRequest {
                size_in_bytes: capacity,
            },
        )
        .await
        .unwrap();
        CalculateService::new(
            NodeService::new(store),
            Arc::new(SequenceGenerator::default()),
            "rbd".to_string(),
        )
    }

    fn request(volumes: &[&str]) -> WorkloadResourceRequest {
        WorkloadResourceRequest::new(VolumeBindings::parse(volumes).unwrap())
    }

    fn resource(volumes: &[&str]) -> WorkloadResource {
        WorkloadResource::new(VolumeBindings::parse(volumes).unwrap())
    }

    #[tokio::test]
    async fn test_deploy_normal() {
        let svc = service_with_node(i64::MAX).await;
        let req = request(&[
            &format!("rbd/img0:/dir0:rwm:{GIB}"),
            &format!("rbd/img1:/dir1:rwm:{GIB}"),
        ]);

        let plan = svc.calculate_deploy("node0", 10, &req).await.unwrap();
        assert_eq!(plan.engines_params.len(), 10);
        assert_eq!(plan.workloads_resource.len(), 10);
        // m flag 在引擎参数里被规范化掉
        assert_eq!(
            plan.engines_params[0].volumes[0],
            format!("rbd/img0:/dir0:rw:{GIB}")
        );
        assert_eq!(
            plan.engines_params[0].volumes[1],
            format!("rbd/img1:/dir1:rw:{GIB}")
        );
        assert_eq!(plan.engines_params[0].storage, 2 * GIB);
        assert_eq!(plan.workloads_resource[0].size(), 2 * GIB);
    }

    #[tokio::test]
    async fn test_deploy_capacity_check() {
        // 容量 100，请求 30：4 副本超出，3 副本正好
        let svc = service_with_node(100).await;
        let req = request(&["rbd/img0:/dir0:rw:30"]);

        let err = svc.calculate_deploy("node0", 4, &req).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientResource(_)));

        let plan = svc.calculate_deploy("node0", 3, &req).await.unwrap();
        assert_eq!(plan.workloads_resource.len(), 3);
    }

    #[tokio::test]
    async fn test_deploy_generates_image_names() {
        let svc = service_with_node(i64::MAX).await;
        let req = request(&["/:/dir0:rw:100", "rbd/img1:/dir1:rw:100"]);

        let plan = svc.calculate_deploy("node0", 2, &req).await.unwrap();
        let first = &plan.workloads_resource[0].volumes[0];
        assert_eq!(first.pool, "rbd");
        assert_eq!(first.image, "img-00000000");
        // 每个副本各自出号
        let second = &plan.workloads_resource[1].volumes[0];
        assert_eq!(second.image, "img-00000001");
        // 命名过的镜像原样保留
        assert_eq!(plan.workloads_resource[0].volumes[1].image, "img1");
    }

    #[tokio::test]
    async fn test_deploy_invalid_request() {
        let svc = service_with_node(i64::MAX).await;
        let req = request(&["rbd/img0:/dir0:rw:10", "rbd/img1:/dir0:rw:10"]);
        let err = svc.calculate_deploy("node0", 1, &req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidVolumes(_)));
    }

    #[tokio::test]
    async fn test_deploy_node_not_exists() {
        let svc = service_with_node(i64::MAX).await;
        let req = request(&["rbd/img0:/dir0:rw:10"]);
        let err = svc.calculate_deploy("ghost", 1, &req).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotExists(_)));
    }

    #[tokio::test]
    async fn test_realloc_add_size() {
        let svc = service_with_node(i64::MAX).await;
        let origin = resource(&[
            &format!("rbd/img0:/dir0:rw:{}", 100 * GIB),
            &format!("rbd/img1:/dir1:mrw:{}", 100 * GIB),
            "rbd/img2:/dir2:rw:1TB",
        ]);
        let req = request(&[&format!("rbd/img1:/dir1:mrw:{}", 100 * GIB)]);

        let plan = svc.calculate_realloc("node0", &origin, &req).await.unwrap();
        assert!(!plan.engine_params.volume_changed);
        assert_eq!(plan.workload_resource.volumes.len(), 3);

        let expected = VolumeBindings::parse(&[
            format!("rbd/img1:/dir1:mrw:{}", 200 * GIB),
            format!("rbd/img0:/dir0:rw:{}", 100 * GIB),
            "rbd/img2:/dir2:rw:1TB".to_string(),
        ])
        .unwrap();
        assert!(expected.equal(&plan.workload_resource.volumes));

        // 增量只包含实际变化
        let delta = &plan.delta_resource;
        assert_eq!(delta.size(), 100 * GIB);
        let img1_delta = delta
            .volumes
            .iter()
            .find(|vb| vb.image == "img1")
            .unwrap();
        assert_eq!(img1_delta.size_in_bytes, 100 * GIB);
        let img0_delta = delta
            .volumes
            .iter()
            .find(|vb| vb.image == "img0")
            .unwrap();
        assert_eq!(img0_delta.size_in_bytes, 0);
    }

    #[tokio::test]
    async fn test_realloc_remove_by_negative_delta() {
        let svc = service_with_node(i64::MAX).await;
        let origin = resource(&[
            &format!("rbd/img0:/dir0:rw:{}", 100 * GIB),
            &format!("rbd/img1:/dir1:mrw:{}", 100 * GIB),
            "rbd/img2:/dir2:rw:1TB",
        ]);
        let req = request(&[
            &format!("rbd/img1:/dir1:mrw:-{}", 100 * GIB),
            "rbd/img2:/dir2:rw:-2TB",
            "rbd/img3:/dir3:rw:-2TB",
            "rbd/img4:/dir4:rw:2TB",
        ]);

        let plan = svc.calculate_realloc("node0", &origin, &req).await.unwrap();
        assert!(plan.engine_params.volume_changed);
        assert_eq!(plan.workload_resource.volumes.len(), 2);

        let expected = VolumeBindings::parse(&[
            "rbd/img4:/dir4:rw:2TB",
            &format!("rbd/img0:/dir0:rw:{}", 100 * GIB),
        ])
        .unwrap();
        assert!(expected.equal(&plan.workload_resource.volumes));
    }

    #[tokio::test]
    async fn test_realloc_capacity_check_returns_origin_first() {
        // 容量 100，已占用 80（即本负载），重分配到 100 应该成功
        let store = Arc::new(MemoryStore::new());
        let node = NodeService::new(store.clone());
        node.add_node("node0", &NodeResourceRequest { size_in_bytes: 100 })
            .await
            .unwrap();
        node.set_node_resource_usage(
            "node0",
            Some(common::models::NodeResource::new(80)),
            None,
            &[],
            true,
            true,
        )
        .await
        .unwrap();
        let svc = CalculateService::new(
            NodeService::new(store),
            Arc::new(SequenceGenerator::default()),
            "rbd".to_string(),
        );

        let origin = resource(&["rbd/img0:/dir0:rw:80"]);
        let plan = svc
            .calculate_realloc("node0", &origin, &request(&["rbd/img0:/dir0:rw:20"]))
            .await
            .unwrap();
        assert_eq!(plan.workload_resource.size(), 100);

        // 超过归还后的可用量则失败
        let err = svc
            .calculate_realloc("node0", &origin, &request(&["rbd/img0:/dir0:rw:21"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientResource(_)));
    }

    #[tokio::test]
    async fn test_realloc_on_unbounded_node_does_not_overflow() {
        // 未显式给容量的节点上限是 i64::MAX，净增量比较不得与其相加
        let svc = service_with_node(i64::MAX).await;
        let origin = resource(&["rbd/img0:/dir0:rw:1PiB"]);
        let plan = svc
            .calculate_realloc("node0", &origin, &request(&["rbd/img0:/dir0:rw:1PiB"]))
            .await
            .unwrap();
        assert_eq!(plan.workload_resource.size(), 2 * (1 << 50));

        // 缩容同样不受影响
        let plan = svc
            .calculate_realloc("node0", &origin, &request(&["rbd/img0:/dir0:rw:-1PiB"]))
            .await
            .unwrap();
        assert!(plan.workload_resource.volumes.is_empty());
    }

    #[tokio::test]
    async fn test_realloc_rejects_merged_duplicate_destination() {
        // 两条输入各自合法，但合并后共用同一目的路径
        let svc = service_with_node(i64::MAX).await;
        let origin = resource(&["rbd/img0:/dir0:rw:100"]);
        let err = svc
            .calculate_realloc("node0", &origin, &request(&["rbd/img1:/dir0:rw:100"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVolumes(_)));
    }

    #[tokio::test]
    async fn test_deploy_required_overflow_rejected() {
        let svc = service_with_node(i64::MAX).await;
        let req = request(&["rbd/img0:/dir0:rw:4PiB"]);
        let err = svc
            .calculate_deploy("node0", 10_000, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_remap_returns_empty_map() {
        let svc = service_with_node(i64::MAX).await;
        let mut workloads = HashMap::new();
        workloads.insert(
            "workload0".to_string(),
            resource(&["rbd/img0:/dir0:rw:100"]),
        );
        let plan = svc.calculate_remap(&workloads);
        assert!(plan.engine_params_map.is_empty());
    }

    #[tokio::test]
    async fn test_realloc_size_only_change_not_volume_changed() {
        let svc = service_with_node(i64::MAX).await;
        let origin = resource(&["rbd/img0:/dir0:rw:100"]);
        let plan = svc
            .calculate_realloc("node0", &origin, &request(&["rbd/img0:/dir0:rw:50"]))
            .await
            .unwrap();
        assert!(!plan.engine_params.volume_changed);
        assert_eq!(plan.engine_params.storage, 150);
        assert_eq!(
            plan.engine_params.volumes,
            vec!["rbd/img0:/dir0:rw:150".to_string()]
        );
    }

    #[test]
    fn test_delta_new_binding_counted_in_full() {
        let origin = WorkloadResource::new(
            VolumeBindings::parse(&["rbd/img0:/dir0:rw:100"]).unwrap(),
        );
        let target = WorkloadResource::new(
            VolumeBindings::parse(&["rbd/img0:/dir0:rw:70", "rbd/img1:/dir1:rw:30"]).unwrap(),
        );
        let delta = delta_workload_resource(&origin, &target);
        assert_eq!(delta.volumes.len(), 2);
        assert_eq!(delta.volumes[0].size_in_bytes, -30);
        assert_eq!(delta.volumes[1].size_in_bytes, 30);
        assert_eq!(delta.size(), 0);
    }
}
