/// RBD 资源插件核心库
///
/// 维护每个节点的块存储容量/用量账本，为部署与重分配请求计算
/// 卷分配方案，并给出容器引擎挂卷所需的参数

pub mod backend;
pub mod config;
pub mod idgen;
pub mod metrics;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::backend::StorageBackend;
use crate::config::Config;
use crate::idgen::IdGenerator;
use crate::services::calculate::CalculateService;
use crate::services::node::NodeService;
use crate::services::provision::Provisioner;
use crate::store::KvStore;

pub const PLUGIN_NAME: &str = "rbd";

/// 插件聚合根，负责装配存储、后端与 ID 生成器
pub struct Plugin {
    config: Config,
    store: Arc<dyn KvStore>,
    backend: Arc<dyn StorageBackend>,
    idgen: Arc<dyn IdGenerator>,
}

impl Plugin {
    pub fn new(
        config: Config,
        store: Arc<dyn KvStore>,
        backend: Arc<dyn StorageBackend>,
        idgen: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            idgen,
        }
    }

    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// 节点账本服务
    pub fn node(&self) -> NodeService {
        NodeService::new(self.store.clone())
    }

    /// 部署/重分配计算服务
    pub fn calculate(&self) -> CalculateService {
        CalculateService::new(
            self.node(),
            self.idgen.clone(),
            self.config.default_pool.clone(),
        )
    }

    /// 卷落实服务
    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(self.backend.clone())
    }
}
