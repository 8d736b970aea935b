/// 工作负载占用的资源与资源请求

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::volume::VolumeBindings;
use crate::Result;

/// 单个工作负载实例实际占用的卷资源
///
/// 总大小是惰性求值的缓存，卷列表发生结构性变化时失效
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadResource {
    #[serde(default)]
    pub volumes: VolumeBindings,
    #[serde(skip)]
    total_size: OnceCell<i64>,
}

impl WorkloadResource {
    pub fn new(volumes: VolumeBindings) -> Self {
        Self {
            volumes,
            total_size: OnceCell::new(),
        }
    }

    /// 卷大小之和，首次调用时计算并缓存
    pub fn size(&self) -> i64 {
        *self
            .total_size
            .get_or_init(|| self.volumes.total_size())
    }

    /// 合并另一个工作负载的卷，身份键相同的绑定逐项累加
    pub fn add(&mut self, other: &WorkloadResource) {
        self.volumes = VolumeBindings::merge(&self.volumes, &[&other.volumes]);
        self.total_size = OnceCell::new();
    }

    /// 替换卷列表并让缓存失效
    pub fn set_volumes(&mut self, volumes: VolumeBindings) {
        self.volumes = volumes;
        self.total_size = OnceCell::new();
    }
}

/// 新增/调整卷的资源请求
///
/// 卷列表在外部输入里可能挂在几个不同的键名下，别名在反序列化时统一解析
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadResourceRequest {
    #[serde(default, alias = "volume-request", alias = "volumes-request")]
    pub volumes: VolumeBindings,
}

impl WorkloadResourceRequest {
    pub fn new(volumes: VolumeBindings) -> Self {
        Self { volumes }
    }

    pub fn validate(&self) -> Result<()> {
        self.volumes.validate()
    }
}
