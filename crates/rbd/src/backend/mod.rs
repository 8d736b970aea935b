/// 存储后端抽象层
///
/// 按卷绑定创建、扩容、查询、删除块设备镜像

pub mod rbd;

use async_trait::async_trait;

use common::models::VolumeBinding;
use common::Result;

/// 存储后端能力契约
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 创建镜像
    async fn create(&self, vb: &VolumeBinding) -> Result<()>;

    /// 调整镜像大小
    async fn resize(&self, vb: &VolumeBinding) -> Result<()>;

    /// 镜像是否存在
    async fn exists(&self, vb: &VolumeBinding) -> Result<bool>;

    /// 删除镜像
    async fn remove(&self, vb: &VolumeBinding) -> Result<()>;
}
