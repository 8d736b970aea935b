/// 卷落实服务
///
/// 把计算引擎给出的绑定集合落实到存储后端：不存在则创建，已存在则扩容。
/// 记账与落实分离，调用方先写账本再落实，落实失败回滚已创建的镜像

use std::sync::Arc;

use tracing::{error, info};

use common::models::{VolumeBinding, VolumeBindings};
use common::Result;

use crate::backend::StorageBackend;

pub struct Provisioner {
    backend: Arc<dyn StorageBackend>,
}

impl Provisioner {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// 落实一组绑定，monitor-only 绑定跳过
    ///
    /// 中途失败时尽力删除本次新建的镜像，已存在镜像的扩容不回退，
    /// 回滚失败只记日志，返回原始错误
    pub async fn provision(&self, volumes: &VolumeBindings) -> Result<()> {
        let mut created: Vec<&VolumeBinding> = Vec::new();
        for vb in volumes.iter() {
            if vb.is_monitor_only() {
                continue;
            }
            if let Err(err) = self.provision_one(vb, &mut created).await {
                self.rollback(&created).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn provision_one<'a>(
        &self,
        vb: &'a VolumeBinding,
        created: &mut Vec<&'a VolumeBinding>,
    ) -> Result<()> {
        vb.validate(true)?;
        if self.backend.exists(vb).await? {
            info!("镜像已存在，调整大小: {}", vb.source());
            self.backend.resize(vb).await?;
        } else {
            self.backend.create(vb).await?;
            created.push(vb);
        }
        Ok(())
    }

    async fn rollback(&self, created: &[&VolumeBinding]) {
        for vb in created {
            if let Err(err) = self.backend.remove(vb).await {
                error!("回滚删除镜像失败 {}: {err}", vb.source());
            }
        }
    }

    /// 删除一组绑定对应的镜像，monitor-only 绑定跳过
    pub async fn deprovision(&self, volumes: &VolumeBindings) -> Result<()> {
        for vb in volumes.iter() {
            if vb.is_monitor_only() {
                continue;
            }
            vb.validate(true)?;
            self.backend.remove(vb).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::Error;

    #[derive(Default)]
    struct FakeBackend {
        existing: HashSet<String>,
        fail_on_create: Option<String>,
        created: Mutex<Vec<String>>,
        resized: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageBackend for FakeBackend {
        async fn create(&self, vb: &VolumeBinding) -> Result<()> {
            if self.fail_on_create.as_deref() == Some(vb.source().as_str()) {
                return Err(Error::Storage(format!("创建失败: {}", vb.source())));
            }
            self.created.lock().unwrap().push(vb.source());
            Ok(())
        }

        async fn resize(&self, vb: &VolumeBinding) -> Result<()> {
            self.resized.lock().unwrap().push(vb.source());
            Ok(())
        }

        async fn exists(&self, vb: &VolumeBinding) -> Result<bool> {
            Ok(self.existing.contains(&vb.source()))
        }

        async fn remove(&self, vb: &VolumeBinding) -> Result<()> {
            self.removed.lock().unwrap().push(vb.source());
            Ok(())
        }
    }

    fn bindings(volumes: &[&str]) -> VolumeBindings {
        VolumeBindings::parse(volumes).unwrap()
    }

    #[tokio::test]
    async fn test_provision_create_and_resize() {
        let backend = Arc::new(FakeBackend {
            existing: HashSet::from(["rbd/img0".to_string()]),
            ..Default::default()
        });
        let provisioner = Provisioner::new(backend.clone());

        provisioner
            .provision(&bindings(&[
                "rbd/img0:/dir0:rw:100",
                "rbd/img1:/dir1:rw:100",
            ]))
            .await
            .unwrap();

        assert_eq!(*backend.resized.lock().unwrap(), vec!["rbd/img0"]);
        assert_eq!(*backend.created.lock().unwrap(), vec!["rbd/img1"]);
        assert!(backend.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provision_skips_monitor_only() {
        let backend = Arc::new(FakeBackend::default());
        let provisioner = Provisioner::new(backend.clone());

        provisioner
            .provision(&bindings(&[
                "rbd/img0:/dir0:mrw:100",
                "rbd/img1:/dir1:rw:100",
            ]))
            .await
            .unwrap();

        assert_eq!(*backend.created.lock().unwrap(), vec!["rbd/img1"]);
    }

    #[tokio::test]
    async fn test_provision_rolls_back_created_on_failure() {
        let backend = Arc::new(FakeBackend {
            fail_on_create: Some("rbd/img2".to_string()),
            ..Default::default()
        });
        let provisioner = Provisioner::new(backend.clone());

        let err = provisioner
            .provision(&bindings(&[
                "rbd/img0:/dir0:rw:100",
                "rbd/img1:/dir1:rw:100",
                "rbd/img2:/dir2:rw:100",
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        // 本次新建的两个镜像被回滚删除
        assert_eq!(
            *backend.removed.lock().unwrap(),
            vec!["rbd/img0", "rbd/img1"]
        );
    }

    #[tokio::test]
    async fn test_provision_rejects_unnamed_image() {
        let backend = Arc::new(FakeBackend::default());
        let provisioner = Provisioner::new(backend.clone());

        let err = provisioner
            .provision(&bindings(&["/:/dir0:rw:100"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVolume(_)));
    }

    #[tokio::test]
    async fn test_deprovision() {
        let backend = Arc::new(FakeBackend::default());
        let provisioner = Provisioner::new(backend.clone());

        provisioner
            .deprovision(&bindings(&[
                "rbd/img0:/dir0:rw:100",
                "rbd/img1:/dir1:mrw:100",
            ]))
            .await
            .unwrap();
        assert_eq!(*backend.removed.lock().unwrap(), vec!["rbd/img0"]);
    }
}
