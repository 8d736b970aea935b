/// 通过 rbd 命令行操作 Ceph 镜像的后端实现

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use common::models::VolumeBinding;
use common::{Error, Result};

use super::StorageBackend;
use crate::config::Config;

// rbd 对不存在的镜像返回 ENOENT
const ENOENT: i32 = 2;

pub struct RbdCliBackend {
    cmd: String,
    ceph_conf: Option<String>,
}

impl RbdCliBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            cmd: config.rbd_cmd.clone(),
            ceph_conf: config.ceph_conf.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let mut command = Command::new(&self.cmd);
        if let Some(conf) = &self.ceph_conf {
            command.arg("--conf").arg(conf);
        }
        command.args(args);
        debug!("执行 {} {}", self.cmd, args.join(" "));
        command
            .output()
            .await
            .map_err(|e| Error::Storage(format!("执行 {} 失败: {e}", self.cmd)))
    }

    fn check(output: std::process::Output, action: &str, vb: &VolumeBinding) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::Storage(format!(
            "{action} {} 失败: {}",
            vb.source(),
            stderr.trim()
        )))
    }
}

#[async_trait]
impl StorageBackend for RbdCliBackend {
    async fn create(&self, vb: &VolumeBinding) -> Result<()> {
        vb.validate(true)?;
        let source = vb.source();
        let size = format!("{}B", vb.size_in_bytes);
        let output = self.run(&["create", &source, "--size", &size]).await?;
        Self::check(output, "创建镜像", vb)
    }

    async fn resize(&self, vb: &VolumeBinding) -> Result<()> {
        vb.validate(true)?;
        let source = vb.source();
        let size = format!("{}B", vb.size_in_bytes);
        let output = self.run(&["resize", &source, "--size", &size]).await?;
        Self::check(output, "扩容镜像", vb)
    }

    async fn exists(&self, vb: &VolumeBinding) -> Result<bool> {
        vb.validate(true)?;
        let source = vb.source();
        let output = self.run(&["info", &source]).await?;
        if output.status.success() {
            return Ok(true);
        }
        if output.status.code() == Some(ENOENT) {
            return Ok(false);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::Storage(format!(
            "查询镜像 {source} 失败: {}",
            stderr.trim()
        )))
    }

    async fn remove(&self, vb: &VolumeBinding) -> Result<()> {
        vb.validate(true)?;
        let source = vb.source();
        let output = self.run(&["rm", &source]).await?;
        Self::check(output, "删除镜像", vb)
    }
}
