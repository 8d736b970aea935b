/// 配置管理

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub store_path: String,
    pub default_pool: String,
    pub rbd_cmd: String,
    pub ceph_conf: Option<String>,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let store_path = std::env::var("STORE_PATH")
            .unwrap_or_else(|_| "rbd-plugin-meta.json".to_string());

        let default_pool =
            std::env::var("DEFAULT_POOL").unwrap_or_else(|_| "rbd".to_string());

        let rbd_cmd = std::env::var("RBD_CMD").unwrap_or_else(|_| "rbd".to_string());

        let ceph_conf = std::env::var("CEPH_CONF").ok();

        Ok(Self {
            log_level,
            store_path,
            default_pool,
            rbd_cmd,
            ceph_conf,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store_path: "rbd-plugin-meta.json".to_string(),
            default_pool: "rbd".to_string(),
            rbd_cmd: "rbd".to_string(),
            ceph_conf: None,
        }
    }
}
