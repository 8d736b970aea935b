/// 文件存储：整库保存在单个 JSON 文件里
///
/// 插件进程按次调用、串行执行，单文件足以承载每节点一条的账本记录

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use common::{Error, Result};

use super::{next_version, KvEntry, KvStore, PutCondition};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    version: u64,
}

pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl FileStore {
    /// 打开存储文件，不存在时从空库开始
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("存储文件 {} 不存在，从空库开始", path.display());
                HashMap::new()
            }
            Err(e) => {
                return Err(Error::Store(format!("读取 {} 失败: {e}", path.display())))
            }
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self, entries: &HashMap<String, StoredEntry>) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| Error::Store(format!("写入 {} 失败: {e}", self.path.display())))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|entry| KvEntry {
            key: key.to_string(),
            value: entry.value.clone(),
            version: entry.version,
        }))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<Vec<KvEntry>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries.get(key).map(|entry| KvEntry {
                    key: key.clone(),
                    value: entry.value.clone(),
                    version: entry.version,
                })
            })
            .collect())
    }

    async fn put(&self, key: &str, value: &str, cond: PutCondition) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|entry| entry.version);
        let next = next_version(key, current, cond)?;
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                version: next,
            },
        );
        self.persist(&entries).await?;
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}
