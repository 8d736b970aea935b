/// 节点账本的元数据存储抽象
///
/// 每个节点一条记录，按节点名推导的键存取。记录带版本号，
/// 读-改-写路径必须带上读到的版本，不匹配时以冲突错误返回，
/// 重试策略交给调用方

pub mod file;
pub mod memory;

use async_trait::async_trait;

use common::{Error, Result};

/// 一条带版本的存储记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub version: u64,
}

/// 写入条件，用于乐观并发控制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// 无条件覆盖
    Always,
    /// 仅当键不存在时写入
    IfAbsent,
    /// 仅当当前版本匹配时写入
    IfVersion(u64),
}

/// 键值存储能力契约
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>>;

    /// 批量读取；缺失的键被跳过，结果顺序与入参一致
    async fn get_multi(&self, keys: &[String]) -> Result<Vec<KvEntry>>;

    /// 写入并返回新版本号
    async fn put(&self, key: &str, value: &str, cond: PutCondition) -> Result<u64>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// 校验写入条件并给出下一个版本号
pub(crate) fn next_version(
    key: &str,
    current: Option<u64>,
    cond: PutCondition,
) -> Result<u64> {
    match (cond, current) {
        (PutCondition::Always, cur) => Ok(cur.unwrap_or(0) + 1),
        (PutCondition::IfAbsent, None) => Ok(1),
        (PutCondition::IfAbsent, Some(_)) => {
            Err(Error::StoreConflict(format!("键已存在: {key}")))
        }
        (PutCondition::IfVersion(expected), Some(cur)) if cur == expected => Ok(cur + 1),
        (PutCondition::IfVersion(expected), Some(cur)) => Err(Error::StoreConflict(
            format!("版本不匹配 {key}: 期望 {expected}，当前 {cur}"),
        )),
        (PutCondition::IfVersion(_), None) => {
            Err(Error::StoreConflict(format!("键不存在: {key}")))
        }
    }
}
