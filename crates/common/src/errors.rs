use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("无效的卷描述: {0}")]
    InvalidVolume(String),

    #[error("无效的卷列表: {0}")]
    InvalidVolumes(String),

    #[error("无效参数: {0}")]
    InvalidParams(String),

    #[error("资源不足: {0}")]
    InsufficientResource(String),

    #[error("节点不存在: {0}")]
    NodeNotExists(String),

    #[error("节点已存在: {0}")]
    NodeExists(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("存储后端错误: {0}")]
    Storage(String),

    #[error("元数据存储错误: {0}")]
    Store(String),

    #[error("元数据版本冲突: {0}")]
    StoreConflict(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
