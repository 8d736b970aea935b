/// 容器引擎挂卷所需的参数

use serde::{Deserialize, Serialize};

/// 引擎参数：规范化的卷描述列表与存储配额
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    #[serde(default)]
    pub volumes: Vec<String>,
    /// 卷的成员集合相对之前是否发生变化，调用方据此决定是否需要重新挂载
    #[serde(default)]
    pub volume_changed: bool,
    #[serde(default)]
    pub storage: i64,
}
