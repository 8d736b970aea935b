/// 节点资源账本类型

use serde::{Deserialize, Serialize};

use crate::Result;

/// 节点上的一份存储量，既表示容量也表示用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResource {
    pub size_in_bytes: i64,
}

impl NodeResource {
    pub fn new(size_in_bytes: i64) -> Self {
        Self { size_in_bytes }
    }

    pub fn add(&mut self, other: &NodeResource) {
        self.size_in_bytes += other.size_in_bytes;
    }

    pub fn sub(&mut self, other: &NodeResource) {
        self.size_in_bytes -= other.size_in_bytes;
    }

    // 目前除调用处的类型约束外没有额外校验规则
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// 单个节点的容量与用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResourceInfo {
    pub capacity: NodeResource,
    pub usage: NodeResource,
}

impl NodeResourceInfo {
    pub fn cap_size(&self) -> i64 {
        self.capacity.size_in_bytes
    }

    pub fn usage_size(&self) -> i64 {
        self.usage.size_in_bytes
    }

    pub fn available_size(&self) -> i64 {
        self.capacity.size_in_bytes - self.usage.size_in_bytes
    }

    /// 剩余可分配量: capacity - usage
    pub fn available(&self) -> NodeResource {
        let mut available = self.capacity;
        available.sub(&self.usage);
        available
    }

    pub fn validate(&self) -> Result<()> {
        self.capacity.validate()?;
        self.usage.validate()
    }
}

/// 编辑节点时外部传入的资源请求
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResourceRequest {
    #[serde(default)]
    pub size_in_bytes: i64,
}
