/// 镜像名 ID 生成
///
/// 分配引擎为未命名镜像合成 `img-<id>` 形式的名字，生成器显式注入，
/// 测试里换成确定性的序号实现

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

pub trait IdGenerator: Send + Sync {
    /// 在节点生命周期内无碰撞即可，不承担正确性关键的身份职责
    fn generate_id(&self) -> String;
}

/// 基于 UUID v4 的默认实现
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// 按序号出号的确定性实现，仅用于测试
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    counter: AtomicU64,
}

impl IdGenerator for SequenceGenerator {
    fn generate_id(&self) -> String {
        format!("{:08}", self.counter.fetch_add(1, Ordering::Relaxed))
    }
}
