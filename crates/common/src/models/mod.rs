/// 共享数据模型
///
/// 卷绑定编解码、节点账本、工作负载资源与引擎参数

pub mod engine;
pub mod node;
pub mod volume;
pub mod workload;

pub use engine::EngineParams;
pub use node::{NodeResource, NodeResourceInfo, NodeResourceRequest};
pub use volume::{VolumeBinding, VolumeBindings};
pub use workload::{WorkloadResource, WorkloadResourceRequest};
