/// 服务层
///
/// 节点账本操作、部署/重分配计算、卷落实

pub mod calculate;
pub mod node;
pub mod provision;
