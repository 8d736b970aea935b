/// RBD 资源插件 - 公共库
///
/// 提供核心库与插件入口共享的类型、错误处理、工具函数等

pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
