//! 实用工具模块
//!
//! 算力单位解析/格式化，以及事件与程序参数共用的变量注入。

pub mod hashrate_formatter;
pub mod template;

// 重新导出常用函数
pub use hashrate_formatter::{format_hashrate, parse_hashrate};
pub use template::{inject, Value, Vars};
