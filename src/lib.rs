//! Profit-Switcher - 外部矿工程序的收益切换监管器
//!
//! 按固定间隔从矿池拉取各币种的收益统计，为每台工作机挑选最赚钱的
//! (算法, 币种, 矿工程序, 矿池) 组合，并监管对应的外部矿工进程：
//!
//! - 决策引擎带切换阈值，避免在收益相近的币种之间来回重启
//! - 子进程在 Unix 上挂到伪终端，在 Windows 上使用管道，输出逐行写入日志
//! - 可配置的事件 (触发器 + 动作) 挂在工作机生命周期信号和定时器上
//! - 看门狗在收到中断信号后等待后台任务结束并执行一次终结器

pub mod config;
pub mod error;
pub mod event;
pub mod feed;
pub mod logging;
pub mod mining;
pub mod process;
pub mod registry;
pub mod utils;
pub mod watchdog;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::MiningError;
pub use mining::{MiningContext, MiningManager};
pub use watchdog::Watchdog;
pub use worker::{SwitchOutcome, Worker};

/// 程序版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 程序名称
pub const NAME: &str = "profit-switcher";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "profit-switcher");
    }
}
