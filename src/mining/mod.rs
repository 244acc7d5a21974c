//! 挖矿调度
//!
//! [`MiningContext`] 是启动时构造一次的共享上下文: 注册表、全局设置和进程监管器。
//! [`MiningManager`] 持有全部工作机，按固定间隔拉取收益统计并驱动决策引擎。

pub mod manager;

use crate::config::{Config, Settings};
use crate::error::ConfigError;
use crate::process::Supervisor;
use crate::registry::Registry;
use crate::watchdog::Watchdog;
use crate::worker::{SharedWorker, Worker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub use manager::MiningManager;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiningState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// 所有工作机共享的只读上下文
pub struct MiningContext {
    pub registry: Arc<Registry>,
    pub settings: Settings,
    pub supervisor: Supervisor,
}

impl MiningContext {
    pub fn new(registry: Registry, settings: Settings, supervisor: Supervisor) -> Self {
        Self { registry: Arc::new(registry), settings, supervisor }
    }

    /// 载入注册表并按设置选择进程 I/O 方式
    pub fn from_config(config: &Config, watchdog: Watchdog) -> Self {
        let settings = config.settings.clone();
        let supervisor =
            Supervisor::from_mode(settings.process_io, watchdog, settings.show_miner_output);
        info!("Using {} for miner processes", supervisor.io().name());
        Self::new(Registry::load(config), settings, supervisor)
    }
}

/// 构造全部工作机; 无效的工作机被跳过, 一个都没有时返回错误
pub fn load_workers(
    config: &Config,
    context: Arc<MiningContext>,
) -> Result<Vec<SharedWorker>, ConfigError> {
    let mut workers = Vec::with_capacity(config.workers.len());
    for (id, worker) in &config.workers {
        match Worker::from_config(id, worker, context.clone()) {
            Ok(worker) => workers.push(worker.into_shared()),
            Err(e) => warn!("Skipping worker '{}': {}", id, e),
        }
    }

    if workers.is_empty() {
        return Err(ConfigError::NoWorkers);
    }
    info!("Loaded {} workers", workers.len());
    Ok(workers)
}
