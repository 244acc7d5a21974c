use crate::config::Config;
use crate::error::{ErrorStats, MiningError};
use crate::feed::{MphClient, StatCoin, StatsSource};
use crate::mining::{load_workers, MiningContext, MiningState};
use crate::watchdog::{panic_message, Watchdog};
use crate::worker::{SharedWorker, SwitchOutcome};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 拉取统计数据的 HTTP 超时
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// 挖矿管理器: 轮询收益统计并驱动每个工作机的决策引擎
pub struct MiningManager {
    context: Arc<MiningContext>,
    workers: Vec<SharedWorker>,
    /// 收益统计数据源
    stats: Arc<dyn StatsSource>,
    state: RwLock<MiningState>,
    error_stats: Mutex<ErrorStats>,
}

impl MiningManager {
    pub fn new(
        context: Arc<MiningContext>,
        workers: Vec<SharedWorker>,
        stats: Arc<dyn StatsSource>,
    ) -> Self {
        Self {
            context,
            workers,
            stats,
            state: RwLock::new(MiningState::Stopped),
            error_stats: Mutex::new(ErrorStats::default()),
        }
    }

    /// 从配置构造上下文、工作机和 MiningPoolHub 客户端
    pub fn from_config(config: &Config, watchdog: Watchdog) -> Result<Self, MiningError> {
        info!("Creating mining manager");
        let context = Arc::new(MiningContext::from_config(config, watchdog));
        let workers = load_workers(config, context.clone())?;
        let client = MphClient::new(context.settings.stats_url.clone(), FEED_TIMEOUT)?;
        debug!("Profit statistics from {}", client.url());
        Ok(Self::new(context, workers, Arc::new(client)))
    }

    pub fn context(&self) -> &Arc<MiningContext> {
        &self.context
    }

    pub fn workers(&self) -> &[SharedWorker] {
        &self.workers
    }

    pub async fn get_state(&self) -> MiningState {
        *self.state.read().await
    }

    pub async fn get_error_stats(&self) -> ErrorStats {
        self.error_stats.lock().await.clone()
    }

    async fn set_state(&self, state: MiningState) {
        let mut current = self.state.write().await;
        debug!("Mining state {:?} -> {:?}", *current, state);
        *current = state;
    }

    /// 启动全部工作机: 挂载事件并广播 startup
    pub async fn startup(&self) {
        info!("Starting {} workers", self.workers.len());
        self.set_state(MiningState::Starting).await;

        for handle in &self.workers {
            let mut worker = handle.lock().await;
            let id = worker.id().to_string();
            if let Err(panic) = AssertUnwindSafe(worker.startup(handle)).catch_unwind().await {
                error!(worker = %id, "Worker startup panicked: {}", panic_message(&*panic));
            }
        }

        self.set_state(MiningState::Running).await;
    }

    /// 轮询循环, 直到令牌被取消
    ///
    /// 第一次检查立即进行。
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.context.settings.switch_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Checking profits every {}s", self.context.settings.switch_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // 单次检查不被取消打断, 避免任务停在启动一半的状态
            let _ = self.poll_once().await;
        }

        info!("Polling loop stopped");
    }

    /// 拉取一次统计数据并为每个工作机做一次切换决策
    ///
    /// 拉取失败时所有工作机停止挖矿。
    pub async fn poll_once(&self) -> Result<Vec<(String, SwitchOutcome)>, MiningError> {
        let stats = match self.stats.fetch().await {
            Ok(stats) => stats,
            Err(e) => {
                let err = MiningError::from(e);
                error!("Unable to fetch profit statistics: {}", err);
                self.error_stats.lock().await.record_error(&err);
                self.stop_all().await;
                return Err(err);
            }
        };
        debug!("Received statistics for {} coins", stats.len());
        Ok(self.switch_all(&stats).await)
    }

    async fn switch_all(&self, stats: &[StatCoin]) -> Vec<(String, SwitchOutcome)> {
        let mut outcomes = Vec::with_capacity(self.workers.len());
        for handle in &self.workers {
            let mut worker = handle.lock().await;
            let id = worker.id().to_string();
            match AssertUnwindSafe(worker.switch_algo(stats)).catch_unwind().await {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(panic) => {
                    error!(worker = %id, "Profit switch panicked: {}", panic_message(&*panic))
                }
            }
        }
        outcomes
    }

    async fn stop_all(&self) {
        for handle in &self.workers {
            let mut worker = handle.lock().await;
            let id = worker.id().to_string();
            if let Err(panic) = AssertUnwindSafe(worker.stop_mining()).catch_unwind().await {
                error!(worker = %id, "Stopping worker panicked: {}", panic_message(&*panic));
            }
        }
    }

    /// 停止挖矿并广播 shutdown
    pub async fn shutdown(&self) {
        if self.get_state().await == MiningState::Stopped {
            warn!("Mining manager is already stopped");
            return;
        }
        info!("Shutting down {} workers", self.workers.len());
        self.set_state(MiningState::Stopping).await;

        self.stop_all().await;
        for handle in &self.workers {
            let mut worker = handle.lock().await;
            let id = worker.id().to_string();
            if let Err(panic) = AssertUnwindSafe(worker.shutdown()).catch_unwind().await {
                error!(worker = %id, "Worker shutdown panicked: {}", panic_message(&*panic));
            }
        }

        self.set_state(MiningState::Stopped).await;
        info!("Mining manager stopped");
    }
}
