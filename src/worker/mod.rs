//! 工作机
//!
//! 一个工作机对应一台配置好的矿机: 允许使用的算法和矿工程序、
//! 切换阈值、事件列表、当前任务和暂停标志。
//! 工作机只被它自己的决策循环和事件动作修改，通过 [`SharedWorker`] 串行访问。

pub mod algorithm;
pub mod job;
pub mod profit;

use crate::config::WorkerConfig;
use crate::error::ConfigError;
use crate::event::{Event, ListenerKey, Signal};
use crate::feed::ProfitField;
use crate::mining::MiningContext;
use crate::process::Supervisor;
use crate::utils::{Value, Vars};
use crate::vars;
use crate::watchdog::panic_message;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub use algorithm::{WorkerAlgorithm, WorkerMiner};
pub use job::{Host, JobKey, JobState, WorkerJob};
pub use profit::SwitchOutcome;

pub type SharedWorker = Arc<Mutex<Worker>>;

pub struct Worker {
    id: String,
    name: String,
    profit_field: ProfitField,
    percent_profit_threshold: f64,
    algorithms: Vec<WorkerAlgorithm>,
    events: Vec<Arc<Event>>,
    current_job: Option<WorkerJob>,
    paused: bool,
    /// 每个信号的监听器, 按登记顺序调用
    listeners: HashMap<Signal, Vec<(ListenerKey, Arc<Event>)>>,
    /// 定时类触发器的取消令牌
    scheduled: HashMap<ListenerKey, CancellationToken>,
    context: Arc<MiningContext>,
}

impl Worker {
    pub fn new(id: &str, context: Arc<MiningContext>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            profit_field: ProfitField::default(),
            percent_profit_threshold: 1.0,
            algorithms: Vec::new(),
            events: Vec::new(),
            current_job: None,
            paused: false,
            listeners: HashMap::new(),
            scheduled: HashMap::new(),
            context,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.percent_profit_threshold = threshold;
        self
    }

    pub fn with_profit_field(mut self, field: ProfitField) -> Self {
        self.profit_field = field;
        self
    }

    pub fn with_algorithm(mut self, algorithm: WorkerAlgorithm) -> Self {
        self.algorithms.retain(|a| a.id() != algorithm.id());
        self.algorithms.push(algorithm);
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(Arc::new(event));
        self
    }

    /// 从配置构造; 无效的算法和事件被跳过
    pub fn from_config(id: &str, config: &WorkerConfig, context: Arc<MiningContext>) -> Result<Self, ConfigError> {
        let threshold = config.percent_profit_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: format!("workers.{}.percent_profit_threshold", id),
                value: threshold.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let registry = context.registry.clone();
        let mut worker = Self::new(id, context)
            .with_threshold(threshold)
            .with_profit_field(config.profit_field);
        worker.name = config.name.clone().unwrap_or_else(|| id.to_string());

        for (algo_id, algo) in &config.algorithms {
            match WorkerAlgorithm::from_config(id, algo_id, algo, &registry) {
                Ok(algorithm) => worker = worker.with_algorithm(algorithm),
                Err(e) => warn!(worker = %id, "Skipping algorithm '{}': {}", algo_id, e),
            }
        }

        for event in &config.events {
            match registry.event(&event.trigger, &event.action) {
                Ok(event) => worker = worker.with_event(event),
                Err(e) => warn!(
                    worker = %id,
                    "Skipping event {} -> {}: {}",
                    event.trigger,
                    event.action,
                    e
                ),
            }
        }

        if worker.algorithms.is_empty() {
            warn!(worker = %id, "Worker has no usable algorithms and will never mine");
        }
        Ok(worker)
    }

    pub fn into_shared(self) -> SharedWorker {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profit_field(&self) -> ProfitField {
        self.profit_field
    }

    pub fn percent_profit_threshold(&self) -> f64 {
        self.percent_profit_threshold
    }

    pub fn algorithms(&self) -> &[WorkerAlgorithm] {
        &self.algorithms
    }

    pub fn worker_algorithm(&self, algo_id: &str) -> Option<&WorkerAlgorithm> {
        self.algorithms.iter().find(|a| a.id() == algo_id)
    }

    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    pub fn current_job(&self) -> Option<&WorkerJob> {
        self.current_job.as_ref()
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn context(&self) -> &Arc<MiningContext> {
        &self.context
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.context.supervisor
    }

    /// 币种必须已登记，且属于本工作机的某个算法并通过其黑白名单
    pub fn supports_coin(&self, coin_id: &str) -> bool {
        self.context
            .registry
            .coin(coin_id)
            .and_then(|coin| self.worker_algorithm(&coin.algorithm))
            .map(|algorithm| algorithm.supports_coin(coin_id))
            .unwrap_or(false)
    }

    /// 登记监听器; 相同的键替换原有的监听器
    pub fn add_listener(&mut self, signal: Signal, key: ListenerKey, event: Arc<Event>) {
        let listeners = self.listeners.entry(signal).or_default();
        match listeners.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = event,
            None => listeners.push((key, event)),
        }
    }

    pub fn remove_listener(&mut self, key: &ListenerKey) {
        for listeners in self.listeners.values_mut() {
            listeners.retain(|(k, _)| k != key);
        }
    }

    pub fn listener_count(&self, signal: Signal) -> usize {
        self.listeners.get(&signal).map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn add_schedule(&mut self, key: ListenerKey, token: CancellationToken) -> bool {
        if self.scheduled.contains_key(&key) {
            return false;
        }
        self.scheduled.insert(key, token);
        true
    }

    pub(crate) fn cancel_schedule(&mut self, key: &ListenerKey) -> bool {
        match self.scheduled.remove(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    /// 所有事件共有的变量
    pub fn inject_global_vars(&self, vars: &mut Vars) {
        vars.insert("WORKER.ID".to_string(), Value::from(&self.id));
        match &self.current_job {
            Some(job) => {
                vars.insert("TASK.ACTIVE".to_string(), Value::Bool(true));
                vars.insert("TASK.PROFIT".to_string(), Value::Float(job.profit()));
                vars.insert("TASK.COIN.ID".to_string(), Value::from(&job.coin().id));
                vars.insert("TASK.COIN.ALGO".to_string(), Value::from(&job.coin().algorithm));
                vars.insert("TASK.MINER.ID".to_string(), Value::from(&job.miner().id));
                vars.insert("TASK.MINER.RATE".to_string(), Value::Float(job.rate()));
            }
            None => {
                vars.insert("TASK.ACTIVE".to_string(), Value::Bool(false));
            }
        }
    }

    /// 程序参数可用的变量; 没有任务时任务相关的值为空
    pub fn app_environment(&self) -> Vars {
        let settings = &self.context.settings;
        match &self.current_job {
            Some(job) => job.environment(&self.id, settings),
            None => vars! {
                "CONFIG.NETWORK_TIMEOUT" => settings.reconnect_interval as i64,
                "CONFIG.ACCOUNT" => &settings.account,
                "JOB.HOST" => ":",
                "JOB.HOST.NAME" => "",
                "JOB.HOST.PORT" => "",
                "JOB.WORKER.ID" => &self.id,
                "JOB.WORKER.USERNAME" => format!("{}.{}", settings.account, self.id),
                "JOB.COIN.ID" => "",
                "JOB.COIN.ALGO" => "",
            },
        }
    }

    /// 向某个信号的全部监听器广播
    ///
    /// 单个监听器返回错误或 panic 时记录日志, 其余监听器照常执行。
    pub async fn fire_event(&mut self, signal: Signal, mut vars: Vars) {
        self.inject_global_vars(&mut vars);

        let listeners: Vec<Arc<Event>> = self
            .listeners
            .get(&signal)
            .map(|l| l.iter().map(|(_, event)| event.clone()).collect())
            .unwrap_or_default();
        if listeners.is_empty() {
            return;
        }

        debug!(worker = %self.id, "Firing {} to {} listeners", signal, listeners.len());
        for event in listeners {
            match AssertUnwindSafe(event.fire(self, vars.clone())).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker = %self.id, "Event {} failed: {}", event.key(), e),
                Err(panic) => error!(
                    worker = %self.id,
                    "Event {} panicked: {}",
                    event.key(),
                    panic_message(&*panic)
                ),
            }
        }
    }

    /// 挂载全部事件并广播 startup
    pub async fn startup(&mut self, handle: &SharedWorker) {
        debug!(worker = %self.id, "Starting up worker");
        for event in self.events.clone() {
            event.attach(self, handle);
        }
        self.fire_event(Signal::Startup, Vars::new()).await;
    }

    /// 广播 shutdown 并卸载全部事件
    pub async fn shutdown(&mut self) {
        debug!(worker = %self.id, "Shutting down worker");
        self.fire_event(Signal::Shutdown, Vars::new()).await;
        for event in self.events.clone() {
            event.detach(self);
        }
    }

    /// 停止挖矿并丢弃当前任务
    pub async fn stop_mining(&mut self) {
        let was_mining = self.current_job.is_some();
        self.fire_event(Signal::StopMining, vars! { "STOP_MINING.WAS_MINING" => was_mining })
            .await;

        if let Some(mut job) = self.current_job.take() {
            job.stop().await;
        }
    }

    pub async fn pause_mining(&mut self) {
        debug!(worker = %self.id, "Pausing mining");
        self.paused = true;
        if let Some(job) = self.current_job.as_mut() {
            job.pause().await;
        }
    }

    pub async fn resume_mining(&mut self) {
        debug!(worker = %self.id, "Resuming mining");
        self.paused = false;
        let env = self.app_environment();
        if let Some(job) = self.current_job.as_mut() {
            if let Err(e) = job.resume(&env).await {
                error!(worker = %self.id, "Unable to resume mining: {}", e);
            }
        }
    }
}
