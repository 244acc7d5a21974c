//! 挖矿任务: 一个 (算法, 币种, 矿工程序, 矿池) 组合及其进程

use crate::config::Settings;
use crate::error::ProcessError;
use crate::process::Executor;
use crate::registry::{Algorithm, Coin, Miner};
use crate::utils::{Value, Vars};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 矿池地址
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub name: String,
    pub port: u16,
}

impl Host {
    pub fn new(name: &str, port: u16) -> Self {
        Self { name: name.to_string(), port }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// 任务身份; 收益和算力不参与比较
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub algorithm: String,
    pub coin: String,
    pub miner: String,
    pub host: Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Stopped,
}

pub struct WorkerJob {
    algorithm: Arc<Algorithm>,
    coin: Arc<Coin>,
    miner: Arc<Miner>,
    host: Host,
    rate: f64,
    profit: f64,
    executor: Executor,
    state: JobState,
}

impl fmt::Debug for WorkerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerJob")
            .field("key", &self.key())
            .field("profit", &self.profit)
            .field("state", &self.state)
            .finish()
    }
}

impl WorkerJob {
    pub fn new(
        algorithm: Arc<Algorithm>,
        coin: Arc<Coin>,
        miner: Arc<Miner>,
        host: Host,
        rate: f64,
        profit: f64,
        executor: Executor,
    ) -> Self {
        Self { algorithm, coin, miner, host, rate, profit, executor, state: JobState::Idle }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            algorithm: self.algorithm.id.clone(),
            coin: self.coin.id.clone(),
            miner: self.miner.id.clone(),
            host: self.host.clone(),
        }
    }

    pub fn is_same(&self, key: &JobKey) -> bool {
        self.algorithm.id == key.algorithm
            && self.coin.id == key.coin
            && self.miner.id == key.miner
            && self.host == key.host
    }

    pub fn algorithm(&self) -> &Arc<Algorithm> {
        &self.algorithm
    }

    pub fn coin(&self) -> &Arc<Coin> {
        &self.coin
    }

    pub fn miner(&self) -> &Arc<Miner> {
        &self.miner
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn profit(&self) -> f64 {
        self.profit
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn alive(&self) -> bool {
        self.executor.alive()
    }

    pub fn pid(&self) -> Option<u32> {
        self.executor.pid()
    }

    /// 矿工程序参数中可用的变量
    pub fn environment(&self, worker_id: &str, settings: &Settings) -> Vars {
        let mut vars = Vars::new();
        vars.insert("CONFIG.NETWORK_TIMEOUT".to_string(), Value::Int(settings.reconnect_interval as i64));
        vars.insert("CONFIG.ACCOUNT".to_string(), Value::from(&settings.account));
        vars.insert("JOB.HOST".to_string(), Value::from(self.host.to_string()));
        vars.insert("JOB.HOST.NAME".to_string(), Value::from(&self.host.name));
        vars.insert("JOB.HOST.PORT".to_string(), Value::from(self.host.port));
        vars.insert("JOB.WORKER.ID".to_string(), Value::from(worker_id));
        vars.insert(
            "JOB.WORKER.USERNAME".to_string(),
            Value::from(format!("{}.{}", settings.account, worker_id)),
        );
        vars.insert("JOB.COIN.ID".to_string(), Value::from(self.miner.remap_coin(&self.coin.id)));
        vars.insert("JOB.COIN.ALGO".to_string(), Value::from(&self.algorithm.id));
        vars
    }

    /// 启动进程; 已在运行时不做任何事
    pub async fn start(&mut self, env: &Vars) -> Result<(), ProcessError> {
        if self.executor.alive() {
            return Ok(());
        }
        self.state = JobState::Starting;
        match self.executor.start(env).await {
            Ok(()) => {
                self.state = JobState::Running;
                info!("Mining {} with {} on {}", self.coin.id, self.miner.id, self.host);
                Ok(())
            }
            Err(e) => {
                self.state = JobState::Idle;
                Err(e)
            }
        }
    }

    pub async fn pause(&mut self) {
        if matches!(self.state, JobState::Paused | JobState::Stopped) {
            return;
        }
        debug!("Pausing job for {}", self.coin.id);
        self.state = JobState::Pausing;
        self.executor.stop().await;
        self.state = JobState::Paused;
    }

    /// 重新启动同一个任务
    pub async fn resume(&mut self, env: &Vars) -> Result<(), ProcessError> {
        if !matches!(self.state, JobState::Paused | JobState::Idle) {
            return Ok(());
        }
        debug!("Resuming job for {}", self.coin.id);
        let previous = self.state;
        self.state = JobState::Resuming;
        match self.executor.start(env).await {
            Ok(()) => {
                self.state = JobState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// 可重复调用
    pub async fn stop(&mut self) {
        if self.state == JobState::Stopped {
            return;
        }
        self.state = JobState::Stopping;
        self.executor.stop().await;
        self.state = JobState::Stopped;
    }
}
