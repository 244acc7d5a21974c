//! 单元测试共用的夹具
//!
//! [`FakeIo`] 不启动真实进程，只记录命令行，并可以模拟进程退出。

use crate::config::Config;
use crate::error::ProcessError;
use crate::feed::StatCoin;
use crate::mining::MiningContext;
use crate::process::{CommandLine, ProcessIo, SpawnedProcess, Supervisor};
use crate::registry::Registry;
use crate::watchdog::Watchdog;
use crate::worker::Worker;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// 两个算法各一个币种, 一个工作机同时支持两者
pub(crate) const SCENARIO: &str = r#"{
    "config_version": 1,
    "settings": {"account": "alice", "switch_interval": 1, "show_miner_output": false},
    "algorithms": [
        {"id": "algoA", "coins": [{"id": "C1"}]},
        {"id": "algoB", "coins": [{"id": "C2"}]}
    ],
    "applications": {
        "minerx": {"working_dir": ".", "executable": "minerx", "args": "-o $(JOB.HOST) -u $(JOB.WORKER.USERNAME) -c $(JOB.COIN.ID)"},
        "minery": {"working_dir": ".", "executable": "minery", "args": "--algo $(JOB.COIN.ALGO)"}
    },
    "miners": {
        "minerX": {"app": "minerx", "coin_remap": {"C1": "c-one"}},
        "minerY": {"app": "minery"}
    },
    "workers": {
        "rig": {
            "percent_profit_threshold": 1.10,
            "algorithms": {
                "algoA": {"miners": {"minerX": {"rate": 100}}},
                "algoB": {"miners": {"minerY": {"rate": 50}}}
            }
        }
    }
}"#;

pub(crate) fn scenario_config() -> Config {
    Config::from_json_str(SCENARIO).unwrap()
}

/// 用 [`FakeIo`] 构造上下文
pub(crate) fn fake_context(config: &Config) -> (Arc<MiningContext>, Arc<FakeIo>) {
    let io = FakeIo::new();
    let supervisor = Supervisor::new(io.clone(), Watchdog::new(Duration::from_secs(1)), false);
    let context = MiningContext::new(Registry::load(config), config.settings.clone(), supervisor);
    (Arc::new(context), io)
}

pub(crate) fn scenario_worker(config: &Config) -> (Worker, Arc<FakeIo>) {
    let (context, io) = fake_context(config);
    let worker = Worker::from_config("rig", &config.workers["rig"], context).unwrap();
    (worker, io)
}

/// C1 的收益为 1.0 × 100 / 1e9, C2 为 1.5 × 50 / 1e9
pub(crate) fn scenario_stats(c1_profit: f64, c2_profit: f64) -> Vec<StatCoin> {
    vec![
        StatCoin::new("C1", "algoA", c1_profit, "1G").with_host("c1.pool", 1111),
        StatCoin::new("C2", "algoB", c2_profit, "1G").with_host("c2.pool", 2222),
    ]
}

type Handles = (mpsc::UnboundedSender<String>, oneshot::Sender<Option<i32>>);

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    spawned: Vec<(String, CommandLine)>,
    live: HashMap<u32, Handles>,
    terminated: Vec<u32>,
}

#[derive(Default)]
pub(crate) struct FakeIo {
    state: Mutex<FakeState>,
}

impl FakeIo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 已启动的 (程序 ID, 命令行)，按启动顺序
    pub fn spawned(&self) -> Vec<(String, CommandLine)> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn spawned_apps(&self) -> Vec<String> {
        self.spawned().into_iter().map(|(app, _)| app).collect()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().unwrap().terminated.clone()
    }

    /// 模拟进程自行退出
    pub fn crash(&self, pid: u32) {
        if let Some((_, exit)) = self.state.lock().unwrap().live.remove(&pid) {
            let _ = exit.send(Some(1));
        }
    }

    pub fn emit(&self, pid: u32, line: &str) {
        if let Some((output, _)) = self.state.lock().unwrap().live.get(&pid) {
            let _ = output.send(line.to_string());
        }
    }
}

#[async_trait]
impl ProcessIo for FakeIo {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn spawn(&self, app_id: &str, cmd: &CommandLine) -> Result<SpawnedProcess, ProcessError> {
        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        let pid = 10_000 + state.next_pid;

        let (output_tx, output) = mpsc::unbounded_channel();
        let (exit_tx, exit) = oneshot::channel();
        state.spawned.push((app_id.to_string(), cmd.clone()));
        state.live.insert(pid, (output_tx, exit_tx));
        Ok(SpawnedProcess { pid, output, exit })
    }

    async fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        let mut state = self.state.lock().unwrap();
        match state.live.remove(&pid) {
            Some((_, exit)) => {
                let _ = exit.send(Some(0));
                state.terminated.push(pid);
                Ok(())
            }
            None => Err(ProcessError::TerminateFailed { pid, error: "no such process".to_string() }),
        }
    }
}

/// 等待条件成立, 最多约两秒
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
