//! 集成测试共用的辅助代码

#![allow(dead_code)]

use async_trait::async_trait;
use profit_switcher::config::Config;
use profit_switcher::error::{FeedError, ProcessError};
use profit_switcher::feed::{StatCoin, StatsSource};
use profit_switcher::process::{CommandLine, ProcessIo, SpawnedProcess, Supervisor};
use profit_switcher::registry::Registry;
use profit_switcher::{MiningContext, Watchdog};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub const SCENARIO: &str = r#"{
    "config_version": 1,
    "settings": {"account": "alice", "switch_interval": 1},
    "algorithms": [
        {"id": "algoA", "coins": [{"id": "C1"}]},
        {"id": "algoB", "coins": [{"id": "C2"}]}
    ],
    "applications": {
        "minerx": {"working_dir": ".", "executable": "minerx", "args": "-o $(JOB.HOST) -u $(JOB.WORKER.USERNAME)"},
        "minery": {"working_dir": ".", "executable": "minery", "args": "-o $(JOB.HOST) -u $(JOB.WORKER.USERNAME)"},
        "hook": {"working_dir": ".", "executable": "hook", "args": "$(HOOK) $(TIMER.ID) $(TIMEOUT.ID)"}
    },
    "miners": {
        "minerX": {"app": "minerx"},
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

pub fn scenario(patch: impl FnOnce(&mut serde_json::Value)) -> Config {
    let mut json: serde_json::Value = serde_json::from_str(SCENARIO).unwrap();
    patch(&mut json);
    let config: Config = serde_json::from_value(json).unwrap();
    config.validate().unwrap();
    config
}

pub fn stats(c1_profit: f64, c2_profit: f64) -> Vec<StatCoin> {
    vec![
        StatCoin::new("C1", "algoA", c1_profit, "1G").with_host("c1.pool", 1111),
        StatCoin::new("C2", "algoB", c2_profit, "1G").with_host("c2.pool", 2222),
    ]
}

/// 只记录命令行的进程 I/O
#[derive(Default)]
pub struct RecordingIo {
    next_pid: Mutex<u32>,
    spawned: Mutex<Vec<(String, CommandLine)>>,
    live: Mutex<HashMap<u32, (mpsc::UnboundedSender<String>, oneshot::Sender<Option<i32>>)>>,
}

impl RecordingIo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn apps(&self) -> Vec<String> {
        self.spawned.lock().unwrap().iter().map(|(app, _)| app.clone()).collect()
    }

    pub fn commands(&self, app: &str) -> Vec<Vec<String>> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == app)
            .map(|(_, cmd)| cmd.args.clone())
            .collect()
    }

    pub fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessIo for RecordingIo {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn spawn(&self, app_id: &str, cmd: &CommandLine) -> Result<SpawnedProcess, ProcessError> {
        let pid = {
            let mut next = self.next_pid.lock().unwrap();
            *next += 1;
            *next
        };
        let (output_tx, output) = mpsc::unbounded_channel();
        let (exit_tx, exit) = oneshot::channel();
        self.spawned.lock().unwrap().push((app_id.to_string(), cmd.clone()));
        self.live.lock().unwrap().insert(pid, (output_tx, exit_tx));
        Ok(SpawnedProcess { pid, output, exit })
    }

    async fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        match self.live.lock().unwrap().remove(&pid) {
            Some((_, exit)) => {
                let _ = exit.send(Some(0));
                Ok(())
            }
            None => Err(ProcessError::TerminateFailed { pid, error: "not running".to_string() }),
        }
    }
}

pub fn context(config: &Config, io: Arc<dyn ProcessIo>, watchdog: Watchdog) -> Arc<MiningContext> {
    let supervisor = Supervisor::new(io, watchdog, false);
    Arc::new(MiningContext::new(Registry::load(config), config.settings.clone(), supervisor))
}

/// 依次返回预设结果的统计数据源
pub struct ScriptedStats {
    script: Mutex<Vec<Result<Vec<StatCoin>, String>>>,
}

impl ScriptedStats {
    pub fn new(mut script: Vec<Result<Vec<StatCoin>, String>>) -> Self {
        script.reverse();
        Self { script: Mutex::new(script) }
    }
}

#[async_trait]
impl StatsSource for ScriptedStats {
    async fn fetch(&self) -> Result<Vec<StatCoin>, FeedError> {
        match self.script.lock().unwrap().pop() {
            Some(Ok(stats)) => Ok(stats),
            Some(Err(message)) => Err(FeedError::Server { message }),
            None => Err(FeedError::Server { message: "script exhausted".to_string() }),
        }
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
