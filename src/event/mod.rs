//! 事件系统
//!
//! 事件 = 触发器 + 动作。触发器和动作都在注册表中只载入一次，
//! 工作机持有的事件只引用它们的共享实例。

pub mod action;
pub mod trigger;

use crate::error::ActionError;
use crate::utils::Vars;
use crate::worker::{SharedWorker, Worker};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use action::{Action, ActionKind};
pub use trigger::{Trigger, TriggerKind};

/// 工作机生命周期信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Startup,
    Shutdown,
    SwitchCoin,
    SwitchAlgorithm,
    StartMining,
    StopMining,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Startup => "startup",
            Signal::Shutdown => "shutdown",
            Signal::SwitchCoin => "switch_coin",
            Signal::SwitchAlgorithm => "switch_algorithm",
            Signal::StartMining => "start_mining",
            Signal::StopMining => "stop_mining",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "startup" => Some(Signal::Startup),
            "shutdown" => Some(Signal::Shutdown),
            "switch_coin" => Some(Signal::SwitchCoin),
            "switch_algorithm" | "switch_algo" => Some(Signal::SwitchAlgorithm),
            "start_mining" => Some(Signal::StartMining),
            "stop_mining" => Some(Signal::StopMining),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 监听器键: 同一对触发器和动作在一个工作机上只登记一次
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerKey {
    pub trigger: String,
    pub action: String,
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.trigger, self.action)
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    trigger: Arc<Trigger>,
    action: Arc<Action>,
}

impl Event {
    pub fn new(trigger: Arc<Trigger>, action: Arc<Action>) -> Self {
        Self { trigger, action }
    }

    pub fn trigger(&self) -> &Arc<Trigger> {
        &self.trigger
    }

    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    pub fn key(&self) -> ListenerKey {
        ListenerKey {
            trigger: self.trigger.id().to_string(),
            action: self.action.id().to_string(),
        }
    }

    /// 把事件挂到工作机上
    pub fn attach(self: &Arc<Self>, worker: &mut Worker, handle: &SharedWorker) {
        self.trigger.attach(worker, handle, self);
    }

    pub fn detach(&self, worker: &mut Worker) {
        self.trigger.detach(worker, &self.key());
    }

    /// 触发: 补充触发器变量后执行动作
    pub async fn fire(&self, worker: &mut Worker, mut vars: Vars) -> Result<(), ActionError> {
        self.trigger.prepare_vars(&mut vars);
        debug!(
            worker = %worker.id(),
            trigger = %self.trigger.id(),
            action = %self.action.id(),
            "Activating trigger"
        );
        self.action.execute(worker, &vars).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        for signal in [
            Signal::Startup,
            Signal::Shutdown,
            Signal::SwitchCoin,
            Signal::SwitchAlgorithm,
            Signal::StartMining,
            Signal::StopMining,
        ] {
            assert_eq!(Signal::parse(signal.as_str()), Some(signal));
        }
        assert_eq!(Signal::parse("switch_algo"), Some(Signal::SwitchAlgorithm));
        assert_eq!(Signal::parse("timer"), None);
    }

    #[test]
    fn test_listener_key() {
        let trigger = Arc::new(Trigger::new("boot", TriggerKind::Signal(Signal::Startup)));
        let action = Arc::new(Action::new("pause", ActionKind::PauseMining));
        let event = Event::new(trigger, action);

        assert_eq!(event.key().to_string(), "boot->pause");
        assert_eq!(event.key(), event.clone().key());
    }
}
