use crate::config::TriggerConfig;
use crate::error::ConfigError;
use crate::event::{Event, ListenerKey, Signal};
use crate::utils::{Value, Vars};
use crate::watchdog::panic_message;
use crate::worker::{SharedWorker, Worker};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    /// 由工作机生命周期信号触发
    Signal(Signal),
    /// 启动后立即触发一次, 之后每隔 `interval` 触发
    Timer { interval: Duration },
    /// 启动 `delay` 之后触发一次
    Timeout { delay: Duration },
}

#[derive(Debug)]
pub struct Trigger {
    id: String,
    kind: TriggerKind,
}

impl Trigger {
    pub fn new(id: &str, kind: TriggerKind) -> Self {
        Self { id: id.to_string(), kind }
    }

    pub fn from_config(id: &str, config: &TriggerConfig) -> Result<Self, ConfigError> {
        let trigger_id = config
            .trigger_id
            .as_deref()
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::MissingField { field: format!("triggers.{}.trigger_id", id) })?;

        let kind = if let Some(signal) = Signal::parse(&trigger_id) {
            TriggerKind::Signal(signal)
        } else {
            match trigger_id.as_str() {
                "timer" => TriggerKind::Timer {
                    interval: seconds_filter(id, config, &["interval"])?,
                },
                "timeout" => TriggerKind::Timeout {
                    delay: seconds_filter(id, config, &["delay", "timeout"])?,
                },
                _ => {
                    return Err(ConfigError::UnknownTrigger { id: id.to_string(), trigger_id })
                }
            }
        };

        Ok(Self::new(id, kind))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    pub(crate) fn prepare_vars(&self, vars: &mut Vars) {
        match self.kind {
            TriggerKind::Signal(_) => {}
            TriggerKind::Timer { .. } => {
                vars.insert("TIMER.ID".to_string(), Value::from(&self.id));
            }
            TriggerKind::Timeout { .. } => {
                vars.insert("TIMEOUT.ID".to_string(), Value::from(&self.id));
            }
        }
    }

    pub(crate) fn attach(&self, worker: &mut Worker, handle: &SharedWorker, event: &Arc<Event>) {
        let key = event.key();
        debug!(worker = %worker.id(), trigger = %self.id, "Attaching {}", key);

        if let TriggerKind::Signal(signal) = self.kind {
            worker.add_listener(signal, key, event.clone());
            return;
        }

        let watchdog = worker.supervisor().watchdog().clone();
        let token = watchdog.shutdown_token().child_token();
        if !worker.add_schedule(key.clone(), token.clone()) {
            debug!(worker = %worker.id(), trigger = %self.id, "{} already scheduled", key);
            return;
        }

        let task = run_schedule(
            self.kind.clone(),
            worker.id().to_string(),
            handle.clone(),
            event.clone(),
            token,
        );
        watchdog.spawn_activity(schedule_name(worker.id(), &key), task);
    }

    pub(crate) fn detach(&self, worker: &mut Worker, key: &ListenerKey) {
        debug!(worker = %worker.id(), trigger = %self.id, "Detaching {}", key);

        match self.kind {
            TriggerKind::Signal(_) => worker.remove_listener(key),
            TriggerKind::Timer { .. } | TriggerKind::Timeout { .. } => {
                if worker.cancel_schedule(key) {
                    let name = schedule_name(worker.id(), key);
                    worker.supervisor().watchdog().remove_activity(&name);
                }
            }
        }
    }
}

fn schedule_name(worker_id: &str, key: &ListenerKey) -> String {
    format!("schedule/{}/{}", worker_id, key)
}

fn seconds_filter(id: &str, config: &TriggerConfig, names: &[&str]) -> Result<Duration, ConfigError> {
    let (name, value) = names
        .iter()
        .find_map(|n| config.filters.get(*n).map(|v| (*n, v)))
        .ok_or_else(|| ConfigError::MissingField {
            field: format!("triggers.{}.filters.{}", id, names.first().copied().unwrap_or_default()),
        })?;

    let seconds = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match seconds {
        Some(s) if s.is_finite() && s > 0.0 => Ok(Duration::from_secs_f64(s)),
        _ => Err(ConfigError::InvalidValue {
            field: format!("triggers.{}.filters.{}", id, name),
            value: value.to_string(),
            reason: "must be a positive number of seconds".to_string(),
        }),
    }
}

/// 定时/超时触发循环
///
/// 单次触发中的错误或 panic 只记录日志，循环继续到下一个周期。
/// 取消令牌是唯一的退出方式。
async fn run_schedule(
    kind: TriggerKind,
    worker_id: String,
    handle: SharedWorker,
    event: Arc<Event>,
    token: CancellationToken,
) {
    let (mut wait, period) = match kind {
        TriggerKind::Timer { interval } => (Duration::ZERO, Some(interval)),
        TriggerKind::Timeout { delay } => (delay, None),
        TriggerKind::Signal(_) => return,
    };
    let trigger_id = event.trigger().id().to_string();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let fired = AssertUnwindSafe(async {
            let mut worker = handle.lock().await;
            if token.is_cancelled() {
                return Ok(());
            }
            let mut vars = Vars::new();
            worker.inject_global_vars(&mut vars);
            event.fire(&mut worker, vars).await
        })
        .catch_unwind()
        .await;

        match fired {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(worker = %worker_id, trigger = %trigger_id, "Exception in trigger loop: {}", e)
            }
            Err(panic) => error!(
                worker = %worker_id,
                trigger = %trigger_id,
                "Trigger loop panicked: {}",
                panic_message(&*panic)
            ),
        }

        match period {
            Some(interval) => wait = interval,
            None => break,
        }
    }

    debug!(worker = %worker_id, trigger = %trigger_id, "Trigger loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> TriggerConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_signal_triggers() {
        let trigger = Trigger::from_config("t", &config(r#"{"trigger_id": "SWITCH_COIN"}"#)).unwrap();
        assert_eq!(trigger.kind(), &TriggerKind::Signal(Signal::SwitchCoin));

        let trigger = Trigger::from_config("t", &config(r#"{"trigger_id": "switch_algo"}"#)).unwrap();
        assert_eq!(trigger.kind(), &TriggerKind::Signal(Signal::SwitchAlgorithm));
    }

    #[test]
    fn test_timer_and_timeout() {
        let timer =
            Trigger::from_config("t", &config(r#"{"trigger_id": "timer", "filters": {"interval": 2.5}}"#))
                .unwrap();
        assert_eq!(timer.kind(), &TriggerKind::Timer { interval: Duration::from_millis(2500) });

        let timeout =
            Trigger::from_config("t", &config(r#"{"trigger_id": "timeout", "filters": {"timeout": "30"}}"#))
                .unwrap();
        assert_eq!(timeout.kind(), &TriggerKind::Timeout { delay: Duration::from_secs(30) });
    }

    #[test]
    fn test_invalid_triggers() {
        assert!(matches!(
            Trigger::from_config("t", &config(r#"{"trigger_id": "timer"}"#)),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            Trigger::from_config("t", &config(r#"{"trigger_id": "timer", "filters": {"interval": 0}}"#)),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            Trigger::from_config("t", &config(r#"{"trigger_id": "moon_phase"}"#)).unwrap_err(),
            ConfigError::UnknownTrigger { id: "t".to_string(), trigger_id: "moon_phase".to_string() }
        );
        assert!(matches!(
            Trigger::from_config("t", &config("{}")),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_prepare_vars() {
        let timer = Trigger::new("tick", TriggerKind::Timer { interval: Duration::from_secs(1) });
        let mut vars = Vars::new();
        timer.prepare_vars(&mut vars);
        assert_eq!(vars.get("TIMER.ID"), Some(&Value::from("tick")));

        let timeout = Trigger::new("later", TriggerKind::Timeout { delay: Duration::from_secs(1) });
        let mut vars = Vars::new();
        timeout.prepare_vars(&mut vars);
        assert_eq!(vars.get("TIMEOUT.ID"), Some(&Value::from("later")));
    }
}
