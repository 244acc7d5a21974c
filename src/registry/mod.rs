//! 全局对象注册表
//!
//! 算法、币种、程序、矿工、触发器和动作在启动时从配置一次性载入，
//! 之后只读共享。单条记录出错时跳过并记录警告，不影响其余记录。

pub mod coins;
pub mod miners;

use crate::config::Config;
use crate::error::ConfigError;
use crate::event::{Action, Event, Trigger};
use crate::process::Application;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub use coins::{Algorithm, Coin};
pub use miners::Miner;

#[derive(Debug, Default)]
pub struct Registry {
    algorithms: HashMap<String, Arc<Algorithm>>,
    coins: HashMap<String, Arc<Coin>>,
    applications: HashMap<String, Arc<Application>>,
    miners: HashMap<String, Arc<Miner>>,
    triggers: HashMap<String, Arc<Trigger>>,
    actions: HashMap<String, Arc<Action>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按依赖顺序载入全部记录
    pub fn load(config: &Config) -> Self {
        let mut registry = Self::new();

        for algorithm in &config.algorithms {
            let (algorithm, coins) = Algorithm::from_config(algorithm);
            registry.add_algorithm(algorithm, coins);
        }

        for (id, app) in &config.applications {
            match Application::from_config(id, app) {
                Ok(app) => registry.add_application(app),
                Err(e) => warn!("Skipping application '{}': {}", id, e),
            }
        }

        for (id, miner) in &config.miners {
            match Miner::from_config(id, miner, &registry.applications) {
                Ok(miner) => registry.add_miner(miner),
                Err(e) => warn!("Skipping miner '{}': {}", id, e),
            }
        }

        for (id, trigger) in &config.triggers {
            match Trigger::from_config(id, trigger) {
                Ok(trigger) => registry.add_trigger(trigger),
                Err(e) => warn!("Skipping trigger '{}': {}", id, e),
            }
        }

        for (id, action) in &config.actions {
            match Action::from_config(id, action, &registry.applications, &config.settings) {
                Ok(action) => registry.add_action(action),
                Err(e) => warn!("Skipping action '{}': {}", id, e),
            }
        }

        info!(
            "Loaded {} algorithms, {} coins, {} applications, {} miners, {} triggers, {} actions",
            registry.algorithms.len(),
            registry.coins.len(),
            registry.applications.len(),
            registry.miners.len(),
            registry.triggers.len(),
            registry.actions.len()
        );
        registry
    }

    /// 注册算法及其币种; 重复的 ID 以后载入的为准
    pub fn add_algorithm(&mut self, algorithm: Algorithm, coins: Vec<Coin>) {
        if let Some(previous) = self.algorithms.remove(&algorithm.id) {
            warn!("Duplicate algorithm '{}'", algorithm.id);
            // 旧定义独有的币种随之注销
            for coin_id in previous.coin_ids() {
                if self.coins.get(coin_id).is_some_and(|c| c.algorithm == previous.id) {
                    self.coins.remove(coin_id);
                }
            }
        }
        for coin in coins {
            if let Some(existing) = self.coins.get(&coin.id) {
                warn!(
                    "Duplicate coin '{}', moving it from '{}' to '{}'",
                    coin.id, existing.algorithm, coin.algorithm
                );
            }
            self.coins.insert(coin.id.clone(), Arc::new(coin));
        }
        self.algorithms.insert(algorithm.id.clone(), Arc::new(algorithm));
    }

    pub fn add_application(&mut self, app: Application) {
        self.applications.insert(app.id.clone(), Arc::new(app));
    }

    pub fn add_miner(&mut self, miner: Miner) {
        if self.miners.contains_key(&miner.id) {
            warn!("Duplicate miner '{}'", miner.id);
        }
        self.miners.insert(miner.id.clone(), Arc::new(miner));
    }

    pub fn add_trigger(&mut self, trigger: Trigger) {
        self.triggers.insert(trigger.id().to_string(), Arc::new(trigger));
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.insert(action.id().to_string(), Arc::new(action));
    }

    pub fn algorithm(&self, id: &str) -> Option<&Arc<Algorithm>> {
        self.algorithms.get(id)
    }

    pub fn coin(&self, id: &str) -> Option<&Arc<Coin>> {
        self.coins.get(id)
    }

    pub fn application(&self, id: &str) -> Option<&Arc<Application>> {
        self.applications.get(id)
    }

    pub fn applications(&self) -> &HashMap<String, Arc<Application>> {
        &self.applications
    }

    pub fn miner(&self, id: &str) -> Option<&Arc<Miner>> {
        self.miners.get(id)
    }

    pub fn trigger(&self, id: &str) -> Option<&Arc<Trigger>> {
        self.triggers.get(id)
    }

    pub fn action(&self, id: &str) -> Option<&Arc<Action>> {
        self.actions.get(id)
    }

    /// 由触发器和动作组成事件, 多次查找得到的是同一对实例
    pub fn event(&self, trigger_id: &str, action_id: &str) -> Result<Event, ConfigError> {
        let trigger = self.trigger(trigger_id).ok_or_else(|| ConfigError::UnknownReference {
            kind: "trigger",
            id: trigger_id.to_string(),
        })?;
        let action = self.action(action_id).ok_or_else(|| ConfigError::UnknownReference {
            kind: "action",
            id: action_id.to_string(),
        })?;
        Ok(Event::new(trigger.clone(), action.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        serde_json::from_str(
            r#"{
                "config_version": 1,
                "algorithms": [
                    {"id": "lyra2v2", "coins": [{"id": "vertcoin"}, {"id": "monacoin"}]},
                    {"id": "lyra2z", "coins": [{"id": "vertcoin"}, {"id": "zcoin"}]},
                    {"id": "x11", "coins": [{"id": "dash"}]},
                    {"id": "x11", "coins": [{"id": "other"}]}
                ],
                "applications": {
                    "ccminer": {"working_dir": ".", "executable": "ccminer"},
                    "broken": {"working_dir": "."}
                },
                "miners": {
                    "ccminer": {"app": "ccminer"},
                    "orphan": {"app": "broken"}
                },
                "triggers": {
                    "boot": {"trigger_id": "startup"},
                    "weird": {"trigger_id": "sunrise"}
                },
                "actions": {
                    "hello": {"action_id": "log", "args": {"message": "hi"}},
                    "nope": {"action_id": "teleport"}
                },
                "workers": {"rig": {}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_load_skips_invalid_entries() {
        let registry = Registry::load(&config());

        assert!(registry.algorithm("lyra2v2").is_some());
        assert!(registry.algorithm("lyra2z").is_some());
        assert!(registry.application("broken").is_none());
        assert!(registry.miner("ccminer").is_some());
        assert!(registry.miner("orphan").is_none());
        assert!(registry.trigger("boot").is_some());
        assert!(registry.trigger("weird").is_none());
        assert!(registry.action("hello").is_some());
        assert!(registry.action("nope").is_none());
    }

    #[test]
    fn test_later_duplicates_win() {
        let registry = Registry::load(&config());

        assert_eq!(registry.coin("vertcoin").unwrap().algorithm, "lyra2z");
        assert_eq!(registry.coin("monacoin").unwrap().algorithm, "lyra2v2");

        let x11 = registry.algorithm("x11").unwrap();
        assert!(x11.has_coin("other"));
        assert!(!x11.has_coin("dash"));
        // 被覆盖的算法定义里的币种不再登记
        assert!(registry.coin("dash").is_none());
        assert_eq!(registry.coin("other").unwrap().algorithm, "x11");
    }

    #[test]
    fn test_event_shares_instances() {
        let registry = Registry::load(&config());
        let first = registry.event("boot", "hello").unwrap();
        let second = registry.event("boot", "hello").unwrap();

        assert!(Arc::ptr_eq(first.trigger(), second.trigger()));
        assert!(Arc::ptr_eq(first.action(), second.action()));
        assert!(Arc::ptr_eq(first.trigger(), registry.trigger("boot").unwrap()));

        assert!(matches!(
            registry.event("boot", "nope"),
            Err(ConfigError::UnknownReference { kind: "action", .. })
        ));
    }
}
