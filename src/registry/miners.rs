use crate::config::MinerConfig;
use crate::error::ConfigError;
use crate::process::Application;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// 矿工程序: 一个可运行程序加上币种 ID 重映射表
#[derive(Debug, Clone, PartialEq)]
pub struct Miner {
    pub id: String,
    pub name: String,
    pub app: Arc<Application>,
    coin_remap: BTreeMap<String, String>,
}

impl Miner {
    pub fn new(id: &str, app: Arc<Application>) -> Self {
        Self { id: id.to_string(), name: id.to_string(), app, coin_remap: BTreeMap::new() }
    }

    pub fn with_remap(mut self, coin_id: &str, miner_coin_id: &str) -> Self {
        self.coin_remap.insert(coin_id.to_string(), miner_coin_id.to_string());
        self
    }

    pub fn from_config(
        id: &str,
        config: &MinerConfig,
        applications: &HashMap<String, Arc<Application>>,
    ) -> Result<Self, ConfigError> {
        let app_id = config.app.as_deref().ok_or_else(|| ConfigError::MissingField {
            field: format!("miners.{}.app", id),
        })?;
        let app = applications.get(app_id).ok_or_else(|| ConfigError::UnknownReference {
            kind: "application",
            id: app_id.to_string(),
        })?;

        Ok(Self {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            app: app.clone(),
            coin_remap: config.coin_remap.clone(),
        })
    }

    /// 矿工程序认识的币种 ID, 没有映射时原样返回
    pub fn remap_coin<'a>(&'a self, coin_id: &'a str) -> &'a str {
        self.coin_remap.get(coin_id).map(String::as_str).unwrap_or(coin_id)
    }
}
