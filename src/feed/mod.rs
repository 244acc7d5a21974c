//! 收益统计数据源
//!
//! 每个周期提供一份按币种划分的统计记录，决策引擎只读取其中的
//! 币名、收益率、矿池算力和直连矿池地址。

pub mod mph;

use crate::error::FeedError;
use crate::utils::parse_hashrate;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub use mph::MphClient;

/// 单个币种的统计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatCoin {
    pub coin_name: String,
    #[serde(default)]
    pub algo: String,
    /// 每单位算力每天的收益
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub normalized_profit_amd: Option<f64>,
    #[serde(default)]
    pub normalized_profit_nvidia: Option<f64>,
    /// 矿池总算力，带单位后缀 (例如 "12.3M")
    #[serde(default, deserialize_with = "string_or_number")]
    pub pool_hash: String,
    #[serde(default)]
    pub direct_mining_host: String,
    #[serde(default)]
    pub port: u16,
}

/// 工作机使用的收益字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitField {
    #[default]
    Profit,
    NormalizedProfitAmd,
    NormalizedProfitNvidia,
}

impl StatCoin {
    /// 便于测试和工具构造的最小记录
    pub fn new(coin_name: &str, algo: &str, profit: f64, pool_hash: &str) -> Self {
        Self {
            coin_name: coin_name.to_string(),
            algo: algo.to_string(),
            profit,
            normalized_profit_amd: None,
            normalized_profit_nvidia: None,
            pool_hash: pool_hash.to_string(),
            direct_mining_host: format!("{}.example.com", coin_name),
            port: 3333,
        }
    }

    pub fn with_host(mut self, host: &str, port: u16) -> Self {
        self.direct_mining_host = host.to_string();
        self.port = port;
        self
    }

    /// 读取指定收益字段, 缺失的归一化字段视为无效
    pub fn profit_rate(&self, field: ProfitField) -> Option<f64> {
        let rate = match field {
            ProfitField::Profit => Some(self.profit),
            ProfitField::NormalizedProfitAmd => self.normalized_profit_amd,
            ProfitField::NormalizedProfitNvidia => self.normalized_profit_nvidia,
        }?;
        rate.is_finite().then_some(rate)
    }

    /// 矿池算力 (H/s)
    pub fn pool_hashrate(&self) -> Option<f64> {
        parse_hashrate(&self.pool_hash)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
        Null(Option<()>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null(_) => String::new(),
    })
}

/// 统计数据源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<StatCoin>, FeedError>;
}
