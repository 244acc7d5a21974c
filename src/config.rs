use crate::error::ConfigError;
use crate::feed::ProfitField;
use crate::utils::parse_hashrate;
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;


/// 当前支持的配置文件版本
pub const CONFIG_VERSION: u32 = 1;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(default_value = "config.json")]
    pub config: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Log level (overrides settings.log_level)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write JSON logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub config_version: u32,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
    #[serde(default)]
    pub applications: BTreeMap<String, ApplicationConfig>,
    #[serde(default)]
    pub miners: BTreeMap<String, MinerConfig>,
    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerConfig>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionConfig>,
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerConfig>,
}

/// 全局设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// 两次切换检查之间的秒数
    #[serde(default = "default_switch_interval")]
    pub switch_interval: u64,
    /// 矿工程序的网络超时 (秒)
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    #[serde(default)]
    pub account: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub show_miner_output: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub process_io: ProcessIoMode,
    /// 关机时等待后台任务的宽限期 (秒)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
    #[serde(default)]
    pub stats_url: Option<String>,
}

/// 子进程 I/O 方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessIoMode {
    /// Unix 用伪终端, Windows 用管道
    #[default]
    Auto,
    Pty,
    Pipes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub coins: Vec<CoinConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// 可运行程序描述
///
/// 字段都是可选的，缺失时在加载阶段跳过该程序而不是让整个配置失败。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default, alias = "workingDir")]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub args: String,
    #[serde(default = "default_true")]
    pub daemon: bool,
    #[serde(default = "default_true", alias = "killOnExit")]
    pub kill_on_exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default, alias = "coinRemap")]
    pub coin_remap: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub filters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profit_field: ProfitField,
    #[serde(default = "default_threshold", alias = "percentProfitThreshold")]
    pub percent_profit_threshold: f64,
    #[serde(default)]
    pub algorithms: BTreeMap<String, WorkerAlgorithmConfig>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAlgorithmConfig {
    #[serde(default)]
    pub miners: BTreeMap<String, WorkerMinerConfig>,
    #[serde(default, alias = "whitelistCoins")]
    pub whitelist_coins: Option<Vec<String>>,
    #[serde(default, alias = "blacklistCoins")]
    pub blacklist_coins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMinerConfig {
    pub rate: RateValue,
}

/// 额定算力: 数字 (H/s) 或带单位的字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Number(f64),
    Text(String),
}

impl RateValue {
    /// 换算成 H/s
    pub fn hashes_per_second(&self) -> Option<f64> {
        match self {
            RateValue::Number(n) if n.is_finite() && *n >= 0.0 => Some(*n),
            RateValue::Number(_) => None,
            RateValue::Text(s) => parse_hashrate(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub trigger: String,
    pub action: String,
}

fn default_switch_interval() -> u64 {
    60
}

fn default_reconnect_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./log")
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_threshold() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            switch_interval: default_switch_interval(),
            reconnect_interval: default_reconnect_interval(),
            account: String::new(),
            log_level: default_log_level(),
            show_miner_output: true,
            log_dir: default_log_dir(),
            log_file: None,
            process_io: ProcessIoMode::Auto,
            shutdown_grace: default_shutdown_grace(),
            stats_url: None,
        }
    }
}

impl Settings {
    pub fn switch_interval(&self) -> Duration {
        Duration::from_secs(self.switch_interval)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).is_file() {
            return Err(ConfigError::FileNotFound { path: path.to_string() }.into());
        }

        let config_content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let is_toml = Path::new(path)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config: Config = if is_toml {
            toml::from_str(&config_content)
                .with_context(|| format!("Failed to parse config file: {}", path))?
        } else {
            serde_json::from_str(&config_content)
                .with_context(|| format!("Failed to parse config file: {}", path))?
        };

        config.validate()?;

        Ok(config)
    }

    /// 从 JSON 字符串解析并校验
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError { error: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_version != CONFIG_VERSION {
            return Err(ConfigError::InvalidValue {
                field: "config_version".to_string(),
                value: self.config_version.to_string(),
                reason: format!("only version {} is supported", CONFIG_VERSION),
            });
        }

        if self.settings.switch_interval == 0 {
            return Err(ConfigError::ValidationError {
                field: "settings.switch_interval".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.workers.is_empty() {
            return Err(ConfigError::MissingField { field: "workers".to_string() });
        }

        for (id, worker) in &self.workers {
            let threshold = worker.percent_profit_threshold;
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ConfigError::ValidationError {
                    field: format!("workers.{}.percent_profit_threshold", id),
                    reason: "must be a positive number".to_string(),
                });
            }
        }

        Ok(())
    }

    /// 检查配置是否有效
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
