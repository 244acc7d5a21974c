//! 日志系统

pub mod custom;
pub mod formatter;

use crate::config::{Args, Settings};
use crate::error::MiningError;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use custom::CustomLogger;

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: String,
    /// JSON 日志文件路径
    pub file_path: Option<PathBuf>,
    /// 是否启用彩色输出
    pub colored: bool,
    /// 文件日志轮转方式
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            colored: true,
            rotation: LogRotation::Daily,
        }
    }
}

impl LogConfig {
    /// 命令行参数优先于配置文件
    pub fn from_settings(settings: &Settings, args: &Args) -> Self {
        let level = if args.debug {
            "debug".to_string()
        } else {
            args.log_level.clone().unwrap_or_else(|| settings.log_level.clone())
        };

        Self {
            level,
            file_path: args.log_file.clone().or_else(|| settings.log_file.clone()),
            ..Default::default()
        }
    }
}

/// 解析日志级别, 未知值退回 INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "fatal" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// 初始化日志系统
///
/// 返回的 guard 必须在进程生命周期内保持存活，否则文件日志会丢失。
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>, MiningError> {
    let env_filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());

    let console_layer = fmt::layer()
        .with_ansi(config.colored)
        .event_format(formatter::AgentFormatter::new(config.colored));

    let registry = tracing_subscriber::registry().with(env_filter).with(console_layer);

    let Some(file_path) = config.file_path else {
        registry
            .try_init()
            .map_err(|e| MiningError::System(format!("Failed to initialize logging: {}", e)))?;
        return Ok(None);
    };

    let directory = file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("profit-switcher.log")
        .to_string();

    let (writer, guard) = match config.rotation {
        LogRotation::Never => non_blocking(rolling::never(&directory, &file_name)),
        LogRotation::Hourly => non_blocking(rolling::hourly(&directory, &file_name)),
        LogRotation::Daily => non_blocking(rolling::daily(&directory, &file_name)),
    };

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .json();

    registry
        .with(file_layer)
        .try_init()
        .map_err(|e| MiningError::System(format!("Failed to initialize logging: {}", e)))?;

    Ok(Some(guard))
}

/// 以运行时决定的级别输出一条带作用域的日志
pub fn log_at(level: Level, scope: &str, message: &str) {
    match level {
        Level::ERROR => tracing::error!(logger = scope, "{}", message),
        Level::WARN => tracing::warn!(logger = scope, "{}", message),
        Level::INFO => tracing::info!(logger = scope, "{}", message),
        Level::DEBUG => tracing::debug!(logger = scope, "{}", message),
        Level::TRACE => tracing::trace!(logger = scope, "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("FATAL"), Level::ERROR);
        assert_eq!(parse_level("chatty"), Level::INFO);
    }

    #[test]
    fn test_log_config_precedence() {
        let settings = Settings { log_level: "warn".to_string(), ..Default::default() };

        let args = Args::parse_from(["profit-switcher", "rig.json"]);
        assert_eq!(LogConfig::from_settings(&settings, &args).level, "warn");

        let args = Args::parse_from(["profit-switcher", "rig.json", "--log-level", "error"]);
        assert_eq!(LogConfig::from_settings(&settings, &args).level, "error");

        let args = Args::parse_from(["profit-switcher", "rig.json", "--debug", "--log-level", "error"]);
        assert_eq!(LogConfig::from_settings(&settings, &args).level, "debug");
    }

    #[test]
    fn test_init_logging_twice_reports_error() {
        let _ = init_logging(LogConfig::default());
        assert!(init_logging(LogConfig::default()).is_err());
    }
}
