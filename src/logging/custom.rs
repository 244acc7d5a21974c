//! 命名日志器
//!
//! 由 `log_custom` 动作使用，可以同时写控制台和独立的日志文件
//! (`<log_dir>/<name>.log`，名字中的非法字符替换为下划线)。

use crate::logging::formatter::{level_name, timestamp};
use crate::logging::log_at;
use chrono::Local;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{warn, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub struct CustomLogger {
    name: String,
    console: bool,
    file: Option<Mutex<RollingFileAppender>>,
}

impl fmt::Debug for CustomLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomLogger")
            .field("name", &self.name)
            .field("console", &self.console)
            .field("file", &self.file.is_some())
            .finish()
    }
}

/// 文件名中只保留字母、数字、`-`、`_` 和 `.`
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "custom".to_string()
    } else {
        cleaned
    }
}

impl CustomLogger {
    pub fn new(name: &str, log_dir: &Path, to_file: bool, to_console: bool) -> Self {
        let file = if to_file { open_log_file(name, log_dir) } else { None };
        Self { name: name.to_string(), console: to_console, file }
    }

    pub fn console_only(name: &str) -> Self {
        Self { name: name.to_string(), console: true, file: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn writes_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn log(&self, level: Level, message: &str) {
        if self.console {
            log_at(level, &self.name, message);
        }

        if let Some(file) = &self.file {
            let line = format!(
                "[{}][{}][{}] {}\n",
                timestamp(Local::now()),
                level_name(&level),
                self.name,
                message
            );
            let mut appender = file.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = appender.write_all(line.as_bytes()).and_then(|_| appender.flush()) {
                warn!(logger = %self.name, "Failed to write log file: {}", e);
            }
        }
    }
}

fn open_log_file(name: &str, log_dir: &Path) -> Option<Mutex<RollingFileAppender>> {
    let built = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(sanitize_name(name))
        .filename_suffix("log")
        .build(log_dir);

    match built {
        Ok(appender) => Some(Mutex::new(appender)),
        Err(e) => {
            warn!(
                logger = %name,
                "Unable to open log file in {}: {}, logging to console only",
                log_dir.display(),
                e
            );
            None
        }
    }
}
