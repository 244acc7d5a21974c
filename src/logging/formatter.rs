//! 控制台日志格式化器
//!
//! 输出格式: `[2024-05-01(Wed) 12:00:00.123][INFO][worker-1] message`
//!
//! 方括号中的作用域取自事件的 `worker`、`app` 或 `logger` 字段，
//! 没有这些字段时退回到事件的 target。

use chrono::{DateTime, Local};
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// 作用域字段, 按优先级排列
const SCOPE_FIELDS: [&str; 3] = ["logger", "worker", "app"];

pub struct AgentFormatter {
    colored: bool,
}

impl AgentFormatter {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }
}

/// 时间戳格式, 自定义日志文件也使用它
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d(%a) %H:%M:%S%.3f").to_string()
}

pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m", // 红色
        Level::WARN => "\x1b[33m",  // 黄色
        Level::INFO => "\x1b[32m",  // 绿色
        Level::DEBUG => "\x1b[36m", // 青色
        Level::TRACE => "\x1b[37m", // 白色
    }
}

#[derive(Default)]
struct EventVisitor {
    scope: Option<(usize, String)>,
    message: String,
    extra: String,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{:?}", value));
    }
}

impl EventVisitor {
    fn record(&mut self, field: &Field, value: String) {
        let name = field.name();
        if name == "message" {
            self.message = value;
            return;
        }

        if let Some(rank) = SCOPE_FIELDS.iter().position(|f| *f == name) {
            let better = self.scope.as_ref().map(|(r, _)| rank < *r).unwrap_or(true);
            if better {
                self.scope = Some((rank, value));
            }
            return;
        }

        let _ = write!(self.extra, " {}={}", name, value);
    }
}

impl<S, N> FormatEvent<S, N> for AgentFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let level = metadata.level();

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let scope = visitor
            .scope
            .map(|(_, s)| s)
            .unwrap_or_else(|| metadata.target().to_string());

        let (color, reset) = if self.colored {
            (level_color(level), "\x1b[0m")
        } else {
            ("", "")
        };

        writeln!(
            writer,
            "[{}][{}{}{}][{}] {}{}",
            timestamp(Local::now()),
            color,
            level_name(level),
            reset,
            scope,
            visitor.message,
            visitor.extra
        )
    }
}
