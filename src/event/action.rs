use crate::config::{ActionConfig, ApplicationConfig, Settings};
use crate::error::{ActionError, ConfigError};
use crate::logging::{log_at, CustomLogger};
use crate::process::application::split_args;
use crate::process::Application;
use crate::utils::{inject, Value, Vars};
use crate::worker::Worker;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{warn, Level};

#[derive(Debug)]
pub enum ActionKind {
    /// 按固定级别输出一条模板消息
    Log { level: Level, message: String },
    /// 输出到命名日志器
    LogCustom { logger: Arc<CustomLogger>, level: Level, message: String },
    /// 启动已登记的程序, `context` 覆盖事件变量
    ExecApp { app: Arc<Application>, context: Vars },
    /// 启动临时命令, 可等待其结束
    ExecAny { app: Arc<Application>, synchronized: bool },
    PauseMining,
    ResumeMining,
    /// 故意 panic, 用于故障注入
    DebugCrash { message: Option<String> },
}

#[derive(Debug)]
pub struct Action {
    id: String,
    kind: ActionKind,
}

/// 日志级别名称, 不区分大小写
pub fn parse_severity(name: &str) -> Option<Level> {
    match name.to_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "FATAL" | "UNKNOWN" => Some(Level::ERROR),
        _ => None,
    }
}

struct ArgReader<'a> {
    id: &'a str,
    args: &'a Map<String, Json>,
}

impl<'a> ArgReader<'a> {
    fn field(&self, name: &str) -> String {
        format!("actions.{}.args.{}", self.id, name)
    }

    fn get(&self, names: &[&str]) -> Option<&'a Json> {
        names.iter().find_map(|n| self.args.get(*n))
    }

    fn string(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.args.get(name) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ConfigError::InvalidValue {
                field: self.field(name),
                value: other.to_string(),
                reason: "expected a string".to_string(),
            }),
        }
    }

    fn required_string(&self, name: &str) -> Result<String, ConfigError> {
        self.string(name)?.ok_or_else(|| ConfigError::MissingField { field: self.field(name) })
    }

    fn flag(&self, names: &[&str], default: bool) -> Result<bool, ConfigError> {
        match self.get(names) {
            None | Some(Json::Null) => Ok(default),
            Some(Json::Bool(b)) => Ok(*b),
            Some(other) => Err(ConfigError::InvalidValue {
                field: self.field(names[0]),
                value: other.to_string(),
                reason: "expected true or false".to_string(),
            }),
        }
    }

    fn severity(&self) -> Result<Level, ConfigError> {
        let Some(name) = self.string("severity")?.or(self.string("level")?) else {
            return Ok(Level::INFO);
        };
        parse_severity(&name).ok_or_else(|| ConfigError::InvalidValue {
            field: self.field("severity"),
            value: name,
            reason: "unknown log severity".to_string(),
        })
    }
}

impl Action {
    pub fn new(id: &str, kind: ActionKind) -> Self {
        Self { id: id.to_string(), kind }
    }

    pub fn from_config(
        id: &str,
        config: &ActionConfig,
        applications: &HashMap<String, Arc<Application>>,
        settings: &Settings,
    ) -> Result<Self, ConfigError> {
        let action_id = config
            .action_id
            .as_deref()
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::MissingField { field: format!("actions.{}.action_id", id) })?;
        let args = ArgReader { id, args: &config.args };

        let kind = match action_id.as_str() {
            "log" => ActionKind::Log {
                level: args.severity()?,
                message: args.required_string("message")?,
            },
            "log_custom" => {
                let name = args.required_string("name")?;
                let to_file = args.flag(&["to_file", "toFile"], true)?;
                let to_console = args.flag(&["to_console", "toConsole"], true)?;
                ActionKind::LogCustom {
                    logger: Arc::new(CustomLogger::new(&name, &settings.log_dir, to_file, to_console)),
                    level: args.severity()?,
                    message: args.required_string("message")?,
                }
            }
            "exec_app" => {
                let app_id = args.required_string("id")?;
                let app = applications.get(&app_id).ok_or_else(|| ConfigError::UnknownReference {
                    kind: "application",
                    id: app_id.clone(),
                })?;
                let context = match args.get(&["context"]) {
                    Some(Json::Object(map)) => {
                        map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()
                    }
                    None | Some(Json::Null) => Vars::new(),
                    Some(other) => {
                        return Err(ConfigError::InvalidValue {
                            field: args.field("context"),
                            value: other.to_string(),
                            reason: "expected an object".to_string(),
                        })
                    }
                };
                ActionKind::ExecApp { app: app.clone(), context }
            }
            "exec_any" => ActionKind::ExecAny {
                app: Arc::new(adhoc_application(id, &args)?),
                synchronized: args.flag(&["synchronized"], false)?,
            },
            "pause_mining" => ActionKind::PauseMining,
            "resume_mining" => ActionKind::ResumeMining,
            "debug_crash" => ActionKind::DebugCrash { message: args.string("message")? },
            _ => return Err(ConfigError::UnknownAction { id: id.to_string(), action_id }),
        };

        Ok(Self::new(id, kind))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub async fn execute(&self, worker: &mut Worker, vars: &Vars) -> Result<(), ActionError> {
        match &self.kind {
            ActionKind::Log { level, message } => {
                log_at(*level, worker.id(), &inject(message, vars, true));
            }
            ActionKind::LogCustom { logger, level, message } => {
                logger.log(*level, &inject(message, vars, true));
            }
            ActionKind::ExecApp { app, context } => {
                let mut env = vars.clone();
                env.extend(context.iter().map(|(k, v)| (k.clone(), v.clone())));
                let mut executor = worker.supervisor().executor(app.clone());
                executor.start(&env).await.map_err(|source| self.process_error(source))?;
            }
            ActionKind::ExecAny { app, synchronized } => {
                let mut env = worker.app_environment();
                env.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
                let mut executor = worker.supervisor().executor(app.clone());
                executor.start(&env).await.map_err(|source| self.process_error(source))?;
                if *synchronized {
                    executor.wait_for_terminate().await;
                }
            }
            ActionKind::PauseMining => worker.pause_mining().await,
            ActionKind::ResumeMining => worker.resume_mining().await,
            ActionKind::DebugCrash { message } => {
                warn!(worker = %worker.id(), action = %self.id, "Debug crash activated for {}", worker.id());
                panic!("{}", message.as_deref().unwrap_or("debug crash"));
            }
        }
        Ok(())
    }

    fn process_error(&self, source: crate::error::ProcessError) -> ActionError {
        ActionError::Process { action: self.id.clone(), source }
    }
}

/// `exec_any` 的命令: 完整的程序描述对象, 或者一行 "可执行文件 参数..."
fn adhoc_application(id: &str, args: &ArgReader<'_>) -> Result<Application, ConfigError> {
    let app_id = format!("action/{}", id);
    match args.get(&["command", "cmd"]) {
        Some(Json::Object(map)) => {
            let mut config: ApplicationConfig = serde_json::from_value(Json::Object(map.clone()))
                .map_err(|e| ConfigError::InvalidValue {
                    field: args.field("command"),
                    value: Json::Object(map.clone()).to_string(),
                    reason: e.to_string(),
                })?;
            config.working_dir.get_or_insert_with(|| PathBuf::from("."));
            Application::from_config(&app_id, &config)
        }
        Some(Json::String(line)) => {
            let mut parts = split_args(line).into_iter();
            let Some(executable) = parts.next().filter(|exe| !exe.is_empty()) else {
                return Err(ConfigError::MissingField { field: args.field("command") });
            };
            let rest: Vec<String> = parts.map(|arg| quote_arg(&arg)).collect();
            Ok(Application::new(&app_id, ".", &executable).with_args(&rest.join(" ")))
        }
        Some(other) => Err(ConfigError::InvalidValue {
            field: args.field("command"),
            value: other.to_string(),
            reason: "expected an object or a command line".to_string(),
        }),
        None => Err(ConfigError::MissingField { field: args.field("command") }),
    }
}

/// 重新拼接参数时保留含空白或引号的参数
fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        "\"\"".to_string()
    } else if !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        arg.to_string()
    } else if arg.contains('"') {
        format!("'{}'", arg)
    } else {
        format!("\"{}\"", arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(id: &str, json: &str) -> Result<Action, ConfigError> {
        let config: ActionConfig = serde_json::from_str(json).unwrap();
        let mut apps = HashMap::new();
        apps.insert(
            "notify".to_string(),
            Arc::new(Application::new("notify", ".", "notify-send")),
        );
        Action::from_config(id, &config, &apps, &Settings::default())
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("warn"), Some(Level::WARN));
        assert_eq!(parse_severity("Fatal"), Some(Level::ERROR));
        assert_eq!(parse_severity("loud"), None);
    }

    #[test]
    fn test_log_action() {
        let action =
            parse("a", r#"{"action_id": "LOG", "args": {"severity": "warn", "message": "$(WORKER.ID)"}}"#)
                .unwrap();
        match action.kind() {
            ActionKind::Log { level, message } => {
                assert_eq!(*level, Level::WARN);
                assert_eq!(message, "$(WORKER.ID)");
            }
            other => panic!("unexpected kind {:?}", other),
        }

        assert!(matches!(
            parse("a", r#"{"action_id": "log", "args": {"severity": "loud", "message": "x"}}"#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("a", r#"{"action_id": "log"}"#),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_exec_app_action() {
        let action = parse(
            "a",
            r#"{"action_id": "exec_app", "args": {"id": "notify", "context": {"MSG": "hi", "N": 3}}}"#,
        )
        .unwrap();
        match action.kind() {
            ActionKind::ExecApp { app, context } => {
                assert_eq!(app.id, "notify");
                assert_eq!(context.get("MSG"), Some(&Value::from("hi")));
                assert_eq!(context.get("N"), Some(&Value::Int(3)));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        assert_eq!(
            parse("a", r#"{"action_id": "exec_app", "args": {"id": "missing"}}"#).unwrap_err(),
            ConfigError::UnknownReference { kind: "application", id: "missing".to_string() }
        );
    }

    #[test]
    fn test_exec_any_action() {
        let action = parse(
            "hook",
            r#"{"action_id": "exec_any", "args": {"synchronized": true,
                "command": {"executable": "/bin/echo", "args": "$(JOB.COIN.ID)"}}}"#,
        )
        .unwrap();
        match action.kind() {
            ActionKind::ExecAny { app, synchronized } => {
                assert!(*synchronized);
                assert_eq!(app.id, "action/hook");
                assert_eq!(app.executable, "/bin/echo");
                assert_eq!(app.working_dir, PathBuf::from("."));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let action =
            parse("line", r#"{"action_id": "exec_any", "args": {"command": "/bin/echo  hello world"}}"#)
                .unwrap();
        match action.kind() {
            ActionKind::ExecAny { app, synchronized } => {
                assert!(!*synchronized);
                assert_eq!(app.executable, "/bin/echo");
                assert_eq!(app.args, "hello world");
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let action = parse(
            "quoted",
            r#"{"action_id": "exec_any", "args": {"command": "\"/opt/my miner/run\" -a 'x y' $(JOB.COIN.ID)"}}"#,
        )
        .unwrap();
        match action.kind() {
            ActionKind::ExecAny { app, .. } => {
                assert_eq!(app.executable, "/opt/my miner/run");
                assert_eq!(split_args(&app.args), vec!["-a", "x y", "$(JOB.COIN.ID)"]);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(
            parse("a", r#"{"action_id": "teleport"}"#).unwrap_err(),
            ConfigError::UnknownAction { id: "a".to_string(), action_id: "teleport".to_string() }
        );
    }

    #[test]
    fn test_simple_actions() {
        assert!(matches!(
            parse("p", r#"{"action_id": "pause_mining"}"#).unwrap().kind(),
            ActionKind::PauseMining
        ));
        assert!(matches!(
            parse("r", r#"{"action_id": "resume_mining"}"#).unwrap().kind(),
            ActionKind::ResumeMining
        ));
        match parse("c", r#"{"action_id": "debug_crash", "args": {"message": "boom"}}"#)
            .unwrap()
            .kind()
        {
            ActionKind::DebugCrash { message } => assert_eq!(message.as_deref(), Some("boom")),
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
