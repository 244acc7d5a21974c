use crate::config::ApplicationConfig;
use crate::error::ConfigError;
use crate::process::CommandLine;
use crate::utils::{inject, Vars};
use std::path::{Path, PathBuf};

/// 可运行程序
///
/// `args` 是参数模板，启动时注入变量后再拆分成参数列表。
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub id: String,
    pub working_dir: PathBuf,
    pub executable: String,
    pub args: String,
    /// 守护程序不参与看门狗的退出等待
    pub daemon: bool,
    /// 进程退出时终止该程序
    pub kill_on_exit: bool,
}

impl Application {
    pub fn new(id: &str, working_dir: impl Into<PathBuf>, executable: &str) -> Self {
        Self {
            id: id.to_string(),
            working_dir: working_dir.into(),
            executable: executable.to_string(),
            args: String::new(),
            daemon: true,
            kill_on_exit: true,
        }
    }

    pub fn with_args(mut self, args: &str) -> Self {
        self.args = args.to_string();
        self
    }

    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn with_kill_on_exit(mut self, kill_on_exit: bool) -> Self {
        self.kill_on_exit = kill_on_exit;
        self
    }

    pub fn from_config(id: &str, config: &ApplicationConfig) -> Result<Self, ConfigError> {
        let working_dir = config.working_dir.clone().ok_or_else(|| ConfigError::MissingField {
            field: format!("applications.{}.working_dir", id),
        })?;
        let executable = match config.executable.as_deref().map(str::trim) {
            Some(exe) if !exe.is_empty() => exe.to_string(),
            _ => {
                return Err(ConfigError::MissingField {
                    field: format!("applications.{}.executable", id),
                })
            }
        };

        Ok(Self {
            id: id.to_string(),
            working_dir,
            executable,
            args: config.args.clone(),
            daemon: config.daemon,
            kill_on_exit: config.kill_on_exit,
        })
    }

    /// 带路径分隔符的相对路径按工作目录解析, 裸命令名留给系统查找
    pub fn resolve_executable(&self) -> PathBuf {
        let exe = Path::new(&self.executable);
        if exe.is_relative() && exe.components().count() > 1 {
            self.working_dir.join(exe)
        } else {
            exe.to_path_buf()
        }
    }

    pub fn command_line(&self, vars: &Vars) -> CommandLine {
        CommandLine {
            program: self.resolve_executable(),
            args: split_args(&inject(&self.args, vars, true)),
            working_dir: self.working_dir.clone(),
        }
    }
}

/// 按空白拆分参数, 单引号或双引号内的空白保留
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }
    args
}
