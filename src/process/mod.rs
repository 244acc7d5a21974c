//! 子进程监管
//!
//! 平台相关的启动方式都隐藏在 [`ProcessIo`] 后面:
//! - Unix 默认使用伪终端 ([`PtyIo`])，部分矿工程序必须连接真实终端才能运行
//! - Windows 没有伪终端，使用匿名管道 ([`PipeIo`])
//!
//! [`Executor`] 与其上层只依赖这个抽象。

pub mod application;
pub mod executor;
pub mod pipe;
#[cfg(unix)]
pub mod pty;

use crate::config::ProcessIoMode;
use crate::error::ProcessError;
use crate::watchdog::Watchdog;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub use application::Application;
pub use executor::Executor;
pub use pipe::PipeIo;
#[cfg(unix)]
pub use pty::PtyIo;

/// 已解析的命令行
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// 刚启动的子进程
pub struct SpawnedProcess {
    pub pid: u32,
    /// 标准输出与标准错误合并后的逐行输出, 流关闭时通道关闭
    pub output: mpsc::UnboundedReceiver<String>,
    /// 进程退出时送出退出码
    pub exit: oneshot::Receiver<Option<i32>>,
}

/// 平台相关的子进程启动与终止
#[async_trait]
pub trait ProcessIo: Send + Sync {
    fn name(&self) -> &'static str;

    /// 启动一个进程，不阻塞
    fn spawn(&self, app_id: &str, cmd: &CommandLine) -> Result<SpawnedProcess, ProcessError>;

    /// 请求终止进程
    async fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        terminate_pid(pid).await
    }
}

/// 按配置选择 I/O 实现
pub fn io_for_mode(mode: ProcessIoMode) -> Arc<dyn ProcessIo> {
    match mode {
        ProcessIoMode::Pipes => Arc::new(PipeIo::new()),
        #[cfg(unix)]
        ProcessIoMode::Auto | ProcessIoMode::Pty => Arc::new(PtyIo::new()),
        #[cfg(not(unix))]
        ProcessIoMode::Auto | ProcessIoMode::Pty => {
            if mode == ProcessIoMode::Pty {
                tracing::warn!("Pseudo-terminals are not available on this platform, using pipes");
            }
            Arc::new(PipeIo::new())
        }
    }
}

/// 把启动时的 I/O 错误分类
pub(crate) fn spawn_error(app_id: &str, cmd: &CommandLine, error: std::io::Error) -> ProcessError {
    if error.kind() == std::io::ErrorKind::NotFound {
        ProcessError::ExecutableNotFound {
            app: app_id.to_string(),
            executable: cmd.program.display().to_string(),
        }
    } else {
        ProcessError::SpawnFailed { app: app_id.to_string(), error: error.to_string() }
    }
}

/// Unix: 发送 SIGTERM
#[cfg(unix)]
pub(crate) async fn terminate_pid(pid: u32) -> Result<(), ProcessError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::TerminateFailed {
        pid,
        error: "pid out of range".to_string(),
    })?;

    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|e| ProcessError::TerminateFailed { pid, error: e.to_string() })
}

/// Windows: 先尝试 taskkill, 失败后强制结束
#[cfg(not(unix))]
pub(crate) async fn terminate_pid(pid: u32) -> Result<(), ProcessError> {
    use tokio::process::Command;

    let pid_arg = pid.to_string();
    let graceful = Command::new("taskkill").args(["/pid", &pid_arg]).status().await;
    if matches!(graceful, Ok(status) if status.success()) {
        return Ok(());
    }

    tracing::debug!("Graceful taskkill failed for pid {}, forcing", pid);
    match Command::new("taskkill").args(["/f", "/pid", &pid_arg]).status().await {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(ProcessError::TerminateFailed { pid, error: format!("taskkill exited with {}", status) }),
        Err(e) => Err(ProcessError::TerminateFailed { pid, error: e.to_string() }),
    }
}

/// 进程监管器: 所有执行器共享的 I/O 实现、看门狗和输出设置
#[derive(Clone)]
pub struct Supervisor {
    io: Arc<dyn ProcessIo>,
    watchdog: Watchdog,
    show_output: bool,
}

impl Supervisor {
    pub fn new(io: Arc<dyn ProcessIo>, watchdog: Watchdog, show_output: bool) -> Self {
        Self { io, watchdog, show_output }
    }

    pub fn from_mode(mode: ProcessIoMode, watchdog: Watchdog, show_output: bool) -> Self {
        Self::new(io_for_mode(mode), watchdog, show_output)
    }

    /// 为某个程序创建执行器
    pub fn executor(&self, app: Arc<Application>) -> Executor {
        Executor::new(app, self.clone())
    }

    pub fn io(&self) -> &Arc<dyn ProcessIo> {
        &self.io
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn show_output(&self) -> bool {
        self.show_output
    }
}
