//! 伪终端方式启动子进程 (Unix)
//!
//! 子进程成为新会话的首进程，并把伪终端从端设为控制终端，
//! 对它来说标准输入输出都是真实终端。

use crate::error::ProcessError;
use crate::process::{spawn_error, CommandLine, ProcessIo, SpawnedProcess};
use async_trait::async_trait;
use nix::pty::openpty;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PtyIo;

impl PtyIo {
    pub fn new() -> Self {
        Self
    }
}

fn pty_error(error: impl std::fmt::Display) -> ProcessError {
    ProcessError::Pty { error: error.to_string() }
}

#[async_trait]
impl ProcessIo for PtyIo {
    fn name(&self) -> &'static str {
        "pty"
    }

    fn spawn(&self, app_id: &str, cmd: &CommandLine) -> Result<SpawnedProcess, ProcessError> {
        let pty = openpty(None, None).map_err(pty_error)?;
        let master = File::from(pty.master);
        let stdin = pty.slave.try_clone().map_err(pty_error)?;
        let stdout = pty.slave.try_clone().map_err(pty_error)?;

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .current_dir(&cmd.working_dir)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(pty.slave));

        // SAFETY: 只调用 async-signal-safe 的 setsid 和 ioctl
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                // 设置控制终端失败时子进程仍然可以运行
                libc::ioctl(0, libc::TIOCSCTTY as _, 0);
                Ok(())
            });
        }

        let spawned = command.spawn();
        // 关闭父进程持有的从端, 子进程退出后主端才能读到 EOF
        drop(command);
        let mut child = spawned.map_err(|e| spawn_error(app_id, cmd, e))?;
        let pid = child.id().unwrap_or_default();

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        // 阻塞读放在独立线程上, 运行时关闭时不会等待它
        let reader = std::thread::Builder::new()
            .name(format!("pty-{}", app_id))
            .spawn(move || read_lines(master, line_tx));
        if let Err(e) = reader {
            let _ = child.start_kill();
            return Err(pty_error(e));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let app = app_id.to_string();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(app = %app, "Failed to wait for process {}: {}", pid, e);
                    None
                }
            };
            let _ = exit_tx.send(code);
        });

        debug!(app = %app_id, "Spawned pid {} on a pseudo-terminal", pid);
        Ok(SpawnedProcess { pid, output: line_rx, exit: exit_rx })
    }
}

fn read_lines(master: File, tx: mpsc::UnboundedSender<String>) {
    let reader = BufReader::new(master);
    for chunk in reader.split(b'\n') {
        // 从端全部关闭后 Linux 返回 EIO
        let Ok(bytes) = chunk else { break };
        let line = String::from_utf8_lossy(&bytes);
        if tx.send(line.trim_end_matches('\r').to_string()).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> CommandLine {
        CommandLine {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn test_child_sees_a_terminal() {
        let io = PtyIo::new();
        let mut process = io
            .spawn("sh", &sh("if [ -t 1 ]; then echo tty; else echo notty; fi"))
            .unwrap();

        let first = process.output.recv().await;
        assert_eq!(first.as_deref(), Some("tty"));
        assert_eq!(process.exit.await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_output_closes_after_exit() {
        let io = PtyIo::new();
        let mut process = io.spawn("sh", &sh("echo one; echo two")).unwrap();

        let mut lines = Vec::new();
        while let Some(line) = process.output.recv().await {
            lines.push(line);
        }
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_terminate() {
        let io = PtyIo::new();
        let process = io.spawn("sh", &sh("sleep 30")).unwrap();
        io.terminate(process.pid).await.unwrap();
        assert_eq!(process.exit.await.unwrap(), None);
    }
}
