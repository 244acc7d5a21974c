//! 匿名管道方式启动子进程

use crate::error::ProcessError;
use crate::process::{spawn_error, CommandLine, ProcessIo, SpawnedProcess};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// 标准输出和标准错误分别由读取任务持续排空, 子进程不会因管道缓冲区写满而卡住
#[derive(Debug, Default)]
pub struct PipeIo;

impl PipeIo {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessIo for PipeIo {
    fn name(&self) -> &'static str {
        "pipes"
    }

    fn spawn(&self, app_id: &str, cmd: &CommandLine) -> Result<SpawnedProcess, ProcessError> {
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .current_dir(&cmd.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(app_id, cmd, e))?;

        let pid = child.id().unwrap_or_default();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx));
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

        debug!(app = %app_id, "Spawned pid {} with pipes", pid);
        Ok(SpawnedProcess { pid, output: line_rx, exit: exit_rx })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Output stream closed: {}", e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
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
    async fn test_pipe_output_and_exit() {
        let io = PipeIo::new();
        let mut process = io.spawn("sh", &sh("echo hello; echo oops >&2; exit 3")).unwrap();

        let mut lines = Vec::new();
        while let Some(line) = process.output.recv().await {
            lines.push(line);
        }
        lines.sort();
        assert_eq!(lines, vec!["hello", "oops"]);
        assert_eq!(process.exit.await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_pipe_missing_executable() {
        let io = PipeIo::new();
        let cmd = CommandLine {
            program: PathBuf::from("/definitely/not/a/miner"),
            args: vec![],
            working_dir: std::env::temp_dir(),
        };
        assert!(matches!(
            io.spawn("ghost", &cmd),
            Err(ProcessError::ExecutableNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_pipe_terminate() {
        let io = PipeIo::new();
        let process = io.spawn("sh", &sh("sleep 30")).unwrap();
        io.terminate(process.pid).await.unwrap();
        // SIGTERM 结束时没有退出码
        assert_eq!(process.exit.await.unwrap(), None);
    }
}
