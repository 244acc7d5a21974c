//! 单个程序的执行器
//!
//! 执行器持有至多一个正在运行的进程。进程的输出由监管任务转发到日志，
//! 退出后执行器自动变为不活跃。

use crate::error::ProcessError;
use crate::process::{Application, Supervisor};
use crate::utils::Vars;
use crate::watchdog::Watchdog;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

struct RunningProcess {
    pid: u32,
    label: String,
    exited: watch::Receiver<bool>,
}

impl RunningProcess {
    fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }
}

pub struct Executor {
    app: Arc<Application>,
    supervisor: Supervisor,
    running: Option<RunningProcess>,
}

impl Executor {
    pub fn new(app: Arc<Application>, supervisor: Supervisor) -> Self {
        Self { app, supervisor, running: None }
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// 进程已启动且尚未退出
    pub fn alive(&self) -> bool {
        self.running.as_ref().map(|r| !r.has_exited()).unwrap_or(false)
    }

    /// 是否启动过进程 (无论是否仍在运行)
    pub fn started(&self) -> bool {
        self.running.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.pid)
    }

    /// 注入变量后启动进程; 已在运行时不做任何事
    pub async fn start(&mut self, vars: &Vars) -> Result<(), ProcessError> {
        if self.alive() {
            debug!(app = %self.app.id, "Already running, not starting again");
            return Ok(());
        }

        let cmd = self.app.command_line(vars);
        info!(app = %self.app.id, "Starting {}", self.app.id);
        debug!(app = %self.app.id, "Command line: {}", cmd);

        if !cmd.working_dir.is_dir() {
            let err = ProcessError::WorkingDirMissing {
                app: self.app.id.clone(),
                path: cmd.working_dir.display().to_string(),
            };
            error!(app = %self.app.id, "Unable to start: {}", err);
            return Err(err);
        }

        let spawned = self.supervisor.io().spawn(&self.app.id, &cmd).map_err(|e| {
            error!(app = %self.app.id, "Unable to start: {}", e);
            e
        })?;

        let pid = spawned.pid;
        let label = format!("{}#{}", self.app.id, pid);
        let (exited_tx, exited_rx) = watch::channel(false);
        let watchdog = self.supervisor.watchdog().clone();

        let handle = tokio::spawn(supervise(
            self.app.id.clone(),
            label.clone(),
            spawned.output,
            spawned.exit,
            exited_tx,
            self.supervisor.show_output(),
            watchdog.clone(),
        ));

        if !self.app.daemon {
            watchdog.add_activity(label.clone(), handle);
        }

        if self.app.kill_on_exit {
            let io = self.supervisor.io().clone();
            let exited = exited_rx.clone();
            watchdog.add_finalizer(label.clone(), move || async move {
                let done = *exited.borrow();
                if !done {
                    io.terminate(pid).await?;
                }
                Ok::<(), anyhow::Error>(())
            });
        }

        self.running = Some(RunningProcess { pid, label, exited: exited_rx });
        Ok(())
    }

    /// 终止进程, 可重复调用; 失败只记录日志
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let watchdog = self.supervisor.watchdog();

        if running.has_exited() {
            watchdog.remove_finalizer(&running.label);
            return;
        }

        info!(app = %self.app.id, "Terminating {} (pid {})", self.app.id, running.pid);
        match self.supervisor.io().terminate(running.pid).await {
            Ok(()) => {
                watchdog.remove_finalizer(&running.label);
                info!(app = %self.app.id, "{} stopped", self.app.id);
            }
            Err(e) => {
                error!(app = %self.app.id, "Unable to stop {}: {}", self.app.id, e);
                // 保留句柄, 关机时的终结器还会再尝试一次
                self.running = Some(running);
            }
        }
    }

    /// 等待当前进程退出; 没有进程时立即返回
    pub async fn wait_for_terminate(&self) {
        let Some(running) = &self.running else {
            return;
        };
        let mut exited = running.exited.clone();
        let _ = exited.wait_for(|done| *done).await;
    }
}

async fn supervise(
    app_id: String,
    label: String,
    mut output: mpsc::UnboundedReceiver<String>,
    mut exit: oneshot::Receiver<Option<i32>>,
    exited_tx: watch::Sender<bool>,
    show_output: bool,
    watchdog: Watchdog,
) {
    let mut output_open = true;
    let mut exited = false;
    let mut code = None;

    while output_open || !exited {
        tokio::select! {
            line = output.recv(), if output_open => match line {
                Some(line) => log_output(&app_id, &line, show_output),
                None => output_open = false,
            },
            status = &mut exit, if !exited => {
                exited = true;
                code = status.ok().flatten();
                exited_tx.send_replace(true);
            }
        }
    }

    watchdog.remove_finalizer(&label);
    match code {
        Some(code) => info!(app = %app_id, "Process terminated with code {}", code),
        None => info!(app = %app_id, "Process terminated"),
    }
}

fn log_output(app_id: &str, line: &str, show_output: bool) {
    let line = line.trim_end();
    if line.is_empty() {
        return;
    }
    if show_output {
        info!(app = %app_id, "{}", line);
    } else {
        debug!(app = %app_id, "{}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::PipeIo;
    use crate::vars;
    use std::time::{Duration, Instant};

    fn supervisor() -> Supervisor {
        Supervisor::new(Arc::new(PipeIo::new()), Watchdog::new(Duration::from_secs(1)), false)
    }

    fn sh_app(id: &str, script: &str) -> Arc<Application> {
        Arc::new(
            Application::new(id, std::env::temp_dir(), "/bin/sh")
                .with_args(&format!("-c \"{}\"", script)),
        )
    }

    #[tokio::test]
    async fn test_missing_working_dir() {
        let app = Arc::new(Application::new("ghost", "/definitely/not/here", "/bin/sh"));
        let mut executor = supervisor().executor(app);

        let err = executor.start(&Vars::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::WorkingDirMissing { .. }));
        assert!(!executor.alive());
        assert!(!executor.started());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_alive() {
        let supervisor = supervisor();
        let mut executor = supervisor.executor(sh_app("sleeper", "sleep 5"));

        executor.start(&Vars::new()).await.unwrap();
        let pid = executor.pid();
        assert!(executor.alive());

        executor.start(&Vars::new()).await.unwrap();
        assert_eq!(executor.pid(), pid);
        assert_eq!(supervisor.watchdog().finalizer_count(), 1);

        executor.stop().await;
        assert!(!executor.alive());
        assert!(!executor.started());
        assert_eq!(supervisor.watchdog().finalizer_count(), 0);

        // 第二次 stop 什么都不做
        executor.stop().await;
    }

    #[tokio::test]
    async fn test_wait_for_terminate() {
        let mut executor = supervisor().executor(sh_app("short", "sleep 0.2"));
        let started = Instant::now();
        executor.start(&Vars::new()).await.unwrap();
        executor.wait_for_terminate().await;

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!executor.alive());
        assert!(executor.started());
    }

    #[tokio::test]
    async fn test_args_are_injected() {
        let supervisor = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let app = Arc::new(
            Application::new("writer", dir.path(), "/bin/sh")
                .with_args("-c \"echo $(JOB.COIN.ID) > coin.txt\""),
        );
        let mut executor = supervisor.executor(app);
        executor.start(&vars! { "JOB.COIN.ID" => "monero" }).await.unwrap();
        executor.wait_for_terminate().await;

        let written = std::fs::read_to_string(dir.path().join("coin.txt")).unwrap();
        assert_eq!(written.trim(), "monero");
    }

    #[tokio::test]
    async fn test_non_daemon_registers_activity() {
        let supervisor = supervisor();
        let app = Arc::new(
            Application::new("fg", std::env::temp_dir(), "/bin/sh")
                .with_args("-c \"sleep 0.1\"")
                .with_daemon(false)
                .with_kill_on_exit(false),
        );
        let mut executor = supervisor.executor(app);
        executor.start(&Vars::new()).await.unwrap();

        assert_eq!(supervisor.watchdog().activity_count(), 1);
        assert_eq!(supervisor.watchdog().finalizer_count(), 0);
        executor.wait_for_terminate().await;
    }
}
