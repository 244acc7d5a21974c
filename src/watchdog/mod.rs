//! 看门狗
//!
//! 进程级别的生命周期管理:
//! - 活动 (activity): 主循环、定时触发器和前台程序的监管任务。主线程依次等待它们结束。
//! - 终结器 (finalizer): 退出前依次执行一次的清理动作，例如终止矿工进程。
//!
//! 收到退出信号后，剩余活动只再等待一个宽限期，之后直接放弃。

pub mod signals;

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct Inner {
    activities: Mutex<VecDeque<(String, JoinHandle<()>)>>,
    finalizers: Mutex<Vec<(String, Finalizer)>>,
    shutdown: CancellationToken,
    grace: Duration,
    finalized: AtomicBool,
}

#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 提取 panic 负载中的消息
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Watchdog {
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                activities: Mutex::new(VecDeque::new()),
                finalizers: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
                grace,
                finalized: AtomicBool::new(false),
            }),
        }
    }

    /// 注册活动; 同名活动已存在时忽略并返回 false
    pub fn add_activity(&self, name: impl Into<String>, handle: JoinHandle<()>) -> bool {
        let name = name.into();
        let mut activities = lock(&self.inner.activities);
        if activities.iter().any(|(n, _)| *n == name) {
            debug!("Activity '{}' already registered", name);
            return false;
        }
        activities.push_back((name, handle));
        true
    }

    /// 启动并注册一个活动
    pub fn spawn_activity<F>(&self, name: impl Into<String>, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if lock(&self.inner.activities).iter().any(|(n, _)| *n == name) {
            debug!("Activity '{}' already registered", name);
            return false;
        }
        self.add_activity(name, tokio::spawn(future))
    }

    /// 取消登记, 任务本身继续运行
    pub fn remove_activity(&self, name: &str) -> bool {
        let mut activities = lock(&self.inner.activities);
        let before = activities.len();
        activities.retain(|(n, _)| n != name);
        activities.len() != before
    }

    pub fn activity_count(&self) -> usize {
        lock(&self.inner.activities).len()
    }

    /// 注册终结器; 同名终结器已存在时忽略并返回 false
    pub fn add_finalizer<F, Fut>(&self, name: impl Into<String>, finalizer: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let mut finalizers = lock(&self.inner.finalizers);
        if finalizers.iter().any(|(n, _)| *n == name) {
            debug!("Finalizer '{}' already registered", name);
            return false;
        }
        finalizers.push((name, Box::new(move || finalizer().boxed())));
        true
    }

    pub fn remove_finalizer(&self, name: &str) -> bool {
        let mut finalizers = lock(&self.inner.finalizers);
        let before = finalizers.len();
        finalizers.retain(|(n, _)| n != name);
        finalizers.len() != before
    }

    pub fn finalizer_count(&self) -> usize {
        lock(&self.inner.finalizers).len()
    }

    /// 关机令牌, 所有后台循环都应监听它
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// 接管主线程: 运行 `body`，等待所有活动结束，然后执行终结器
    pub async fn eat_main_thread<F>(&self, body: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("Watchdog taking over the main thread");

        let token = self.shutdown_token();
        let signals = tokio::spawn(async move {
            tokio::select! {
                result = signals::wait_for_shutdown_signal() => match result {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        token.cancel();
                    }
                    Err(e) => error!("Failed to install signal handlers: {}", e),
                },
                _ = token.cancelled() => {}
            }
        });

        self.spawn_activity("main", body);
        self.join_activities().await;
        signals.abort();
        self.run_finalizers().await;
    }

    async fn join_activities(&self) {
        let mut deadline: Option<Instant> = None;

        loop {
            let next = lock(&self.inner.activities).pop_front();
            let Some((name, mut handle)) = next else {
                break;
            };

            if deadline.is_none() {
                tokio::select! {
                    biased;
                    result = &mut handle => {
                        report_join(&name, result);
                        continue;
                    }
                    _ = self.inner.shutdown.cancelled() => {
                        deadline = Some(Instant::now() + self.inner.grace);
                    }
                }
            }

            if let Some(at) = deadline {
                match tokio::time::timeout_at(at, &mut handle).await {
                    Ok(result) => report_join(&name, result),
                    Err(_) => {
                        warn!("Activity '{}' did not finish in time, aborting it", name);
                        handle.abort();
                    }
                }
            }
        }

        debug!("All activities finished");
    }

    /// 依次执行终结器, 整个进程生命周期内只执行一次
    pub async fn run_finalizers(&self) {
        if self.inner.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        let finalizers = std::mem::take(&mut *lock(&self.inner.finalizers));
        debug!("Running {} finalizers", finalizers.len());

        for (name, finalizer) in finalizers {
            let outcome = AssertUnwindSafe(async move { finalizer().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => debug!("Finalizer '{}' done", name),
                Ok(Err(e)) => error!("Exception in finalizer '{}': {:#}", name, e),
                Err(panic) => error!("Finalizer '{}' panicked: {}", name, panic_message(&*panic)),
            }
        }
    }
}

fn report_join(name: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => debug!("Activity '{}' finished", name),
        Err(e) if e.is_panic() => {
            error!("Activity '{}' panicked: {}", name, panic_message(&*e.into_panic()))
        }
        Err(e) => warn!("Activity '{}' was cancelled: {}", name, e),
    }
}
