use std::time::Duration;

use tokio::runtime::Handle;

use super::timer::{ThreadTimer, Timer, TimerCallback, TimerGuard};

/// 基于 Tokio 的定时器。
///
/// # 契约说明（What）
/// - 每次 `arm` 派生一个 `sleep` 任务，撤销句柄通过 `AbortHandle` 终止该任务；
/// - 未指定运行时句柄时使用调用线程所在的运行时；调用线程不在任何 Tokio 运行时内时退回 [`ThreadTimer`]，
///   保证截止时间依旧生效。
#[derive(Clone, Debug, Default)]
pub struct TokioTimer {
    handle: Option<Handle>,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定在指定运行时上派生定时任务。
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Timer for TokioTimer {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerGuard {
        let handle = match self.handle.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => handle,
            None => {
                tracing::debug!(
                    timeout_ms = crate::config::millis(delay),
                    "no tokio runtime in scope, falling back to thread timer"
                );
                return ThreadTimer.arm(delay, callback);
            }
        };

        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        let abort = task.abort_handle();
        TimerGuard::new(move || abort.abort())
    }
}
