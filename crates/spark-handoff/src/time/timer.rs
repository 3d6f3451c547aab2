use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 定时器到期时执行的一次性回调。
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// 可注入的定时器。
///
/// # 接口约束（What）
/// - `arm`：在 `delay` 之后执行 `callback` 恰好一次；
/// - 返回的 [`TimerGuard`] 被撤销或丢弃后，尚未执行的回调不得再执行，且实现应尽快释放为其保留的调度资源；
/// - 回调可能在任意线程执行，实现不得在持有自身锁的情况下调用回调。
pub trait Timer: Send + Sync + 'static {
    /// 武装一个定时器。
    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerGuard;
}

impl<T: Timer + ?Sized> Timer for Arc<T> {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerGuard {
        (**self).arm(delay, callback)
    }
}

/// 定时器的撤销句柄。
///
/// # 契约说明（What）
/// - 丢弃即撤销；显式调用 [`TimerGuard::cancel`] 与丢弃等价；
/// - 若回调已经执行，撤销为空操作。
#[must_use = "dropping a TimerGuard cancels the timer"]
pub struct TimerGuard {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerGuard {
    /// 以撤销动作构造句柄。
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// 无需撤销动作的句柄。
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    /// 撤销定时器。
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for TimerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerGuard")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// 基于标准库线程实现的定时器。
///
/// # 设计动机（Why）
/// - 避免强依赖 Tokio 运行时，让默认构建即可使用超时；
/// - 交接发生在启动期，频率很低，可以容忍为每个带截止时间的等待者启动一个辅助线程。
///
/// # 契约说明（What）
/// - `arm` 启动后台线程，在条件变量上等待至截止时间；
/// - 撤销会唤醒后台线程使其立即退出，不会残留等待中的线程；
/// - 回调在后台线程执行。
#[derive(Clone, Debug, Default)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerGuard {
        let state = ThreadTimerState::spawn(delay, callback);
        TimerGuard::new(move || state.cancel())
    }
}

/// 截止时刻；超出 `Instant` 可表示范围时视为永不到期。
fn deadline_after(delay: Duration) -> Option<Instant> {
    Instant::now().checked_add(delay)
}

struct ThreadTimerState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl ThreadTimerState {
    fn spawn(delay: Duration, callback: TimerCallback) -> Arc<Self> {
        let state = Arc::new(Self {
            cancelled: Mutex::new(false),
            signal: Condvar::new(),
        });
        let thread_state = Arc::clone(&state);
        thread::spawn(move || {
            if thread_state.wait_until(deadline_after(delay)) {
                callback();
            }
        });
        state
    }

    /// 等待至截止时间；返回 `true` 表示按时到期，`false` 表示被撤销。
    ///
    /// 截止时间为 `None` 时只等待撤销。
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if self.signal.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.signal.wait(&mut cancelled),
            }
        }
        !*cancelled
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.signal.notify_one();
    }
}
