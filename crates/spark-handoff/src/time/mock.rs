use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::timer::{Timer, TimerCallback, TimerGuard};

/// 虚拟时间定时器：通过手动推进时间在测试中复现确定性的超时序列。
///
/// # 设计动机（Why）
/// - 超时竞速需要在 CI 中 100% 可重复，真实时间的抖动会让“谁先结算”变得不确定；
/// - 测试还需要断言“武装了几个定时器、各自多长”，例如缺省截止时间恰好为 2000ms、禁用超时时一个定时器都不武装。
///
/// # 行为概览（How）
/// - 内部维护自构造起的虚拟偏移 `elapsed` 与待触发条目；
/// - [`MockTimer::advance`] 逐个弹出到期条目（先按截止时间、再按武装顺序），释放锁后执行回调，
///   回调中新武装且在推进窗口内到期的定时器同样会被触发；
/// - 撤销句柄仅持有弱引用，定时器本身被释放后撤销为空操作。
#[derive(Clone, Default)]
pub struct MockTimer {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    elapsed: Duration,
    next_id: u64,
    entries: Vec<MockEntry>,
    armed: Vec<Duration>,
}

struct MockEntry {
    id: u64,
    deadline: Duration,
    callback: TimerCallback,
}

impl MockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推进虚拟时间，并按顺序执行期间到期的回调。
    pub fn advance(&self, delta: Duration) {
        let target = self.inner.lock().elapsed.saturating_add(delta);
        loop {
            let due = {
                let mut state = self.inner.lock();
                let next = state
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.deadline <= target)
                    .min_by_key(|(_, entry)| (entry.deadline, entry.id))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let entry = state.entries.remove(index);
                        state.elapsed = state.elapsed.max(entry.deadline);
                        Some(entry.callback)
                    }
                    None => {
                        state.elapsed = state.elapsed.max(target);
                        None
                    }
                }
            };
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// 自构造起累积的虚拟时间。
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    /// 尚未触发且未撤销的定时器数量。
    pub fn pending(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 按武装顺序返回所有武装过的时长（含已触发与已撤销的）。
    pub fn armed_delays(&self) -> Vec<Duration> {
        self.inner.lock().armed.clone()
    }
}

impl Timer for MockTimer {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerGuard {
        let id = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            let deadline = state.elapsed.saturating_add(delay);
            state.entries.push(MockEntry {
                id,
                deadline,
                callback,
            });
            state.armed.push(delay);
            id
        };

        let weak: Weak<Mutex<MockState>> = Arc::downgrade(&self.inner);
        TimerGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                // 回调在锁外释放，避免其析构逻辑重入本定时器。
                let removed = {
                    let mut state = inner.lock();
                    state
                        .entries
                        .iter()
                        .position(|entry| entry.id == id)
                        .map(|index| state.entries.remove(index))
                };
                drop(removed);
            }
        })
    }
}

impl fmt::Debug for MockTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("MockTimer")
            .field("elapsed", &state.elapsed)
            .field("pending", &state.entries.len())
            .field("armed", &state.armed)
            .finish()
    }
}
