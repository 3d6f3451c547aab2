//! 等待者队列。
//!
//! # 契约说明（What）
//! - 入队顺序即到达顺序；`drain` 按到达顺序扫描，把满足条件的等待者整体移出，既不跳过也不重排；
//! - 从队列中移出即视为“已结算”：移出在网关锁内完成，之后任何路径（履约或超时）都找不到该等待者，
//!   因此每个等待者恰好结算一次；
//! - 结算动作封装为 [`Settlement`]，由网关在锁外按顺序执行。

use std::collections::VecDeque;
use std::fmt;

use futures::channel::oneshot;

use crate::config::WaitMode;
use crate::error::HandoffError;
use crate::time::TimerGuard;

pub(crate) type Outcome<R> = Result<R, HandoffError>;

/// 等待者在队列中的标识，单个网关内单调递增。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct WaiterId(u64);

/// 结算例程：回调与 Future 两种风格共用同一条结算路径。
pub(crate) enum Deliver<R> {
    Callback(Box<dyn FnOnce(Outcome<R>) + Send + 'static>),
    Channel(oneshot::Sender<Outcome<R>>),
}

impl<R> Deliver<R> {
    fn settle(self, outcome: Outcome<R>) {
        match self {
            Deliver::Callback(callback) => callback(outcome),
            // 接收端已被丢弃说明调用方不再关心结果。
            Deliver::Channel(sender) => {
                let _ = sender.send(outcome);
            }
        }
    }
}

/// 一次挂起的“请交付资源”请求。
pub(crate) struct WaitRequest<R> {
    id: WaiterId,
    mode: WaitMode,
    deliver: Deliver<R>,
    timer: Option<TimerGuard>,
}

impl<R> WaitRequest<R> {
    /// 不入队的请求，用于条件已经满足时的直接交付。
    pub(crate) fn detached(mode: WaitMode, deliver: Deliver<R>) -> Self {
        Self {
            id: WaiterId(u64::MAX),
            mode,
            deliver,
            timer: None,
        }
    }

    pub(crate) fn id(&self) -> WaiterId {
        self.id
    }

    pub(crate) fn mode(&self) -> WaitMode {
        self.mode
    }

    pub(crate) fn settle_with(self, outcome: Outcome<R>) -> Settlement<R> {
        Settlement {
            request: self,
            outcome,
        }
    }
}

/// 已确定结果、待在锁外执行的结算。
pub(crate) struct Settlement<R> {
    request: WaitRequest<R>,
    outcome: Outcome<R>,
}

impl<R> Settlement<R> {
    /// 先释放定时器，再交付结果。
    pub(crate) fn deliver(self) {
        let WaitRequest { deliver, timer, .. } = self.request;
        drop(timer);
        deliver.settle(self.outcome);
    }
}

pub(crate) struct WaiterQueue<R> {
    next_id: u64,
    entries: VecDeque<WaitRequest<R>>,
}

impl<R> Default for WaiterQueue<R> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: VecDeque::new(),
        }
    }
}

impl<R> WaiterQueue<R> {
    pub(crate) fn enqueue(&mut self, mode: WaitMode, deliver: Deliver<R>) -> WaiterId {
        let id = WaiterId(self.next_id);
        self.next_id += 1;
        self.entries.push_back(WaitRequest {
            id,
            mode,
            deliver,
            timer: None,
        });
        id
    }

    /// 为仍在队列中的等待者挂上定时器；等待者已结算时把句柄退回，由调用方在锁外撤销。
    pub(crate) fn attach_timer(&mut self, id: WaiterId, guard: TimerGuard) -> Result<(), TimerGuard> {
        match self.entries.iter_mut().find(|request| request.id == id) {
            Some(request) => {
                request.timer = Some(guard);
                Ok(())
            }
            None => Err(guard),
        }
    }

    /// 按到达顺序移出所有满足条件的等待者。
    pub(crate) fn drain(&mut self, eligible: impl Fn(WaitMode) -> bool) -> Vec<WaitRequest<R>> {
        let mut drained = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for request in self.entries.drain(..) {
            if eligible(request.mode) {
                drained.push(request);
            } else {
                kept.push_back(request);
            }
        }
        self.entries = kept;
        drained
    }

    pub(crate) fn remove(&mut self, id: WaiterId) -> Option<WaitRequest<R>> {
        let index = self.entries.iter().position(|request| request.id == id)?;
        self.entries.remove(index)
    }

    pub(crate) fn drain_all(&mut self) -> Vec<WaitRequest<R>> {
        self.entries.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<R> fmt::Debug for WaiterQueue<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|request| (request.id, request.mode)))
            .finish()
    }
}
