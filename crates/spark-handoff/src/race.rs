//! 超时竞速：每个等待者在“条件满足”与“截止时间到达”之间恰好结算一次。
//!
//! # 竞速规则（What）
//! - 截止时间缺省、为零或被禁用时不武装定时器，等待者无限期等待；
//! - 否则在等待者登记时武装定时器（而非网关构造时）；
//! - 两条路径都通过“从队列中移出等待者”来争夺结算权，移出在网关锁内完成，先到者永久获胜；
//! - 履约一方在交付前释放定时器句柄；超时一方在定时器回调中执行，此后履约路径再也找不到该等待者。

use std::time::Duration;

use crate::config::{GateConfig, WaitMode, WaitOptions, millis};
use crate::error::HandoffError;
use crate::queue::{Settlement, WaitRequest, WaiterId, WaiterQueue};
use crate::time::{Timer, TimerGuard};

pub(crate) struct TimeoutRace;

impl TimeoutRace {
    /// 解析等待者需要武装的定时器时长。
    pub(crate) fn deadline(options: &WaitOptions, config: &GateConfig) -> Option<Duration> {
        options.timeout.resolve(config.default_timeout)
    }

    /// 武装定时器，到期时以所等待的时长调用 `on_expire`。
    pub(crate) fn arm(
        timer: &dyn Timer,
        delay: Duration,
        on_expire: impl FnOnce(Duration) + Send + 'static,
    ) -> TimerGuard {
        timer.arm(delay, Box::new(move || on_expire(delay)))
    }

    /// 超时路径：若等待者仍在队列中则由超时获胜，否则为空操作。
    pub(crate) fn expire<R>(
        queue: &mut WaiterQueue<R>,
        id: WaiterId,
        elapsed: Duration,
        config: &GateConfig,
    ) -> Option<Settlement<R>> {
        let request = queue.remove(id)?;
        let error = config.timeout_error(request.mode(), elapsed);
        tracing::warn!(
            component = %config.component,
            waiter = ?request.id(),
            mode = request.mode().as_str(),
            timeout_ms = millis(elapsed),
            "waiter timed out before the resource was handed off"
        );
        Some(request.settle_with(Err(HandoffError::TimedOut(error))))
    }

    /// 履约路径：按到达顺序移出满足条件的等待者，并以 `outcome` 结算。
    pub(crate) fn fulfil<R: Clone>(
        queue: &mut WaiterQueue<R>,
        mode: WaitMode,
        outcome: &Result<R, HandoffError>,
    ) -> Vec<Settlement<R>> {
        queue
            .drain(|candidate| candidate == mode)
            .into_iter()
            .map(|request: WaitRequest<R>| request.settle_with(outcome.clone()))
            .collect()
    }
}
