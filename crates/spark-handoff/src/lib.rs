#![deny(unsafe_code)]
#![doc = r#"
# spark-handoff

## 设计动机（Why）
- **定位**：在宿主资源（例如服务端实例）完成异步初始化之前，任意数量的消费者都可以
  “预约”该资源；初始化完成后按到达顺序交付，无需消费者感知初始化是否已开始、进行中或已结束。
- **架构角色**：只负责交接与同步，不实现资源自身的初始化逻辑；宿主通过 [`Lifecycle`]
  契约暴露“初始化完成”钩子与状态查询。
- **设计理念**：单一结算例程同时支撑回调与 Future 两种风格，每个等待者恰好结算一次。

## 核心契约（What）
- [`ReadinessGate::bind`]：一次性绑定资源，重复绑定返回 [`HandoffError::AlreadyBound`] 且不改变状态；
- [`ReadinessGate::is_ready`]：纯读取初始化完成标记，单调 `false → true`；
- [`ReadinessGate::ready`] / [`ReadinessGate::ready_with`]：按 [`WaitOptions`] 等待资源，
  超时以 [`HandoffError::TimedOut`] 结算，生命周期失败以 [`HandoffError::Lifecycle`] 结算。

## 实现策略（How）
- 状态机 `Unbound → BoundPendingInit → BoundInitialized` 由一把 `parking_lot::Mutex` 保护；
- 等待队列按到达顺序排空，交付经由有序发件箱在锁外执行，回调可安全重入；
- 超时通过可注入的 [`Timer`] 实现，测试中使用 [`MockTimer`] 推进虚拟时间。

## 风险与考量（Trade-offs）
- 默认 [`ThreadTimer`] 为每个带截止时间的等待者占用一个辅助线程，适合低频的启动期交接；
  高频场景请启用 `runtime-tokio` 并注入 `TokioTimer`。
"#]

mod binding;
pub mod config;
pub mod error;
mod gate;
pub mod lifecycle;
mod queue;
mod race;
pub mod test_stubs;
pub mod time;

pub use config::{DEFAULT_TIMEOUT, GateConfig, Timeout, WaitMode, WaitOptions};
pub use error::{HandoffError, LifecycleError, TimeoutError};
pub use gate::{GateBuilder, GateState, ReadinessGate, WaitFuture};
pub use lifecycle::{InitHook, Lifecycle};
#[cfg(feature = "runtime-tokio")]
pub use time::TokioTimer;
pub use time::{MockTimer, ThreadTimer, Timer, TimerCallback, TimerGuard};
