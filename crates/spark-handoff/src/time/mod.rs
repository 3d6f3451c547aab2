//! 定时器抽象模块，为等待者的截止时间提供可注入的计时能力。
//!
//! # 模块定位（Why）
//! - 超时竞速需要“在若干时长后执行一次回调，且可被提前撤销”的原语；若直接绑定某个异步运行时，
//!   交接原语将无法在无运行时的宿主中使用，测试也难以复现；
//! - [`Timer`] trait 将该能力抽象出来，生产环境与测试环境只需替换实现。
//!
//! # 结构概览（What）
//! - [`Timer`]：核心 trait，`arm` 返回撤销句柄 [`TimerGuard`]；
//! - [`ThreadTimer`]：基于辅助线程的默认实现，不依赖任何运行时；
//! - [`MockTimer`]：虚拟时间实现，手动推进并记录武装过的时长；
//! - `TokioTimer`：启用 `runtime-tokio` 后可用的 Tokio 实现。
//!
//! # 使用指引（How）
//! - 通过 [`GateBuilder::timer`](crate::GateBuilder::timer) 注入 `Arc<dyn Timer>`；
//! - 测试中保留 [`MockTimer`] 的克隆，调用 `advance` 推进时间并断言结算结果。

mod mock;
mod timer;
#[cfg(feature = "runtime-tokio")]
mod tokio_timer;

pub use mock::MockTimer;
pub use timer::{ThreadTimer, Timer, TimerCallback, TimerGuard};
#[cfg(feature = "runtime-tokio")]
pub use tokio_timer::TokioTimer;
