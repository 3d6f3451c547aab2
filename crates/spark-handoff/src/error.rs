//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义交接原语对外暴露的三类错误：误用（重复绑定）、等待超时、宿主生命周期失败；
//! - 为每类错误提供稳定错误码，便于日志检索与告警聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `Clone`：一次生命周期失败需要扇出给多个等待者；
//! - 超时错误的文案格式固定，调用方与测试可以逐字匹配；
//! - 错误只交付给能够处理它的等待者，网关自身状态不会因等待者级别的错误而损坏。

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::WaitMode;

/// 稳定错误码。
pub mod codes {
    /// 重复绑定资源。
    pub const ALREADY_BOUND: &str = "spark.handoff.already_bound";
    /// 等待者在截止时间内未满足条件。
    pub const TIMEOUT: &str = "spark.handoff.timeout";
    /// 宿主资源的初始化生命周期报告失败。
    pub const LIFECYCLE_FAILED: &str = "spark.handoff.lifecycle_failed";
    /// 网关在等待者结算前被释放。
    pub const ABANDONED: &str = "spark.handoff.abandoned";
}

/// 交接原语的统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：让回调风格与 Future 风格的调用方拿到同一种错误，避免两套并行的错误模型；
/// - **契约 (What)**：
///   - `AlreadyBound` 由 [`ReadinessGate::bind`](crate::ReadinessGate::bind) 同步返回，属于编程错误，不应重试；
///   - `TimedOut` 与 `Lifecycle` 经由等待者的结算通道交付，不会以 panic 形式抛出；
///   - `Abandoned` 表示最后一个网关句柄被释放时等待者仍未结算；
/// - **风险 (Trade-offs)**：枚举标记为 `#[non_exhaustive]`，下游匹配时需保留通配分支。
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum HandoffError {
    /// 在已绑定资源的网关上再次调用绑定。
    #[error("Can't call {bind_call} more than once.")]
    AlreadyBound { bind_call: String },

    /// 等待者的截止时间先于满足条件到达。
    #[error(transparent)]
    TimedOut(#[from] TimeoutError),

    /// 宿主资源的初始化生命周期失败。
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// 网关被释放，等待者再无结算可能。
    #[error("{component} was dropped before the resource was handed off")]
    Abandoned { component: String },
}

impl HandoffError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            HandoffError::AlreadyBound { .. } => codes::ALREADY_BOUND,
            HandoffError::TimedOut(_) => codes::TIMEOUT,
            HandoffError::Lifecycle(_) => codes::LIFECYCLE_FAILED,
            HandoffError::Abandoned { .. } => codes::ABANDONED,
        }
    }

    /// 是否为超时错误。
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandoffError::TimedOut(_))
    }

    /// 若为超时错误，返回其详情。
    pub fn as_timeout(&self) -> Option<&TimeoutError> {
        match self {
            HandoffError::TimedOut(timeout) => Some(timeout),
            _ => None,
        }
    }
}

/// 等待超时的详细信息。
///
/// # 教案式说明
/// - **意图 (Why)**：超时几乎总是因为调用方漏掉了某个动作（未触发初始化或未绑定资源），
///   文案直接提示可能遗漏的调用，缩短排障路径；
/// - **契约 (What)**：`Display` 输出严格为
///   `"<component> timed-out after <N>ms.  Did you forget to call <expected>?"`，
///   其中 `<expected>` 按 [`WaitMode`] 区分；
/// - **实现 (How)**：由 [`GateConfig::timeout_error`](crate::GateConfig::timeout_error) 根据网关配置拼装。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{component} timed-out after {}ms.  Did you forget to call {expected}?", .elapsed.as_millis())]
pub struct TimeoutError {
    component: String,
    elapsed: Duration,
    mode: WaitMode,
    expected: String,
}

impl TimeoutError {
    pub(crate) fn new(
        component: impl Into<String>,
        elapsed: Duration,
        mode: WaitMode,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            elapsed,
            mode,
            expected: expected.into(),
        }
    }

    /// 超时前已等待的时长。
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// 超时时所等待的条件。
    pub fn mode(&self) -> WaitMode {
        self.mode
    }

    /// 提示中“可能遗漏的调用”片段。
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

/// 宿主资源初始化失败的描述。
///
/// # 契约说明（What）
/// - 同一个失败会交付给所有未结算与后续的 `Initialized` 模式等待者，因此内部以 `Arc` 共享底层原因；
/// - `Bound` 模式的等待者不依赖初始化结果，不会收到该错误。
#[derive(Clone, Debug)]
pub struct LifecycleError {
    message: Cow<'static, str>,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl LifecycleError {
    /// 以文案构造失败描述。
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// 包装宿主返回的底层错误，文案取自其 `Display`。
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: Cow::Owned(error.to_string()),
            source: Some(Arc::new(error)),
        }
    }

    /// 失败文案。
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource initialization failed: {}", self.message)
    }
}

impl StdError for LifecycleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

const _: fn() = || {
    fn assert_error_traits<T: StdError + Clone + Send + Sync + 'static>() {}

    assert_error_traits::<HandoffError>();
    assert_error_traits::<TimeoutError>();
    assert_error_traits::<LifecycleError>();
};
