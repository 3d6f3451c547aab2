//! 宿主资源初始化生命周期的观察者。
//!
//! # 模块定位（Why）
//! - 宿主资源自带一次性的“初始化完成”钩子，但钩子可能在绑定之前就已经触发过；
//! - 观察者在绑定时挂载钩子，随即查询当前状态，若已完成则合成一次完成信号，而不是等待一个不会再来的事件。
//!
//! # 结构概览（What）
//! - [`Lifecycle`]：宿主需要实现的最小能力契约；
//! - [`InitHook`]：交给宿主保存的一次性完成钩子；
//! - `LifecycleObserver` / `InitState`：网关内部的挂载逻辑与完成记录。

use std::fmt;
use std::sync::Arc;

use crate::error::LifecycleError;

/// 初始化生命周期的结果。
pub type InitOutcome = Result<(), LifecycleError>;

/// 宿主资源的初始化生命周期契约。
///
/// # 接口约束（What）
/// - `on_initialized`：登记一次性钩子，宿主在启动序列结束时调用且仅调用一次；
///   若启动序列在登记之前已经结束，宿主可以丢弃该钩子，观察者会通过 `is_initialized` 自行发现；
/// - `is_initialized`：同步查询，反映同一个完成状态。
///
/// # 使用指引（How）
/// - 宿主通常在内部保存 `Vec<InitHook>`，启动完成时逐个调用 [`InitHook::complete`]，
///   失败时调用 [`InitHook::fail`]；参见 [`StubResource`](crate::test_stubs::StubResource)。
pub trait Lifecycle: Send + Sync + 'static {
    /// 初始化是否已经完成。
    fn is_initialized(&self) -> bool;

    /// 登记初始化完成钩子。
    fn on_initialized(&self, hook: InitHook);
}

impl<T: Lifecycle + ?Sized> Lifecycle for Arc<T> {
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn on_initialized(&self, hook: InitHook) {
        (**self).on_initialized(hook)
    }
}

/// 一次性初始化完成钩子。
pub struct InitHook {
    notify: Box<dyn FnOnce(InitOutcome) + Send + 'static>,
}

impl InitHook {
    pub fn new(notify: impl FnOnce(InitOutcome) + Send + 'static) -> Self {
        Self {
            notify: Box::new(notify),
        }
    }

    /// 报告初始化成功。
    pub fn complete(self) {
        self.signal(Ok(()))
    }

    /// 报告初始化失败。
    pub fn fail(self, error: LifecycleError) {
        self.signal(Err(error))
    }

    /// 报告初始化结果。
    pub fn signal(self, outcome: InitOutcome) {
        (self.notify)(outcome)
    }
}

impl fmt::Debug for InitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitHook").finish_non_exhaustive()
    }
}

/// 初始化进度的单调记录。
#[derive(Clone, Debug, Default)]
pub(crate) enum InitState {
    #[default]
    Pending,
    Completed,
    Failed(LifecycleError),
}

impl InitState {
    /// 记录一次完成信号；仅首个信号生效，返回值表示本次是否发生了迁移。
    pub(crate) fn record(&mut self, outcome: InitOutcome) -> bool {
        if !matches!(self, InitState::Pending) {
            return false;
        }
        *self = match outcome {
            Ok(()) => InitState::Completed,
            Err(error) => InitState::Failed(error),
        };
        true
    }

    pub(crate) fn is_completed(&self) -> bool {
        matches!(self, InitState::Completed)
    }

    pub(crate) fn failure(&self) -> Option<&LifecycleError> {
        match self {
            InitState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// 绑定时挂载钩子的观察者。
pub(crate) struct LifecycleObserver;

impl LifecycleObserver {
    /// 先挂载钩子，再查询当前状态；已完成时立刻合成完成信号。
    ///
    /// `on_complete` 可能被调用两次（钩子同步触发且状态查询同样为真），接收方必须幂等。
    pub(crate) fn attach<R, F>(resource: &R, on_complete: F)
    where
        R: Lifecycle + ?Sized,
        F: Fn(InitOutcome) + Send + Sync + 'static,
    {
        let on_complete = Arc::new(on_complete);
        let hook_target = Arc::clone(&on_complete);
        resource.on_initialized(InitHook::new(move |outcome| hook_target(outcome)));

        if resource.is_initialized() {
            tracing::debug!("resource already initialized at attach time, synthesizing completion");
            on_complete(Ok(()));
        }
    }
}
