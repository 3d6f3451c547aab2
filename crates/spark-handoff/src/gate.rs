//! 就绪网关：组合绑定槽位、生命周期观察者、等待者队列与超时竞速的门面。
//!
//! # 状态机（What）
//! - `Unbound → BoundPendingInit`：[`ReadinessGate::bind`]，再次绑定返回误用错误且不改变状态；
//! - `BoundPendingInit → BoundInitialized`：宿主报告初始化完成，重复报告保持不变；
//! - 任何迁移都不会回到 `Unbound`。
//!
//! # 执行逻辑（How）
//! - 所有迁移与队列操作都在一把锁内完成；结算动作追加到锁内的有序发件箱；
//! - 锁外由唯一的“投递者”按顺序执行发件箱中的结算，其余调用方只负责追加，
//!   因此即使回调重入网关或定时器在其他线程触发，同一模式的交付顺序仍与到达顺序一致；
//! - 回调中发起的重入调用会在当前回调返回后立刻交付。
//!
//! # 风险提示（Trade-offs）
//! - 等待者回调若持有网关句柄的克隆，会与网关形成引用环，网关释放时无法触发 `Abandoned` 结算；
//!   回调中需要网关时请在结算后再克隆。

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::binding::ResourceBinding;
use crate::config::{GateConfig, WaitMode, WaitOptions, millis};
use crate::error::{HandoffError, LifecycleError};
use crate::lifecycle::{InitOutcome, InitState, Lifecycle, LifecycleObserver};
use crate::queue::{Deliver, Outcome, Settlement, WaitRequest, WaiterId, WaiterQueue};
use crate::race::TimeoutRace;
use crate::time::{ThreadTimer, Timer};

/// 网关的三态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateState {
    Unbound,
    BoundPendingInit,
    BoundInitialized,
}

/// 就绪网关。
///
/// # 教案式说明
/// - **意图 (Why)**：消费者无需知道资源的初始化生命周期处于何种阶段，只需要“等资源就绪”；
/// - **契约 (What)**：
///   - 句柄可廉价克隆，所有克隆共享同一状态；
///   - 资源类型 `R` 需要实现 [`Lifecycle`] 与 `Clone`，交付时向每个等待者各交付一份克隆，
///     通常取 `Arc<Server>`；
///   - 每个等待者恰好结算一次：交付资源、超时、生命周期失败，或在网关释放时以 `Abandoned` 结算；
/// - **示例**：
///   ```
///   use spark_handoff::{ReadinessGate, WaitOptions, test_stubs::StubResource};
///
///   let server = StubResource::shared("api");
///   let gate = ReadinessGate::new();
///   let ready = gate.ready(WaitOptions::new().no_timeout());
///
///   gate.bind(server.clone()).expect("first bind");
///   server.initialize();
///
///   let handed_off = futures::executor::block_on(ready).expect("resource handed off");
///   assert!(std::sync::Arc::ptr_eq(&handed_off, &server));
///   assert!(gate.is_ready());
///   ```
pub struct ReadinessGate<R> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    config: GateConfig,
    timer: Arc<dyn Timer>,
    core: Mutex<GateCore<R>>,
}

struct GateCore<R> {
    binding: ResourceBinding<R>,
    hook_installed: bool,
    init: InitState,
    waiters: WaiterQueue<R>,
    outbox: VecDeque<Settlement<R>>,
    flushing: bool,
}

impl<R> Default for GateCore<R> {
    fn default() -> Self {
        Self {
            binding: ResourceBinding::default(),
            hook_installed: false,
            init: InitState::default(),
            waiters: WaiterQueue::default(),
            outbox: VecDeque::new(),
            flushing: false,
        }
    }
}

impl<R: Clone> GateCore<R> {
    fn state(&self) -> GateState {
        match (self.binding.is_bound(), self.init.is_completed()) {
            (false, _) => GateState::Unbound,
            (true, false) => GateState::BoundPendingInit,
            (true, true) => GateState::BoundInitialized,
        }
    }

    /// 条件已满足时的直接结果；`None` 表示需要入队等待。
    fn immediate_outcome(&self, mode: WaitMode) -> Option<Outcome<R>> {
        let resource = self.binding.get()?;
        match mode {
            WaitMode::Bound => Some(Ok(resource.clone())),
            WaitMode::Initialized => match &self.init {
                InitState::Pending => None,
                InitState::Completed => Some(Ok(resource.clone())),
                InitState::Failed(error) => Some(Err(HandoffError::Lifecycle(error.clone()))),
            },
        }
    }
}

impl<R> ReadinessGate<R>
where
    R: Lifecycle + Clone,
{
    /// 以默认配置与 [`ThreadTimer`] 构造未绑定的网关。
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// 以给定配置构造未绑定的网关。
    pub fn with_config(config: GateConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// 构造时即同步绑定资源。
    pub fn with_resource(resource: R) -> Self {
        Self::builder().resource(resource).build()
    }

    pub fn builder() -> GateBuilder<R> {
        GateBuilder::default()
    }

    /// 一次性绑定资源。
    ///
    /// # 契约说明（What）
    /// - 成功时依次：保存资源、结算所有 `Bound` 模式的等待者、挂载生命周期钩子；
    /// - 已绑定时返回 [`HandoffError::AlreadyBound`]，原资源与所有等待者均不受影响；
    /// - 若资源在绑定前已完成初始化，挂载时立即合成完成信号。
    pub fn bind(&self, resource: R) -> Result<(), HandoffError> {
        let config = &self.inner.config;
        {
            let mut core = self.inner.core.lock();
            if core.binding.bind(resource.clone()).is_err() {
                tracing::warn!(component = %config.component, "rejected a second binding");
                return Err(HandoffError::AlreadyBound {
                    bind_call: config.bind_call.clone(),
                });
            }
            let settlements =
                TimeoutRace::fulfil(&mut core.waiters, WaitMode::Bound, &Ok(resource.clone()));
            tracing::debug!(
                component = %config.component,
                drained = settlements.len(),
                "resource bound"
            );
            core.outbox.extend(settlements);
        }

        let weak = Arc::downgrade(&self.inner);
        LifecycleObserver::attach(&resource, move |outcome| {
            if let Some(inner) = weak.upgrade() {
                inner.complete(outcome);
            }
        });
        self.inner.core.lock().hook_installed = true;
        tracing::debug!(component = %config.component, "lifecycle hook attached");

        self.inner.flush();
        Ok(())
    }

    /// 初始化是否已完成；纯读取，永不阻塞。
    pub fn is_ready(&self) -> bool {
        self.inner.core.lock().init.is_completed()
    }

    pub fn state(&self) -> GateState {
        self.inner.core.lock().state()
    }

    /// 已绑定的资源。
    pub fn resource(&self) -> Option<R> {
        self.inner.core.lock().binding.get().cloned()
    }

    /// 生命周期钩子是否已挂载。
    pub fn lifecycle_attached(&self) -> bool {
        self.inner.core.lock().hook_installed
    }

    /// 宿主报告的初始化失败。
    pub fn lifecycle_failure(&self) -> Option<LifecycleError> {
        self.inner.core.lock().init.failure().cloned()
    }

    /// 尚在队列中的等待者数量。
    pub fn pending_waiters(&self) -> usize {
        self.inner.core.lock().waiters.len()
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// 以 Future 风格等待资源。
    ///
    /// 条件已满足时返回的 Future 立即就绪；丢弃尚未结算的 Future 会把等待者移出队列并释放其定时器。
    pub fn ready(&self, options: impl Into<WaitOptions>) -> WaitFuture<R> {
        let (sender, receiver) = oneshot::channel();
        let id = self.inner.register(options.into(), Deliver::Channel(sender));
        WaitFuture {
            receiver,
            waiter: id.map(|id| (id, Arc::downgrade(&self.inner))),
            component: self.inner.config.component.clone(),
            settled: false,
        }
    }

    /// 以回调风格等待资源。
    ///
    /// 条件已满足且当前没有其他交付在进行时，回调在本次调用返回前同步执行。
    pub fn ready_with<F>(&self, options: impl Into<WaitOptions>, callback: F)
    where
        F: FnOnce(Result<R, HandoffError>) + Send + 'static,
    {
        self.inner
            .register(options.into(), Deliver::Callback(Box::new(callback)));
    }
}

impl<R> Default for ReadinessGate<R>
where
    R: Lifecycle + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for ReadinessGate<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Clone> fmt::Debug for ReadinessGate<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("ReadinessGate")
            .field("component", &self.inner.config.component)
            .field("state", &core.state())
            .field("waiters", &core.waiters)
            .finish()
    }
}

impl<R> Inner<R>
where
    R: Lifecycle + Clone,
{
    fn register(self: &Arc<Self>, options: WaitOptions, deliver: Deliver<R>) -> Option<WaiterId> {
        let mode = options.mode;
        let deadline = TimeoutRace::deadline(&options, &self.config);

        let id = {
            let mut core = self.core.lock();
            match core.immediate_outcome(mode) {
                Some(outcome) => {
                    let settlement = WaitRequest::detached(mode, deliver).settle_with(outcome);
                    core.outbox.push_back(settlement);
                    None
                }
                None => {
                    let id = core.waiters.enqueue(mode, deliver);
                    tracing::debug!(
                        component = %self.config.component,
                        waiter = ?id,
                        mode = mode.as_str(),
                        timeout_ms = deadline.map(millis),
                        "waiter queued"
                    );
                    Some(id)
                }
            }
        };

        let Some(id) = id else {
            self.flush();
            return None;
        };

        if let Some(delay) = deadline {
            let weak = Arc::downgrade(self);
            let guard = TimeoutRace::arm(self.timer.as_ref(), delay, move |elapsed| {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(id, elapsed);
                }
            });
            // 等待者可能在武装期间已经结算，此时句柄在锁外撤销。
            let rejected = self.core.lock().waiters.attach_timer(id, guard).err();
            drop(rejected);
        }
        Some(id)
    }

    fn complete(&self, outcome: InitOutcome) {
        {
            let mut core = self.core.lock();
            if !core.init.record(outcome) {
                return;
            }
            let Some(resource) = core.binding.get().cloned() else {
                return;
            };
            let fulfilment = match core.init.failure() {
                None => Ok(resource),
                Some(error) => {
                    tracing::warn!(
                        component = %self.config.component,
                        error = %error,
                        "resource lifecycle failed"
                    );
                    Err(HandoffError::Lifecycle(error.clone()))
                }
            };
            let settlements =
                TimeoutRace::fulfil(&mut core.waiters, WaitMode::Initialized, &fulfilment);
            tracing::debug!(
                component = %self.config.component,
                drained = settlements.len(),
                initialized = fulfilment.is_ok(),
                "resource lifecycle completed"
            );
            core.outbox.extend(settlements);
        }
        self.flush();
    }

    fn expire(&self, id: WaiterId, elapsed: Duration) {
        {
            let mut core = self.core.lock();
            let Some(settlement) = TimeoutRace::expire(&mut core.waiters, id, elapsed, &self.config)
            else {
                return;
            };
            core.outbox.push_back(settlement);
        }
        self.flush();
    }
}

impl<R> Inner<R> {
    /// 按顺序执行发件箱；同一时刻只有一个投递者，其余调用方直接返回。
    ///
    /// 某个回调 panic 时继续投递其余结算，发件箱清空后再把首个 panic 重新抛出，
    /// 同批次的其他等待者不会因此失去结算。
    fn flush(&self) {
        {
            let mut core = self.core.lock();
            if core.flushing || core.outbox.is_empty() {
                return;
            }
            core.flushing = true;
        }

        let mut panicked = None;
        loop {
            let next = {
                let mut core = self.core.lock();
                match core.outbox.pop_front() {
                    Some(settlement) => settlement,
                    None => {
                        core.flushing = false;
                        break;
                    }
                }
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| next.deliver())) {
                tracing::warn!(component = %self.config.component, "waiter callback panicked");
                panicked.get_or_insert(payload);
            }
        }
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
    }

    /// 撤销尚未结算的等待者；其定时器随请求一起在锁外释放。
    fn cancel(&self, id: WaiterId) {
        let removed = self.core.lock().waiters.remove(id);
        if removed.is_some() {
            tracing::debug!(component = %self.config.component, waiter = ?id, "waiter cancelled");
        }
        drop(removed);
    }
}

impl<R> Drop for Inner<R> {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        let mut settlements: Vec<Settlement<R>> = core.outbox.drain(..).collect();
        let abandoned = core.waiters.drain_all();
        if !abandoned.is_empty() {
            tracing::debug!(
                component = %self.config.component,
                abandoned = abandoned.len(),
                "gate dropped with pending waiters"
            );
        }
        settlements.extend(abandoned.into_iter().map(|request| {
            request.settle_with(Err(HandoffError::Abandoned {
                component: self.config.component.clone(),
            }))
        }));
        for settlement in settlements {
            settlement.deliver();
        }
    }
}

/// 网关构造器。
pub struct GateBuilder<R> {
    config: GateConfig,
    timer: Option<Arc<dyn Timer>>,
    resource: Option<R>,
}

impl<R> Default for GateBuilder<R> {
    fn default() -> Self {
        Self {
            config: GateConfig::default(),
            timer: None,
            resource: None,
        }
    }
}

impl<R> GateBuilder<R>
where
    R: Lifecycle + Clone,
{
    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// 覆盖未显式指定截止时间的等待者所使用的默认时长。
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn timer(mut self, timer: impl Timer) -> Self {
        let timer: Arc<dyn Timer> = Arc::new(timer);
        self.timer = Some(timer);
        self
    }

    pub fn shared_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// 构造完成后立即绑定的资源。
    pub fn resource(mut self, resource: R) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn build(self) -> ReadinessGate<R> {
        let timer = match self.timer {
            Some(timer) => timer,
            None => Arc::new(ThreadTimer) as Arc<dyn Timer>,
        };
        let gate = ReadinessGate {
            inner: Arc::new(Inner {
                config: self.config,
                timer,
                core: Mutex::new(GateCore::default()),
            }),
        };
        if let Some(resource) = self.resource {
            let bound = gate.bind(resource);
            debug_assert!(bound.is_ok(), "a freshly built gate accepts its first binding");
        }
        gate
    }
}

impl<R> fmt::Debug for GateBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateBuilder")
            .field("config", &self.config)
            .field("custom_timer", &self.timer.is_some())
            .field("resource", &self.resource.is_some())
            .finish()
    }
}

/// [`ReadinessGate::ready`] 返回的 Future。
///
/// # 契约说明（What）
/// - 输出与回调风格收到的结果完全一致；
/// - 丢弃尚未结算的 Future 会撤销其等待者与定时器。
#[must_use = "futures do nothing unless polled; dropping it cancels the waiter"]
pub struct WaitFuture<R> {
    receiver: oneshot::Receiver<Outcome<R>>,
    waiter: Option<(WaiterId, Weak<Inner<R>>)>,
    component: String,
    settled: bool,
}

impl<R> Future for WaitFuture<R> {
    type Output = Result<R, HandoffError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(oneshot::Canceled)) => Err(HandoffError::Abandoned {
                component: this.component.clone(),
            }),
        };
        this.settled = true;
        Poll::Ready(outcome)
    }
}

impl<R> Drop for WaitFuture<R> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some((id, weak)) = self.waiter.take() {
            if let Some(inner) = weak.upgrade() {
                inner.cancel(id);
            }
        }
    }
}

impl<R> fmt::Debug for WaitFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitFuture")
            .field("component", &self.component)
            .field("settled", &self.settled)
            .finish()
    }
}
