//! 测试桩命名空间，集中提供官方维护的 [`Lifecycle`] 实现，供单元测试、集成测试与示例复用。
//!
//! # 设计背景（Why）
//! - 交接原语只消费宿主的生命周期能力；验证它需要一个可以手动驱动“启动完成/启动失败”的宿主替身；
//! - 统一维护替身，避免各测试文件重复实现钩子登记与触发逻辑。
//!
//! # 使用方式（How）
//! - `StubResource::shared("server")` 得到 `Arc<StubResource>`，直接作为网关的资源类型；
//! - 调用 [`StubResource::initialize`] 模拟启动序列完成，调用 [`StubResource::fail`] 模拟启动失败。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LifecycleError;
use crate::lifecycle::{InitHook, Lifecycle};

type PreStart = Box<dyn FnOnce() + Send + 'static>;

/// 可手动驱动初始化生命周期的宿主替身。
///
/// # 契约说明（What）
/// - `initialize`：依次执行登记的启动前扩展，随后标记完成并触发所有钩子；重复调用为空操作；
/// - `fail`：以给定错误触发所有钩子，此后登记的钩子立即以同一错误结算；
/// - 初始化完成后登记的钩子直接丢弃，由观察者通过 `is_initialized` 发现完成状态；
/// - 所有扩展与钩子都在锁外执行，允许其回调重入本资源。
pub struct StubResource {
    name: String,
    state: Mutex<StubState>,
}

#[derive(Default)]
struct StubState {
    initialized: bool,
    failure: Option<LifecycleError>,
    hooks: Vec<InitHook>,
    pre_start: Vec<PreStart>,
}

impl StubResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(StubState::default()),
        }
    }

    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 登记启动前扩展，在 `initialize` 标记完成之前执行。
    pub fn on_pre_start(&self, extension: impl FnOnce() + Send + 'static) {
        self.state.lock().pre_start.push(Box::new(extension));
    }

    /// 模拟启动序列成功结束。
    pub fn initialize(&self) {
        let pre_start = {
            let mut state = self.state.lock();
            if state.initialized || state.failure.is_some() {
                return;
            }
            std::mem::take(&mut state.pre_start)
        };
        for extension in pre_start {
            extension();
        }

        let hooks = {
            let mut state = self.state.lock();
            state.initialized = true;
            std::mem::take(&mut state.hooks)
        };
        for hook in hooks {
            hook.complete();
        }
    }

    /// 模拟启动序列失败。
    pub fn fail(&self, error: LifecycleError) {
        let hooks = {
            let mut state = self.state.lock();
            if state.initialized || state.failure.is_some() {
                return;
            }
            state.failure = Some(error.clone());
            std::mem::take(&mut state.hooks)
        };
        for hook in hooks {
            hook.fail(error.clone());
        }
    }

    /// 尚未触发的钩子数量。
    pub fn pending_hooks(&self) -> usize {
        self.state.lock().hooks.len()
    }
}

impl Lifecycle for StubResource {
    fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    fn on_initialized(&self, hook: InitHook) {
        let failure = {
            let mut state = self.state.lock();
            if state.initialized {
                return;
            }
            match &state.failure {
                Some(error) => error.clone(),
                None => {
                    state.hooks.push(hook);
                    return;
                }
            }
        };
        hook.fail(failure);
    }
}

impl fmt::Debug for StubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StubResource")
            .field("name", &self.name)
            .field("initialized", &state.initialized)
            .field("failed", &state.failure.is_some())
            .field("pending_hooks", &state.hooks.len())
            .finish()
    }
}

impl PartialEq for StubResource {
    /// 替身按身份比较：两个引用指向同一实例才相等。
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for StubResource {}
