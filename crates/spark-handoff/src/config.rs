//! 网关与等待者的配置面。
//!
//! # 模块定位（Why）
//! - 默认超时属于“进程级配置、可简单覆盖”的参数；此处将其收敛为每个网关实例的构造期字段，
//!   避免可变全局状态在测试之间互相泄漏；
//! - 等待选项（截止时间 + 等待模式）以强类型表达，“禁用超时”不再依赖 `false`/`0` 之类的哨兵值。
//!
//! # 结构概览（What）
//! - [`GateConfig`]：网关级配置，可经 serde 从任意格式加载；
//! - [`WaitOptions`]：单次等待的选项；
//! - [`Timeout`]、[`WaitMode`]：选项的组成部分。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TimeoutError;

/// 调用方未显式指定截止时间时使用的安全网时长。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// 以毫秒表示时长，超出 `u64` 范围时饱和为 `u64::MAX`。
pub(crate) fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// 等待者的满足条件。
///
/// - `Initialized`：资源已绑定且初始化生命周期已完成（默认）；
/// - `Bound`：资源一旦绑定即满足，与初始化进度无关。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    #[default]
    Initialized,
    Bound,
}

impl WaitMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            WaitMode::Initialized => "initialized",
            WaitMode::Bound => "bound",
        }
    }
}

/// 等待者的截止时间策略。
///
/// # 契约说明（What）
/// - `Default`：使用网关配置中的 [`GateConfig::default_timeout`]；
/// - `Disabled`：不武装任何定时器，无限期等待；
/// - `After(d)`：等待 `d` 后超时；`d` 为零时等价于 `Disabled`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    #[default]
    Default,
    Disabled,
    After(Duration),
}

impl Timeout {
    /// 结合网关默认值解析出需要武装的定时器时长；`None` 表示不武装。
    pub fn resolve(self, default: Duration) -> Option<Duration> {
        let delay = match self {
            Timeout::Default => default,
            Timeout::Disabled => return None,
            Timeout::After(delay) => delay,
        };
        (!delay.is_zero()).then_some(delay)
    }
}

impl From<Duration> for Timeout {
    fn from(delay: Duration) -> Self {
        Timeout::After(delay)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(delay: Option<Duration>) -> Self {
        delay.map_or(Timeout::Disabled, Timeout::After)
    }
}

/// 单次等待的选项。
///
/// ```
/// use std::time::Duration;
/// use spark_handoff::{Timeout, WaitMode, WaitOptions};
///
/// let options = WaitOptions::new().timeout(Duration::from_millis(10)).immediate();
/// assert_eq!(options.mode, WaitMode::Bound);
/// assert_eq!(options.timeout, Timeout::After(Duration::from_millis(10)));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Timeout,
    pub mode: WaitMode,
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定截止时间，接受 `Duration`、`Option<Duration>` 或 [`Timeout`]。
    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// 关闭超时。
    pub fn no_timeout(mut self) -> Self {
        self.timeout = Timeout::Disabled;
        self
    }

    pub fn mode(mut self, mode: WaitMode) -> Self {
        self.mode = mode;
        self
    }

    /// 资源一旦绑定即交付，不等待初始化完成。
    pub fn immediate(self) -> Self {
        self.mode(WaitMode::Bound)
    }
}

impl From<WaitMode> for WaitOptions {
    fn from(mode: WaitMode) -> Self {
        Self::new().mode(mode)
    }
}

/// 网关级配置。
///
/// # 设计目的（Why）
/// - 超时文案需要点名“可能遗漏的调用”，而这些调用的名字由宿主适配层决定，因此作为配置注入；
/// - 默认超时从全局常量下沉为实例字段，保证网关之间互不影响。
///
/// # 契约说明（What）
/// - `default_timeout`：未显式指定截止时间时的时长，序列化为毫秒字段 `default_timeout_ms`；
/// - `component`：文案中的组件名；
/// - `bind_call` / `init_call`：文案中提示的绑定调用与初始化调用；
/// - 所有字段均有默认值，缺省字段在反序列化时回落到默认。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    #[serde(rename = "default_timeout_ms", with = "duration_ms")]
    pub default_timeout: Duration,
    pub component: String,
    pub bind_call: String,
    pub init_call: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            component: "ReadinessGate".to_owned(),
            bind_call: "gate.bind(resource)".to_owned(),
            init_call: "resource.initialize()".to_owned(),
        }
    }
}

impl GateConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_bind_call(mut self, call: impl Into<String>) -> Self {
        self.bind_call = call.into();
        self
    }

    pub fn with_init_call(mut self, call: impl Into<String>) -> Self {
        self.init_call = call.into();
        self
    }

    /// 按等待模式拼装超时错误。
    ///
    /// - `Initialized`：提示“未触发初始化或未绑定资源”；
    /// - `Bound`：仅提示“未绑定资源”。
    pub fn timeout_error(&self, mode: WaitMode, elapsed: Duration) -> TimeoutError {
        let expected = match mode {
            WaitMode::Initialized => format!("{} or {}", self.init_call, self.bind_call),
            WaitMode::Bound => self.bind_call.clone(),
        };
        TimeoutError::new(self.component.clone(), elapsed, mode, expected)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::millis(*value))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
