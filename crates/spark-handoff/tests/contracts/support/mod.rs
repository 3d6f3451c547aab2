//! 契约测试共享的桩与记录器。
//!
//! # 设计背景（Why）
//! - 各契约测试都需要“按调用编号记录结算结果”，集中实现避免重复；
//! - 网关配置沿用宿主适配层的调用名，使超时文案可以逐字断言。

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use spark_handoff::test_stubs::StubResource;
use spark_handoff::{GateConfig, HandoffError, MockTimer, ReadinessGate};

pub(crate) type Server = Arc<StubResource>;
pub(crate) type Outcome = Result<Server, HandoffError>;

/// 与宿主适配层一致的文案配置。
pub(crate) fn labbable_config() -> GateConfig {
    GateConfig::default()
        .with_component("Labbable")
        .with_bind_call("labbable.using(server)")
        .with_init_call("server.initialize()")
}

/// 使用虚拟时间构造未绑定的网关。
pub(crate) fn unbound_gate(timer: &MockTimer) -> ReadinessGate<Server> {
    ReadinessGate::builder()
        .config(labbable_config())
        .timer(timer.clone())
        .build()
}

/// 使用虚拟时间构造已绑定 `server` 的网关。
pub(crate) fn bound_gate(timer: &MockTimer, server: &Server) -> ReadinessGate<Server> {
    ReadinessGate::builder()
        .config(labbable_config())
        .timer(timer.clone())
        .resource(server.clone())
        .build()
}

/// 按调用编号记录结算结果的记录器。
///
/// # 契约说明（What）
/// - `callback(n)` 返回一个回调，结算时把 `(n, outcome)` 追加到共享缓冲区；
/// - `order()` 返回结算顺序，`outcomes()` 返回完整结果。
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<(usize, Outcome)>>>,
}

impl Recorder {
    pub(crate) fn callback(&self, n: usize) -> impl FnOnce(Outcome) + Send + 'static + use<> {
        let events = Arc::clone(&self.events);
        move |outcome| events.lock().push((n, outcome))
    }

    pub(crate) fn order(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .map(|(n, _)| *n)
            .collect()
    }

    pub(crate) fn outcomes(&self) -> Vec<(usize, Outcome)> {
        self.events.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.lock().len()
    }
}

/// 断言结果为交付了指定资源。
pub(crate) fn assert_handed_off(outcome: &Outcome, server: &Server) {
    match outcome {
        Ok(resource) => assert!(Arc::ptr_eq(resource, server), "应交付同一个资源实例"),
        Err(error) => panic!("期望交付资源，实际收到错误：{error}"),
    }
}

/// 断言结果为超时且文案逐字匹配。
pub(crate) fn assert_timed_out(outcome: &Outcome, message: &str) {
    match outcome {
        Err(error) => {
            assert!(error.is_timeout(), "期望超时错误，实际为 {error:?}");
            assert_eq!(error.to_string(), message);
        }
        Ok(_) => panic!("期望超时错误，实际交付了资源"),
    }
}
