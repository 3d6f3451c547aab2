//! 交接契约：资源绑定、初始化完成与等待者交付的端到端行为。
//!
//! # 覆盖范围（What）
//! - 完全初始化模式：初始化完成后才交付，且按调用顺序交付；
//! - 即时模式：资源一经绑定即交付；
//! - 构造期绑定、重复绑定、`is_ready` 迁移与 Future 风格的解析。
//!
//! 所有场景都使用虚拟时间驱动，避免依赖真实时钟。

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::executor::block_on;
use spark_handoff::test_stubs::StubResource;
use spark_handoff::{GateState, HandoffError, MockTimer, WaitMode, WaitOptions, error::codes};

use support::{Recorder, assert_handed_off, bound_gate, unbound_gate};

/// 验证：初始化完成后交付资源，且交付发生在启动前扩展之后。
#[test]
fn hands_off_resource_once_initialized() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    let recorder = Recorder::default();

    let pre_started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&pre_started);
    server.on_pre_start(move || flag.store(true, Ordering::SeqCst));

    gate.bind(server.clone()).expect("first bind");
    let seen_pre_start = Arc::clone(&pre_started);
    let sink = recorder.callback(1);
    gate.ready_with(WaitOptions::new(), move |outcome| {
        assert!(seen_pre_start.load(Ordering::SeqCst), "交付必须晚于启动前扩展");
        sink(outcome);
    });
    assert_eq!(recorder.len(), 0, "初始化前不得交付");

    server.initialize();
    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_handed_off(&outcomes[0].1, &server);
}

/// 验证：绑定前已完成初始化的资源同样可以交付。
#[test]
fn hands_off_resource_initialized_before_binding() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    server.initialize();
    let recorder = Recorder::default();

    gate.ready_with(WaitOptions::new(), recorder.callback(1));
    gate.bind(server.clone()).expect("first bind");

    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_handed_off(&outcomes[0].1, &server);
    assert!(gate.is_ready());
    assert_eq!(timer.pending(), 0, "交付后定时器必须撤销");
}

/// 验证：交付顺序与调用顺序一致，初始化后的调用排在其后。
#[test]
fn hands_off_in_call_order() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    let recorder = Recorder::default();

    gate.ready_with(WaitOptions::new(), recorder.callback(1));
    gate.ready_with(WaitOptions::new(), recorder.callback(2));
    gate.bind(server.clone()).expect("first bind");
    gate.ready_with(WaitOptions::new(), recorder.callback(3));
    gate.ready_with(WaitOptions::new(), recorder.callback(4));
    assert_eq!(recorder.len(), 0);

    server.initialize();
    gate.ready_with(WaitOptions::new(), recorder.callback(5));

    assert_eq!(recorder.order(), [1, 2, 3, 4, 5]);
    for (_, outcome) in recorder.outcomes() {
        assert_handed_off(&outcome, &server);
    }
}

/// 验证：构造期绑定的资源在初始化后交付。
#[test]
fn accepts_resource_at_construction() {
    let timer = MockTimer::new();
    let server = StubResource::shared("server");
    let gate = bound_gate(&timer, &server);
    assert_eq!(gate.state(), GateState::BoundPendingInit);
    assert!(gate.lifecycle_attached());

    let recorder = Recorder::default();
    gate.ready_with(WaitOptions::new(), recorder.callback(1));
    server.initialize();

    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_handed_off(&outcomes[0].1, &server);
}

/// 验证：`is_ready` 只在初始化完成后为真，且此后保持为真。
#[test]
fn reports_readiness_transitions() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");

    assert!(!gate.is_ready());
    gate.bind(server.clone()).expect("first bind");
    assert!(!gate.is_ready());
    server.initialize();
    assert!(gate.is_ready());
    server.initialize();
    assert!(gate.is_ready());
}

/// 验证：即时模式在绑定时交付，不等待初始化。
#[test]
fn immediate_mode_hands_off_on_bind() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    let recorder = Recorder::default();

    gate.ready_with(WaitOptions::new().immediate(), recorder.callback(1));
    gate.ready_with(WaitOptions::new().immediate(), recorder.callback(2));
    gate.ready_with(WaitOptions::new().immediate(), recorder.callback(3));
    assert_eq!(recorder.len(), 0);

    gate.bind(server.clone()).expect("first bind");
    assert_eq!(recorder.order(), [1, 2, 3]);
    assert!(!gate.is_ready(), "即时交付不代表初始化完成");

    gate.ready_with(WaitOptions::new().immediate(), recorder.callback(4));
    assert_eq!(recorder.order(), [1, 2, 3, 4], "已绑定时立即交付");
    for (_, outcome) in recorder.outcomes() {
        assert_handed_off(&outcome, &server);
    }
}

/// 验证：两种模式混合时，即时模式先于完全初始化模式交付。
#[test]
fn modes_drain_independently() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    let recorder = Recorder::default();

    gate.ready_with(WaitOptions::new(), recorder.callback(1));
    gate.ready_with(WaitOptions::new().immediate(), recorder.callback(2));
    gate.bind(server.clone()).expect("first bind");
    assert_eq!(recorder.order(), [2]);
    assert_eq!(gate.pending_waiters(), 1);

    server.initialize();
    assert_eq!(recorder.order(), [2, 1]);
}

/// 验证：重复绑定返回误用错误，原资源与等待者不受影响。
#[test]
fn rejects_second_binding() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let first = StubResource::shared("first");
    let second = StubResource::shared("second");
    let recorder = Recorder::default();

    gate.bind(first.clone()).expect("first bind");
    gate.ready_with(WaitOptions::new(), recorder.callback(1));

    let error = gate.bind(second.clone()).expect_err("second bind must fail");
    assert_eq!(
        error.to_string(),
        "Can't call labbable.using(server) more than once."
    );
    assert_eq!(error.code(), codes::ALREADY_BOUND);
    assert!(matches!(error, HandoffError::AlreadyBound { .. }));
    assert_eq!(second.pending_hooks(), 0, "被拒绝的资源不得挂载钩子");

    let bound = gate.resource().expect("resource stays bound");
    assert!(Arc::ptr_eq(&bound, &first));

    first.initialize();
    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_handed_off(&outcomes[0].1, &first);
}

/// 验证：Future 风格在初始化后解析。
#[test]
fn ready_future_resolves_after_initialization() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");

    let ready = gate.ready(WaitOptions::new());
    gate.bind(server.clone()).expect("first bind");
    server.initialize();

    let resolved = block_on(ready).expect("resource handed off");
    assert!(Arc::ptr_eq(&resolved, &server));
}

/// 验证：Future 风格的即时模式在绑定后解析。
#[test]
fn ready_future_resolves_immediately_after_binding() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");

    let ready = gate.ready(WaitMode::Bound);
    gate.bind(server.clone()).expect("first bind");

    let resolved = block_on(ready).expect("resource handed off");
    assert!(Arc::ptr_eq(&resolved, &server));
    assert_eq!(timer.pending(), 0);
}

/// 验证：Future 风格在超时后以超时错误解析。
#[test]
fn ready_future_rejects_on_timeout() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);

    let ready = gate.ready(WaitOptions::new().timeout(Duration::from_millis(1)));
    timer.advance(Duration::from_millis(1));

    let error = block_on(ready).expect_err("waiter timed out");
    assert_eq!(error.code(), codes::TIMEOUT);
    assert_eq!(
        error.as_timeout().map(|timeout| timeout.elapsed()),
        Some(Duration::from_millis(1))
    );
}

/// 验证：回调中重入网关发起的等待，会排在当前批次之后交付。
#[test]
fn reentrant_waits_are_delivered_after_current_batch() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    let recorder = Recorder::default();

    let reentrant = gate.clone();
    let sink = recorder.callback(1);
    let nested = recorder.callback(3);
    gate.ready_with(WaitOptions::new().no_timeout(), move |outcome| {
        sink(outcome);
        reentrant.ready_with(WaitOptions::new().no_timeout(), nested);
    });
    gate.ready_with(WaitOptions::new().no_timeout(), recorder.callback(2));

    gate.bind(server.clone()).expect("first bind");
    server.initialize();
    assert_eq!(recorder.order(), [1, 2, 3]);
}

/// 验证：丢弃未结算的 Future 只撤销它自己，其余等待者照常交付。
#[test]
fn dropped_future_is_withdrawn_from_the_queue() {
    let timer = MockTimer::new();
    let gate = unbound_gate(&timer);
    let server = StubResource::shared("server");
    let recorder = Recorder::default();

    gate.ready_with(WaitOptions::new(), recorder.callback(1));
    let abandoned = gate.ready(WaitOptions::new().timeout(Duration::from_millis(10)));
    let kept = gate.ready(WaitMode::Bound);
    assert_eq!(gate.pending_waiters(), 3);
    assert_eq!(timer.pending(), 3);

    drop(abandoned);
    assert_eq!(gate.pending_waiters(), 2);
    assert_eq!(timer.pending(), 2, "被丢弃等待者的定时器必须释放");

    gate.bind(server.clone()).expect("first bind");
    let bound = block_on(kept).expect("bound waiter handed off");
    assert!(Arc::ptr_eq(&bound, &server));
    server.initialize();
    timer.advance(Duration::from_millis(20));

    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_handed_off(&outcomes[0].1, &server);
    assert_eq!(gate.pending_waiters(), 0);
}
