//! End-to-end manager scenarios against the recording mock backend.
//!
//! Events travel the same path as with real hardware: the mock posts them on
//! the manager's run loop, the runner thread fires the trampolines, and the
//! host context dispatches them here.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use iohid::bindings::{
    self, CLOSE, IS_OPEN, OPEN, SET_CLOSE_CALLBACK, SET_DEVICE_MATCHING_CALLBACK,
    SET_DEVICE_MATCHING_CRITERIA, SET_DEVICE_REMOVAL_CALLBACK,
};
use iohid::native::{DeviceProperties, IoReturn, Matching, MockBackend, MockCall};
use iohid::{Dispatch, Error, EventKind, HostContext, HostFunction, HostObject, HostValue, Manager};

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

fn keyboard() -> DeviceProperties {
    DeviceProperties {
        vendor_id: 1452,
        product_id: 591,
        product: Some("Keyboard".into()),
        transport: Some("USB".into()),
        primary_usage_page: 0x01,
        primary_usage: 0x06,
        path: "mock://keyboard".into(),
        ..Default::default()
    }
}

fn mouse() -> DeviceProperties {
    DeviceProperties {
        vendor_id: 0x046D,
        product_id: 0xC077,
        product: Some("Mouse".into()),
        primary_usage_page: 0x01,
        primary_usage: 0x02,
        path: "mock://mouse".into(),
        ..Default::default()
    }
}

fn keyboard_criteria() -> HostValue {
    let mut criteria = HostObject::new();
    criteria.set("VendorID", 1452).set("ProductID", 591);
    criteria.into()
}

/// Host function recording every payload it is called with
fn recorder() -> (HostFunction, Rc<RefCell<Vec<HostValue>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let f = HostFunction::new(move |args| {
        sink.borrow_mut()
            .push(args.first().cloned().unwrap_or_default())
    });
    (f, seen)
}

async fn next(ctx: &mut HostContext) -> Dispatch {
    tokio::time::timeout(DISPATCH_TIMEOUT, ctx.dispatch_next())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// True when nothing arrives within the quiet period
async fn quiet(ctx: &mut HostContext) -> bool {
    tokio::time::timeout(QUIET_PERIOD, ctx.dispatch_next())
        .await
        .is_err()
}

fn setup() -> (MockBackend, HostContext, Manager) {
    let backend = MockBackend::new();
    let ctx = HostContext::new();
    let manager = bindings::create_manager(&backend, &ctx, &[]).unwrap();
    (backend, ctx, manager)
}

fn property(event: &HostValue, key: &str) -> Option<HostValue> {
    event
        .as_object()?
        .get("properties")?
        .as_object()?
        .get(key)
        .cloned()
}

#[tokio::test]
async fn matching_attach_invokes_callback_once() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, seen) = recorder();

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[keyboard_criteria()]).unwrap();
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    let device = backend.attach(keyboard());
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert!(quiet(&mut ctx).await);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    let event = seen[0].as_object().unwrap();
    assert_eq!(event.get("deviceId"), Some(&HostValue::Number(device.id.0 as f64)));
    assert_eq!(
        event.get("result"),
        Some(&HostValue::Number(f64::from(IoReturn::Success.code())))
    );
    assert_eq!(
        event.get("sender"),
        Some(&HostValue::Number(manager.token().0 as f64))
    );
    assert_eq!(property(&seen[0], "VendorID"), Some(HostValue::Number(1452.0)));
    assert_eq!(property(&seen[0], "ProductID"), Some(HostValue::Number(591.0)));
    assert_eq!(property(&seen[0], "Product"), Some(HostValue::from("Keyboard")));
}

#[tokio::test]
async fn non_matching_device_not_delivered() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, seen) = recorder();

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[keyboard_criteria()]).unwrap();
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    backend.attach(mouse());
    backend.attach(keyboard());
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert!(quiet(&mut ctx).await);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(property(&seen[0], "Product"), Some(HostValue::from("Keyboard")));
}

#[tokio::test]
async fn multiple_criteria_match_any() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, seen) = recorder();

    let criteria: HostValue = serde_json::json!([
        {"VendorID": 0x046D},
        {"DeviceUsagePairs": [{"DeviceUsagePage": 1, "DeviceUsage": 6}]}
    ])
    .into();
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[criteria]).unwrap();
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    backend.attach(mouse());
    backend.attach(keyboard());
    backend.attach(DeviceProperties {
        vendor_id: 0x1234,
        path: "mock://other".into(),
        ..Default::default()
    });
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert!(quiet(&mut ctx).await);
    assert_eq!(seen.borrow().len(), 2);
}

#[tokio::test]
async fn empty_criteria_list_matches_nothing() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, seen) = recorder();

    bindings::invoke(
        &mut manager,
        SET_DEVICE_MATCHING_CRITERIA,
        &[HostValue::Array(vec![])],
    )
    .unwrap();
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    backend.attach(keyboard());
    assert!(quiet(&mut ctx).await);
    assert!(seen.borrow().is_empty());
}

#[tokio::test]
async fn attach_then_detach() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, matched) = recorder();
    let (on_remove, removed) = recorder();

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    bindings::invoke(&mut manager, SET_DEVICE_REMOVAL_CALLBACK, &[on_remove.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    let device = backend.attach(keyboard());
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert_eq!(manager.devices().len(), 1);

    backend.detach(device.id);
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Removal));
    assert!(manager.devices().is_empty());

    let id = HostValue::Number(device.id.0 as f64);
    let get_id = |v: &HostValue| v.as_object().and_then(|o| o.get("deviceId")).cloned();
    assert_eq!(get_id(&matched.borrow()[0]), Some(id.clone()));
    assert_eq!(get_id(&removed.borrow()[0]), Some(id));
}

#[tokio::test]
async fn devices_attached_before_open_are_reported() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, seen) = recorder();
    backend.attach(keyboard());

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert_eq!(seen.borrow().len(), 1);
}

#[tokio::test]
async fn null_callback_before_registration_is_noop() {
    let (backend, _ctx, mut manager) = setup();

    for method in [
        SET_DEVICE_MATCHING_CALLBACK,
        SET_DEVICE_REMOVAL_CALLBACK,
        SET_CLOSE_CALLBACK,
    ] {
        assert_eq!(
            bindings::invoke(&mut manager, method, &[HostValue::Null]).unwrap(),
            HostValue::Undefined
        );
    }
    assert_eq!(
        backend.count(|c| matches!(
            c,
            MockCall::RegisterMatchingCallback { .. } | MockCall::RegisterRemovalCallback { .. }
        )),
        0
    );
    assert_eq!(backend.active_callbacks(manager.native_id()), Some((false, false)));
}

#[tokio::test]
async fn unregistered_callback_stops_delivery() {
    let (backend, mut ctx, mut manager) = setup();
    let id = manager.native_id();
    let (on_match, seen) = recorder();

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[on_match.into()]).unwrap();
    assert_eq!(backend.active_callbacks(id), Some((true, false)));
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CALLBACK, &[HostValue::Null]).unwrap();
    assert_eq!(backend.active_callbacks(id), Some((false, false)));
    assert!(backend.calls().contains(&MockCall::RegisterMatchingCallback {
        manager: id,
        registered: false
    }));

    bindings::invoke(&mut manager, OPEN, &[]).unwrap();
    backend.attach(keyboard());
    assert!(quiet(&mut ctx).await);
    assert!(seen.borrow().is_empty());
}

#[tokio::test]
async fn replaced_callback_skips_in_flight_events() {
    let (backend, mut ctx, mut manager) = setup();
    let (first, first_seen) = recorder();
    let (second, second_seen) = recorder();

    manager.set_device_matching_callback(Some(first));
    manager.open().unwrap();
    backend.attach(keyboard());
    // Let the runner forward the event before re-registering
    tokio::time::sleep(QUIET_PERIOD).await;

    manager.set_device_matching_callback(Some(second));
    assert_eq!(next(&mut ctx).await, Dispatch::Dropped(EventKind::Matching));

    backend.attach(mouse());
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert!(first_seen.borrow().is_empty());
    assert_eq!(second_seen.borrow().len(), 1);
}

#[tokio::test]
async fn open_twice_opens_and_schedules_once() {
    let (backend, _ctx, mut manager) = setup();

    bindings::invoke(&mut manager, OPEN, &[]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();

    assert_eq!(backend.count(|c| matches!(c, MockCall::Open { .. })), 1);
    assert_eq!(backend.count(|c| matches!(c, MockCall::Schedule { .. })), 1);
    assert_eq!(
        bindings::invoke(&mut manager, IS_OPEN, &[]).unwrap(),
        HostValue::Bool(true)
    );
}

#[tokio::test]
async fn unsupported_criteria_leave_previous_installed() {
    let (backend, _ctx, mut manager) = setup();
    let id = manager.native_id();

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[keyboard_criteria()]).unwrap();
    let before = backend.installed_matching(id);
    assert!(matches!(before, Some(Matching::Single(_))));

    let err = bindings::invoke(
        &mut manager,
        SET_DEVICE_MATCHING_CRITERIA,
        &[HostFunction::new(|_| {}).into()],
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedValueType(t) if t == "function"));

    let mut nested = HostObject::new();
    nested.set("VendorID", 1).set("Flag", true);
    assert!(matches!(
        bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[nested.into()]),
        Err(Error::UnsupportedValueType(_))
    ));

    assert_eq!(backend.installed_matching(id), before);
    assert_eq!(
        backend.count(|c| matches!(c, MockCall::SetDeviceMatching { .. })),
        1
    );
}

#[tokio::test]
async fn null_criteria_restore_no_filtering() {
    let (backend, _ctx, mut manager) = setup();
    let id = manager.native_id();

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[keyboard_criteria()]).unwrap();
    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[HostValue::Null]).unwrap();
    assert_eq!(backend.installed_matching(id), Some(Matching::All));
}

#[tokio::test]
async fn creation_failure_leaves_no_handle() {
    let backend = MockBackend::new();
    let ctx = HostContext::new();
    backend.set_fail_create(true);

    let result = bindings::create_manager(&backend, &ctx, &[]);
    assert!(matches!(result, Err(Error::ManagerCreationFailed)));
    assert_eq!(ctx.live_handles(), 0);
    assert_eq!(backend.live_managers(), 0);
}

#[tokio::test]
async fn open_failure_reports_code_and_unschedules() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_close, closed) = recorder();
    manager.set_close_callback(Some(on_close));
    backend.set_open_result(IoReturn::ExclusiveAccess);

    let err = bindings::invoke(&mut manager, OPEN, &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::ManagerOpenFailed(IoReturn::ExclusiveAccess)
    ));
    assert!(!manager.is_open());
    assert!(!manager.is_running());
    assert_eq!(backend.count(|c| matches!(c, MockCall::Schedule { .. })), 1);
    assert_eq!(backend.count(|c| matches!(c, MockCall::Unschedule { .. })), 1);

    // No runner was started, so no close notification either
    assert!(quiet(&mut ctx).await);
    assert!(closed.borrow().is_empty());

    backend.set_open_result(IoReturn::Success);
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();
    assert!(manager.is_open());
}

#[tokio::test]
async fn close_fires_close_callback_once() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_close, closed) = recorder();

    bindings::invoke(&mut manager, SET_CLOSE_CALLBACK, &[on_close.into()]).unwrap();
    bindings::invoke(&mut manager, OPEN, &[]).unwrap();
    assert!(manager.is_running());

    bindings::invoke(&mut manager, CLOSE, &[]).unwrap();
    assert!(!manager.is_running());
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Close));
    assert!(quiet(&mut ctx).await);
    assert_eq!(closed.borrow().len(), 1);

    // Closing again does nothing
    bindings::invoke(&mut manager, CLOSE, &[]).unwrap();
    assert_eq!(backend.count(|c| matches!(c, MockCall::Close { .. })), 1);
    assert!(quiet(&mut ctx).await);
}

#[tokio::test]
async fn dropped_handle_skips_queued_events() {
    let (backend, mut ctx, mut manager) = setup();
    let (on_match, seen) = recorder();
    let (on_close, closed) = recorder();

    manager.set_device_matching_callback(Some(on_match));
    manager.set_close_callback(Some(on_close));
    manager.open().unwrap();
    backend.attach(keyboard());
    tokio::time::sleep(QUIET_PERIOD).await;

    drop(manager);
    assert_eq!(ctx.live_handles(), 0);
    assert_eq!(backend.live_managers(), 0);

    assert_eq!(next(&mut ctx).await, Dispatch::Dropped(EventKind::Matching));
    assert_eq!(next(&mut ctx).await, Dispatch::Dropped(EventKind::Close));
    assert!(seen.borrow().is_empty());
    assert!(closed.borrow().is_empty());
}

#[tokio::test]
async fn handles_are_independent() {
    let backend = MockBackend::new();
    let mut ctx = HostContext::new();
    let mut a = bindings::create_manager(&backend, &ctx, &[]).unwrap();
    let mut b = bindings::create_manager(&backend, &ctx, &[]).unwrap();
    assert_ne!(a.token(), b.token());
    assert_ne!(a.native_id(), b.native_id());

    let (on_a, seen_a) = recorder();
    let (on_b, seen_b) = recorder();
    a.set_device_matching_criteria(&keyboard_criteria()).unwrap();
    a.set_device_matching_callback(Some(on_a));
    b.set_device_matching_callback(Some(on_b));
    a.open().unwrap();
    b.open().unwrap();

    backend.attach(mouse());
    assert_eq!(next(&mut ctx).await, Dispatch::Delivered(EventKind::Matching));
    assert!(quiet(&mut ctx).await);
    assert!(seen_a.borrow().is_empty());
    assert_eq!(seen_b.borrow().len(), 1);

    let sender = seen_b.borrow()[0]
        .as_object()
        .and_then(|o| o.get("sender"))
        .cloned();
    assert_eq!(sender, Some(HostValue::Number(b.token().0 as f64)));
}
