//! Recording mock of the native layer
//!
//! `MockBackend` logs every native call its managers receive, can be forced
//! to fail manager creation or open, and simulates device attach/detach.
//! Simulated events are queued on the run loop each open manager is scheduled
//! on, so callbacks fire on whichever thread drives that run loop, just like
//! the real backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::device::{DeviceId, DeviceProperties, HidDevice, HidDeviceRef, ManagerId};
use crate::error::IoReturn;
use crate::manager::{
    matching_from, DeviceCallback, HidBackend, HidOptions, ManagerCore, NativeManager,
};
use crate::matching::Matching;
use crate::object::CfRef;
use crate::run_loop::{RunLoop, RunLoopSource, SourceId};

/// A native call recorded by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateManager { manager: ManagerId },
    SetDeviceMatching { manager: ManagerId, matching: Option<CfRef> },
    SetDeviceMatchingMultiple { manager: ManagerId, multiple: Option<CfRef> },
    RegisterMatchingCallback { manager: ManagerId, registered: bool },
    RegisterRemovalCallback { manager: ManagerId, registered: bool },
    Schedule { manager: ManagerId, mode: String },
    Unschedule { manager: ManagerId, mode: String },
    Open { manager: ManagerId, options: HidOptions },
    Close { manager: ManagerId },
    Release { manager: ManagerId },
}

impl MockCall {
    pub fn manager(&self) -> ManagerId {
        match self {
            MockCall::CreateManager { manager }
            | MockCall::SetDeviceMatching { manager, .. }
            | MockCall::SetDeviceMatchingMultiple { manager, .. }
            | MockCall::RegisterMatchingCallback { manager, .. }
            | MockCall::RegisterRemovalCallback { manager, .. }
            | MockCall::Schedule { manager, .. }
            | MockCall::Unschedule { manager, .. }
            | MockCall::Open { manager, .. }
            | MockCall::Close { manager }
            | MockCall::Release { manager } => *manager,
        }
    }
}

/// State visible to the backend for each live manager
struct Shared {
    core: Arc<ManagerCore>,
    run_loop: Mutex<Option<(RunLoop, SourceId)>>,
}

/// Keeps a run loop alive while a manager is scheduled on it; simulated
/// events arrive as queued work instead
struct ScheduledMarker;

impl RunLoopSource for ScheduledMarker {
    fn perform(&self) {}
}

struct MockInner {
    calls: Mutex<Vec<MockCall>>,
    managers: Mutex<Vec<Weak<Shared>>>,
    attached: Mutex<Vec<HidDeviceRef>>,
    fail_create: Mutex<bool>,
    open_result: Mutex<IoReturn>,
    next_manager: AtomicU64,
    next_device: AtomicU64,
}

/// Fake native layer for tests
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<MockInner>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                calls: Mutex::new(Vec::new()),
                managers: Mutex::new(Vec::new()),
                attached: Mutex::new(Vec::new()),
                fail_create: Mutex::new(false),
                open_result: Mutex::new(IoReturn::Success),
                next_manager: AtomicU64::new(1),
                next_device: AtomicU64::new(1),
            }),
        }
    }

    /// Make every subsequent `create_manager` return nothing
    pub fn set_fail_create(&self, fail: bool) {
        *self.inner.fail_create.lock() = fail;
    }

    /// Result every subsequent `open` reports
    pub fn set_open_result(&self, result: IoReturn) {
        *self.inner.open_result.lock() = result;
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.calls.lock().clone()
    }

    /// Number of recorded calls satisfying `pred`
    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.inner.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().clear();
    }

    /// Criteria currently installed in a live manager
    pub fn installed_matching(&self, manager: ManagerId) -> Option<Matching> {
        self.find(manager).map(|shared| shared.core.matching())
    }

    /// (matching, removal) callback registration state of a live manager
    pub fn active_callbacks(&self, manager: ManagerId) -> Option<(bool, bool)> {
        self.find(manager).map(|shared| shared.core.has_callbacks())
    }

    /// Number of managers not yet released
    pub fn live_managers(&self) -> usize {
        self.inner
            .managers
            .lock()
            .iter()
            .filter(|m| m.strong_count() > 0)
            .count()
    }

    /// Simulate a device attaching. Open, scheduled managers are notified
    /// through their run loop.
    pub fn attach(&self, properties: DeviceProperties) -> HidDeviceRef {
        let id = DeviceId(self.inner.next_device.fetch_add(1, Ordering::Relaxed));
        let device = Arc::new(HidDevice { id, properties });
        self.inner.attached.lock().push(Arc::clone(&device));
        debug!("Mock attach {:?}", id);

        for shared in self.live() {
            let device = Arc::clone(&device);
            post(&shared, move |core| core.device_added(&device));
        }
        device
    }

    /// Simulate a device detaching
    pub fn detach(&self, id: DeviceId) {
        self.inner.attached.lock().retain(|d| d.id != id);
        debug!("Mock detach {:?}", id);

        for shared in self.live() {
            post(&shared, move |core| core.device_removed(id));
        }
    }

    fn record(&self, call: MockCall) {
        self.inner.calls.lock().push(call);
    }

    fn live(&self) -> Vec<Arc<Shared>> {
        let mut managers = self.inner.managers.lock();
        managers.retain(|m| m.strong_count() > 0);
        managers.iter().filter_map(Weak::upgrade).collect()
    }

    fn find(&self, manager: ManagerId) -> Option<Arc<Shared>> {
        self.live().into_iter().find(|s| s.core.id() == manager)
    }
}

/// Queue `f` on the manager's run loop; dropped if it is not scheduled
fn post<F>(shared: &Arc<Shared>, f: F)
where
    F: FnOnce(&ManagerCore) + Send + 'static,
{
    if let Some((run_loop, _)) = shared.run_loop.lock().as_ref() {
        let core = Arc::clone(&shared.core);
        run_loop.perform_block(move || f(&core));
    }
}

impl HidBackend for MockBackend {
    fn create_manager(&self, _options: HidOptions) -> Option<Box<dyn NativeManager>> {
        if *self.inner.fail_create.lock() {
            debug!("Mock create_manager forced to fail");
            return None;
        }
        let id = ManagerId(self.inner.next_manager.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(Shared {
            core: Arc::new(ManagerCore::new(id)),
            run_loop: Mutex::new(None),
        });
        self.inner.managers.lock().push(Arc::downgrade(&shared));
        self.record(MockCall::CreateManager { manager: id });
        Some(Box::new(MockManager {
            backend: self.clone(),
            shared,
        }))
    }
}

/// Manager handed out by [`MockBackend`]
struct MockManager {
    backend: MockBackend,
    shared: Arc<Shared>,
}

impl NativeManager for MockManager {
    fn id(&self) -> ManagerId {
        self.shared.core.id()
    }

    fn set_device_matching(&mut self, matching: Option<&CfRef>) {
        self.backend.record(MockCall::SetDeviceMatching {
            manager: self.id(),
            matching: matching.cloned(),
        });
        self.shared.core.set_matching(matching_from(matching, false));
    }

    fn set_device_matching_multiple(&mut self, multiple: Option<&CfRef>) {
        self.backend.record(MockCall::SetDeviceMatchingMultiple {
            manager: self.id(),
            multiple: multiple.cloned(),
        });
        self.shared.core.set_matching(matching_from(multiple, true));
    }

    fn register_device_matching_callback(&mut self, callback: Option<DeviceCallback>) {
        self.backend.record(MockCall::RegisterMatchingCallback {
            manager: self.id(),
            registered: callback.is_some(),
        });
        self.shared.core.set_matching_callback(callback);
    }

    fn register_device_removal_callback(&mut self, callback: Option<DeviceCallback>) {
        self.backend.record(MockCall::RegisterRemovalCallback {
            manager: self.id(),
            registered: callback.is_some(),
        });
        self.shared.core.set_removal_callback(callback);
    }

    fn schedule_with_run_loop(&mut self, run_loop: &RunLoop, mode: &str) {
        self.backend.record(MockCall::Schedule {
            manager: self.id(),
            mode: mode.to_owned(),
        });
        let mut scheduled = self.shared.run_loop.lock();
        if let Some((previous, source)) = scheduled.take() {
            previous.remove_source(source);
        }
        let source = run_loop.add_source(Arc::new(ScheduledMarker), mode);
        *scheduled = Some((run_loop.clone(), source));
    }

    fn unschedule_from_run_loop(&mut self, run_loop: &RunLoop, mode: &str) {
        self.backend.record(MockCall::Unschedule {
            manager: self.id(),
            mode: mode.to_owned(),
        });
        let mut scheduled = self.shared.run_loop.lock();
        if scheduled.as_ref().is_some_and(|(rl, _)| rl.ptr_eq(run_loop)) {
            if let Some((rl, source)) = scheduled.take() {
                rl.remove_source(source);
            }
        }
    }

    fn open(&mut self, options: HidOptions) -> IoReturn {
        self.backend.record(MockCall::Open {
            manager: self.id(),
            options,
        });
        let result = *self.backend.inner.open_result.lock();
        if !result.is_success() {
            return result;
        }

        self.shared.core.set_opened(true);
        // Devices already attached are reported on open
        let attached = self.backend.inner.attached.lock().clone();
        for device in attached {
            post(&self.shared, move |core| core.device_added(&device));
        }
        IoReturn::Success
    }

    fn close(&mut self, _options: HidOptions) -> IoReturn {
        self.backend.record(MockCall::Close { manager: self.id() });
        if !self.shared.core.is_opened() {
            return IoReturn::NotOpen;
        }
        self.shared.core.set_opened(false);
        IoReturn::Success
    }

    fn devices(&self) -> Vec<HidDeviceRef> {
        self.shared.core.present()
    }
}

impl Drop for MockManager {
    fn drop(&mut self) {
        self.backend.record(MockCall::Release { manager: self.id() });
    }
}
