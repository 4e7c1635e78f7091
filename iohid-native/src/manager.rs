//! Native manager interface
//!
//! Every backend hands out managers through [`HidBackend::create_manager`].
//! A manager holds device-matching criteria and at most one matching and one
//! removal callback. Once scheduled on a [`RunLoop`] and opened, it reports
//! attach/detach events by invoking those callbacks on the run-loop thread.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::{DeviceId, HidDeviceRef, ManagerId};
use crate::error::IoReturn;
use crate::matching::Matching;
use crate::object::CfRef;
use crate::run_loop::RunLoop;

/// Options accepted by `create_manager`, `open` and `close`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HidOptions(pub u32);

impl HidOptions {
    pub const NONE: HidOptions = HidOptions(0);
    /// Exclusive access to matched devices (not supported by the bundled backends)
    pub const SEIZE_DEVICE: HidOptions = HidOptions(1);
}

/// Device callback: `(result, sender, device)`.
///
/// Invoked on the run-loop thread the manager was scheduled on.
pub type DeviceCallback = Arc<dyn Fn(IoReturn, ManagerId, &HidDeviceRef) + Send + Sync>;

/// A native HID manager
pub trait NativeManager: Send {
    /// Identifier passed as `sender` to callbacks
    fn id(&self) -> ManagerId;

    /// Install a single criteria dictionary; `None` matches every device
    fn set_device_matching(&mut self, matching: Option<&CfRef>);

    /// Install a list of criteria dictionaries; `None` matches every device
    fn set_device_matching_multiple(&mut self, multiple: Option<&CfRef>);

    /// Replace the matching callback; `None` unregisters
    fn register_device_matching_callback(&mut self, callback: Option<DeviceCallback>);

    /// Replace the removal callback; `None` unregisters
    fn register_device_removal_callback(&mut self, callback: Option<DeviceCallback>);

    fn schedule_with_run_loop(&mut self, run_loop: &RunLoop, mode: &str);

    fn unschedule_from_run_loop(&mut self, run_loop: &RunLoop, mode: &str);

    fn open(&mut self, options: HidOptions) -> IoReturn;

    fn close(&mut self, options: HidOptions) -> IoReturn;

    /// Devices currently matched
    fn devices(&self) -> Vec<HidDeviceRef>;
}

/// Source of native managers
pub trait HidBackend {
    /// Allocate a manager; `None` when the native allocator fails
    fn create_manager(&self, options: HidOptions) -> Option<Box<dyn NativeManager>>;
}

/// Matching state shared between a manager and its run-loop source
pub(crate) struct ManagerCore {
    id: ManagerId,
    state: Mutex<CoreState>,
}

#[derive(Default)]
struct CoreState {
    matching: Matching,
    on_match: Option<DeviceCallback>,
    on_remove: Option<DeviceCallback>,
    opened: bool,
    /// Devices reported to the matching callback and not yet removed
    present: Vec<HidDeviceRef>,
}

impl ManagerCore {
    pub(crate) fn new(id: ManagerId) -> Self {
        Self {
            id,
            state: Mutex::new(CoreState::default()),
        }
    }

    pub(crate) fn id(&self) -> ManagerId {
        self.id
    }

    /// Replace the criteria; already-reported devices that no longer match are
    /// forgotten without a removal callback
    pub(crate) fn set_matching(&self, matching: Matching) {
        let mut state = self.state.lock();
        state.present.retain(|d| matching.matches(&d.properties));
        state.matching = matching;
    }

    pub(crate) fn matching(&self) -> Matching {
        self.state.lock().matching.clone()
    }

    pub(crate) fn set_matching_callback(&self, callback: Option<DeviceCallback>) {
        self.state.lock().on_match = callback;
    }

    pub(crate) fn set_removal_callback(&self, callback: Option<DeviceCallback>) {
        self.state.lock().on_remove = callback;
    }

    pub(crate) fn has_callbacks(&self) -> (bool, bool) {
        let state = self.state.lock();
        (state.on_match.is_some(), state.on_remove.is_some())
    }

    pub(crate) fn set_opened(&self, opened: bool) {
        let mut state = self.state.lock();
        state.opened = opened;
        if !opened {
            state.present.clear();
        }
    }

    pub(crate) fn is_opened(&self) -> bool {
        self.state.lock().opened
    }

    pub(crate) fn present(&self) -> Vec<HidDeviceRef> {
        self.state.lock().present.clone()
    }

    /// Report an attached device. Fires the matching callback if the manager
    /// is open, the device matches and it was not already reported.
    pub(crate) fn device_added(&self, device: &HidDeviceRef) {
        let callback = {
            let mut state = self.state.lock();
            if !state.opened
                || state.present.iter().any(|d| d.id == device.id)
                || !state.matching.matches(&device.properties)
            {
                return;
            }
            state.present.push(Arc::clone(device));
            state.on_match.clone()
        };

        debug!("Manager {:?}: device {:?} matched", self.id, device.id);
        // Invoked without the lock so the callback may call back into the manager
        if let Some(callback) = callback {
            callback(IoReturn::Success, self.id, device);
        }
    }

    /// Report a detached device. Fires the removal callback if the device had
    /// been reported as matched.
    pub(crate) fn device_removed(&self, id: DeviceId) {
        let (device, callback) = {
            let mut state = self.state.lock();
            let Some(pos) = state.present.iter().position(|d| d.id == id) else {
                return;
            };
            (state.present.remove(pos), state.on_remove.clone())
        };

        debug!("Manager {:?}: device {:?} removed", self.id, id);
        if let Some(callback) = callback {
            callback(IoReturn::Success, self.id, &device);
        }
    }
}

/// Build the [`Matching`] value for a `set_device_matching*` call
pub(crate) fn matching_from(criteria: Option<&CfRef>, multiple: bool) -> Matching {
    match (criteria, multiple) {
        (None, _) => Matching::All,
        (Some(c), false) => Matching::Single(Arc::clone(c)),
        (Some(c), true) => Matching::Multiple(Arc::clone(c)),
    }
}
