//! Device manager handle
//!
//! A [`Manager`] exclusively owns one native manager for its whole lifetime,
//! together with its callback registrations and the thread driving its run
//! loop.
//!
//! State machine: `Created -> Opened <-> Closed`. Criteria and callbacks may
//! be changed in every state.

use std::cell::RefCell;
use std::rc::Rc;

use iohid_native::{
    DeviceCallback, HidBackend, HidDeviceRef, HidOptions, ManagerId, NativeManager, RunLoop,
    DEFAULT_MODE,
};
use tracing::{debug, info, warn};

use crate::callback::{trampoline, CallbackBridge, EventKind};
use crate::context::{ContextShared, HostContext};
use crate::error::{Error, Result};
use crate::event_loop::EventLoopRunner;
use crate::marshal::{criteria_to_native, Criteria};
use crate::registry::HandleToken;
use crate::value::{HostFunction, HostValue};

/// Host-visible handle to a native HID manager
pub struct Manager {
    native: Box<dyn NativeManager>,
    token: HandleToken,
    bridge: Rc<RefCell<CallbackBridge>>,
    context: Rc<ContextShared>,
    run_loop: RunLoop,
    runner: Option<EventLoopRunner>,
    is_open: bool,
}

impl Manager {
    /// Create a manager with no device filtering installed.
    ///
    /// Fails with [`Error::ManagerCreationFailed`] when the backend cannot
    /// allocate a native manager.
    pub fn new(backend: &dyn HidBackend, context: &HostContext) -> Result<Self> {
        let native = backend
            .create_manager(HidOptions::NONE)
            .ok_or(Error::ManagerCreationFailed)?;

        let context = context.shared();
        let token = context.allocate();
        let bridge = Rc::new(RefCell::new(CallbackBridge::new(token)));
        context.register(token, &bridge);
        info!("Created HID manager {} (native {:?})", token, native.id());

        Ok(Self {
            native,
            token,
            bridge,
            context,
            run_loop: RunLoop::new(),
            runner: None,
            is_open: false,
        })
    }

    /// Token passed as `sender` in device events
    pub fn token(&self) -> HandleToken {
        self.token
    }

    pub fn native_id(&self) -> ManagerId {
        self.native.id()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Whether the run-loop thread is currently alive
    pub fn is_running(&self) -> bool {
        self.runner.as_ref().is_some_and(EventLoopRunner::is_running)
    }

    /// Replace the matching criteria.
    ///
    /// The value is converted completely before anything is installed, so a
    /// conversion error leaves the previous criteria in place.
    pub fn set_device_matching_criteria(&mut self, criteria: &HostValue) -> Result<()> {
        let criteria = criteria_to_native(criteria)?;
        match &criteria {
            Criteria::Any => self.native.set_device_matching(None),
            Criteria::Single(dict) => self.native.set_device_matching(Some(dict)),
            Criteria::Multiple(list) => self.native.set_device_matching_multiple(Some(list)),
        }
        debug!("Manager {}: installed criteria {:?}", self.token, criteria);
        Ok(())
    }

    /// Register the attach callback; `None` unregisters
    pub fn set_device_matching_callback(&mut self, callback: Option<HostFunction>) {
        if let Some(native) = self.bind(EventKind::Matching, callback) {
            self.native.register_device_matching_callback(native);
        }
    }

    /// Register the detach callback; `None` unregisters
    pub fn set_device_removal_callback(&mut self, callback: Option<HostFunction>) {
        if let Some(native) = self.bind(EventKind::Removal, callback) {
            self.native.register_device_removal_callback(native);
        }
    }

    /// Register the callback invoked once the event loop has exited
    pub fn set_close_callback(&mut self, callback: Option<HostFunction>) {
        if callback.is_none() && !self.bridge.borrow().is_registered(EventKind::Close) {
            return;
        }
        self.bridge.borrow_mut().set(EventKind::Close, callback);
    }

    /// Store `callback` and build the native registration that goes with it.
    /// Returns `None` when clearing a kind that has nothing registered.
    fn bind(
        &mut self,
        kind: EventKind,
        callback: Option<HostFunction>,
    ) -> Option<Option<DeviceCallback>> {
        if callback.is_none() && !self.bridge.borrow().is_registered(kind) {
            return None;
        }
        let register = callback.is_some();
        let generation = self.bridge.borrow_mut().set(kind, callback);
        Some(register.then(|| trampoline(self.token, kind, generation, self.context.sender())))
    }

    /// Schedule, open and start delivering events. Does nothing when already
    /// open.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open {
            debug!("Manager {} already open", self.token);
            return Ok(());
        }

        self.native.schedule_with_run_loop(&self.run_loop, DEFAULT_MODE);
        let ret = self.native.open(HidOptions::NONE);
        if !ret.is_success() {
            self.native
                .unschedule_from_run_loop(&self.run_loop, DEFAULT_MODE);
            warn!("Manager {}: open failed with {}", self.token, ret);
            return Err(Error::ManagerOpenFailed(ret));
        }

        match EventLoopRunner::start(self.run_loop.clone(), self.token, self.context.sender()) {
            Ok(runner) => self.runner = Some(runner),
            Err(e) => {
                self.native
                    .unschedule_from_run_loop(&self.run_loop, DEFAULT_MODE);
                self.native.close(HidOptions::NONE);
                return Err(e);
            }
        }

        self.is_open = true;
        info!("Manager {} opened", self.token);
        Ok(())
    }

    /// Stop delivering events: join the run-loop thread, unschedule and
    /// close. Does nothing when not open.
    pub fn close(&mut self) {
        if !self.is_open {
            return;
        }
        if let Some(mut runner) = self.runner.take() {
            runner.stop();
        }
        self.native
            .unschedule_from_run_loop(&self.run_loop, DEFAULT_MODE);
        let ret = self.native.close(HidOptions::NONE);
        if !ret.is_success() {
            warn!("Manager {}: close returned {}", self.token, ret);
        }
        self.is_open = false;
        info!("Manager {} closed", self.token);
    }

    /// Devices currently matched and attached
    pub fn devices(&self) -> Vec<HidDeviceRef> {
        self.native.devices()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.close();

        let (matching, removal) = {
            let bridge = self.bridge.borrow();
            (
                bridge.is_registered(EventKind::Matching),
                bridge.is_registered(EventKind::Removal),
            )
        };
        if matching {
            self.native.register_device_matching_callback(None);
        }
        if removal {
            self.native.register_device_removal_callback(None);
        }
        self.bridge.borrow_mut().clear();
        self.context.unregister(self.token);
        debug!("Manager {} released", self.token);
    }
}
