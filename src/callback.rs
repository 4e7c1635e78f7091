//! Callback bridge
//!
//! Each handle keeps at most one host callback per [`EventKind`]. Registering
//! bumps the slot's generation and hands the native layer a trampoline tagged
//! with `(token, kind, generation)`. The trampoline runs on the run-loop
//! thread and only forwards plain data to the host context over a channel;
//! the host context decides whether the event is still current.
//!
//! ```text
//! [run-loop thread] trampoline --BridgeMessage--> [host context] --> HostFunction
//! ```

use std::sync::Arc;

use iohid_native::{DeviceCallback, HidDeviceRef, IoReturn, RunResult};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::HandleToken;
use crate::value::{HostFunction, HostValue};

/// Which host callback an event is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A device matching the criteria attached
    Matching,
    /// A previously matched device detached
    Removal,
    /// The event loop exited
    Close,
}

/// Device notification as it crosses from the run-loop thread
#[derive(Debug, Clone)]
pub(crate) struct DeviceEvent {
    pub token: HandleToken,
    pub kind: EventKind,
    pub generation: u64,
    pub result: IoReturn,
    pub device: HidDeviceRef,
}

#[derive(Debug)]
pub(crate) enum BridgeMessage {
    Device(DeviceEvent),
    /// The runner's run loop returned
    Closed {
        token: HandleToken,
        result: RunResult,
    },
}

#[derive(Debug, Default)]
struct CallbackSlot {
    callback: Option<HostFunction>,
    generation: u64,
}

impl CallbackSlot {
    /// Replace the stored callback; returns the new generation
    fn set(&mut self, callback: Option<HostFunction>) -> u64 {
        self.generation += 1;
        self.callback = callback;
        self.generation
    }

    fn current(&self, generation: u64) -> Option<HostFunction> {
        if generation == self.generation {
            self.callback.clone()
        } else {
            None
        }
    }
}

/// Host callbacks of one handle
#[derive(Debug)]
pub struct CallbackBridge {
    token: HandleToken,
    matching: CallbackSlot,
    removal: CallbackSlot,
    close: CallbackSlot,
}

impl CallbackBridge {
    pub(crate) fn new(token: HandleToken) -> Self {
        Self {
            token,
            matching: CallbackSlot::default(),
            removal: CallbackSlot::default(),
            close: CallbackSlot::default(),
        }
    }

    pub fn token(&self) -> HandleToken {
        self.token
    }

    fn slot(&self, kind: EventKind) -> &CallbackSlot {
        match kind {
            EventKind::Matching => &self.matching,
            EventKind::Removal => &self.removal,
            EventKind::Close => &self.close,
        }
    }

    fn slot_mut(&mut self, kind: EventKind) -> &mut CallbackSlot {
        match kind {
            EventKind::Matching => &mut self.matching,
            EventKind::Removal => &mut self.removal,
            EventKind::Close => &mut self.close,
        }
    }

    /// Store (or clear) the callback for `kind` and return its generation.
    /// The previous function reference is released here.
    pub(crate) fn set(&mut self, kind: EventKind, callback: Option<HostFunction>) -> u64 {
        let registered = callback.is_some();
        let generation = self.slot_mut(kind).set(callback);
        debug!(
            "Handle {}: {:?} callback {} (generation {})",
            self.token,
            kind,
            if registered { "registered" } else { "cleared" },
            generation
        );
        generation
    }

    /// Callback to invoke for an event tagged with `generation`, if still current
    pub(crate) fn current(&self, kind: EventKind, generation: u64) -> Option<HostFunction> {
        self.slot(kind).current(generation)
    }

    /// Currently stored callback regardless of generation
    pub(crate) fn registered(&self, kind: EventKind) -> Option<HostFunction> {
        self.slot(kind).callback.clone()
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slot(kind).callback.is_some()
    }

    /// Drop every stored function reference
    pub(crate) fn clear(&mut self) {
        for kind in [EventKind::Matching, EventKind::Removal, EventKind::Close] {
            self.slot_mut(kind).set(None);
        }
    }
}

/// Interpret a callback-setter argument: a function registers, `null` or
/// `undefined` unregisters, anything else is a type mismatch
pub fn callback_argument(method: &str, value: &HostValue) -> Result<Option<HostFunction>> {
    match value {
        HostValue::Function(f) => Ok(Some(f.clone())),
        HostValue::Null | HostValue::Undefined => Ok(None),
        other => Err(Error::TypeMismatch(format!(
            "{} expects a function or null, got {}",
            method,
            other.type_name()
        ))),
    }
}

/// Build the native callback for one registration
pub(crate) fn trampoline(
    token: HandleToken,
    kind: EventKind,
    generation: u64,
    tx: UnboundedSender<BridgeMessage>,
) -> DeviceCallback {
    // Each handle owns exactly one native manager, so the token already
    // identifies the sender
    Arc::new(move |result, _sender, device| {
        let event = DeviceEvent {
            token,
            kind,
            generation,
            result,
            device: Arc::clone(device),
        };
        if tx.send(BridgeMessage::Device(event)).is_err() {
            debug!("Host context gone, dropping {:?} event for {}", kind, token);
        }
    })
}
