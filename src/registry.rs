//! Handle registry
//!
//! Native trampolines never point at a handle. They carry a [`HandleToken`],
//! which the host context resolves here. The registry only holds weak
//! references, so a dropped handle simply stops resolving.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::callback::CallbackBridge;

/// Identifies one manager handle within a host context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleToken(pub u64);

impl fmt::Display for HandleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
pub(crate) struct HandleRegistry {
    next_token: u64,
    handles: HashMap<HandleToken, Weak<RefCell<CallbackBridge>>>,
}

impl HandleRegistry {
    /// Reserve a token for a handle that is about to be built
    pub(crate) fn allocate(&mut self) -> HandleToken {
        self.next_token += 1;
        HandleToken(self.next_token)
    }

    pub(crate) fn insert(&mut self, token: HandleToken, bridge: &Rc<RefCell<CallbackBridge>>) {
        self.handles.insert(token, Rc::downgrade(bridge));
    }

    pub(crate) fn remove(&mut self, token: HandleToken) {
        self.handles.remove(&token);
    }

    pub(crate) fn lookup(&self, token: HandleToken) -> Option<Rc<RefCell<CallbackBridge>>> {
        self.handles.get(&token).and_then(Weak::upgrade)
    }

    /// Handles that still resolve
    pub(crate) fn live(&self) -> usize {
        self.handles.values().filter(|w| w.strong_count() > 0).count()
    }
}
