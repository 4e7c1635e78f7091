//! Host execution context
//!
//! All host callbacks run here, on whichever thread owns the context. Native
//! events arrive over an unbounded channel from the run-loop threads and are
//! dispatched either in a batch (`run_pending`) or one at a time from async
//! code (`dispatch_next`).

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::callback::{BridgeMessage, CallbackBridge, EventKind};
use crate::marshal::{describe, device_event_to_host};
use crate::registry::{HandleRegistry, HandleToken};

/// What happened to one dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The host callback was invoked
    Delivered(EventKind),
    /// The handle is gone, the registration was superseded, or nothing is
    /// registered for this kind
    Dropped(EventKind),
}

/// State shared by the context and every handle created on it
pub(crate) struct ContextShared {
    registry: RefCell<HandleRegistry>,
    tx: UnboundedSender<BridgeMessage>,
}

impl ContextShared {
    pub(crate) fn sender(&self) -> UnboundedSender<BridgeMessage> {
        self.tx.clone()
    }

    pub(crate) fn allocate(&self) -> HandleToken {
        self.registry.borrow_mut().allocate()
    }

    pub(crate) fn register(&self, token: HandleToken, bridge: &Rc<RefCell<CallbackBridge>>) {
        self.registry.borrow_mut().insert(token, bridge);
    }

    pub(crate) fn unregister(&self, token: HandleToken) {
        self.registry.borrow_mut().remove(token);
    }

    fn lookup(&self, token: HandleToken) -> Option<Rc<RefCell<CallbackBridge>>> {
        self.registry.borrow().lookup(token)
    }
}

/// Single-threaded host context
pub struct HostContext {
    shared: Rc<ContextShared>,
    rx: UnboundedReceiver<BridgeMessage>,
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Rc::new(ContextShared {
                registry: RefCell::new(HandleRegistry::default()),
                tx,
            }),
            rx,
        }
    }

    pub(crate) fn shared(&self) -> Rc<ContextShared> {
        Rc::clone(&self.shared)
    }

    /// Number of handles created on this context that are still alive
    pub fn live_handles(&self) -> usize {
        self.shared.registry.borrow().live()
    }

    /// Dispatch every event already queued without waiting.
    /// Returns how many host callbacks were invoked.
    pub fn run_pending(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    if matches!(self.dispatch(message), Dispatch::Delivered(_)) {
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }

    /// Wait for the next event and dispatch it
    pub async fn dispatch_next(&mut self) -> Option<Dispatch> {
        let message = self.rx.recv().await?;
        Some(self.dispatch(message))
    }

    fn dispatch(&self, message: BridgeMessage) -> Dispatch {
        match message {
            BridgeMessage::Device(event) => {
                let kind = event.kind;
                let Some(bridge) = self.shared.lookup(event.token) else {
                    debug!(
                        "Dropping {:?} event for released handle {}",
                        kind, event.token
                    );
                    return Dispatch::Dropped(kind);
                };
                // Clone the function out so the callback can re-enter the handle
                let callback = bridge.borrow().current(kind, event.generation);
                let Some(callback) = callback else {
                    debug!(
                        "Dropping stale {:?} event for handle {} (generation {})",
                        kind, event.token, event.generation
                    );
                    return Dispatch::Dropped(kind);
                };

                debug!(
                    "Delivering {:?} for handle {}: {}",
                    kind,
                    event.token,
                    describe(&event.device)
                );
                let payload = device_event_to_host(event.token, event.result, &event.device);
                callback.call(&[payload]);
                Dispatch::Delivered(kind)
            }
            BridgeMessage::Closed { token, result } => {
                let callback = match self.shared.lookup(token) {
                    Some(bridge) => {
                        let callback = bridge.borrow().registered(EventKind::Close);
                        callback
                    }
                    None => None,
                };
                match callback {
                    Some(callback) => {
                        debug!("Handle {} event loop exited ({:?})", token, result);
                        callback.call(&[]);
                        Dispatch::Delivered(EventKind::Close)
                    }
                    None => Dispatch::Dropped(EventKind::Close),
                }
            }
        }
    }
}
