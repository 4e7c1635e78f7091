//! Background run-loop driver

use std::thread::{self, JoinHandle};

use iohid_native::{NativeError, RunLoop};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::callback::BridgeMessage;
use crate::error::Result;
use crate::registry::HandleToken;

const THREAD_NAME: &str = "iohid-run-loop";

/// Drives a handle's run loop on a dedicated thread until stopped
pub(crate) struct EventLoopRunner {
    run_loop: RunLoop,
    thread: Option<JoinHandle<()>>,
}

impl EventLoopRunner {
    /// Spawn the run-loop thread. When `run` returns, a `Closed` message is
    /// posted to the host context.
    pub(crate) fn start(
        run_loop: RunLoop,
        token: HandleToken,
        tx: UnboundedSender<BridgeMessage>,
    ) -> Result<Self> {
        let driver = run_loop.clone();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                debug!("Run loop thread started for handle {}", token);
                let result = driver.run();
                info!("Run loop for handle {} exited: {:?}", token, result);
                if tx.send(BridgeMessage::Closed { token, result }).is_err() {
                    debug!("Host context gone before close of handle {}", token);
                }
            })
            .map_err(|e| NativeError::Internal(format!("failed to spawn {THREAD_NAME}: {e}")))?;

        Ok(Self {
            run_loop,
            thread: Some(thread),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the run loop and join the thread
    pub(crate) fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.run_loop.stop();
        if thread.join().is_err() {
            warn!("{} thread panicked", THREAD_NAME);
        }
        // run() may have returned on its own and left the request unconsumed
        self.run_loop.clear_stop();
    }
}

impl Drop for EventLoopRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
