//! Native run loop
//!
//! A run loop owns a queue of one-shot work items and a set of scheduled
//! sources. Whoever drives it (`run` / `run_in_mode`) executes queued work and
//! polls every source scheduled in the active mode, so all native callbacks
//! fire on the driving thread.
//!
//! ```text
//! [manager source] --perform()--> [callbacks]      (run-loop thread)
//! [perform_block]  --queue------> [work items]     (run-loop thread)
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Default run loop mode
pub const DEFAULT_MODE: &str = "kCFRunLoopDefaultMode";

/// How long an idle run loop sleeps before polling its sources again
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something scheduled on a run loop and polled every iteration
pub trait RunLoopSource: Send + Sync {
    /// Called on the run-loop thread once per iteration
    fn perform(&self);
}

/// Identifier returned by [`RunLoop::add_source`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// Why a run invocation returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// Nothing scheduled and no queued work
    Finished,
    /// `stop()` was requested
    Stopped,
    /// The timeout elapsed
    TimedOut,
    /// Work was handled and the caller asked to return after one pass
    HandledSource,
}

type Work = Box<dyn FnOnce() + Send>;

struct Scheduled {
    id: SourceId,
    mode: String,
    source: Arc<dyn RunLoopSource>,
}

#[derive(Default)]
struct State {
    work: VecDeque<Work>,
    sources: Vec<Scheduled>,
}

struct Inner {
    state: Mutex<State>,
    wake: Condvar,
    stop_requested: AtomicBool,
    next_source: AtomicU64,
    poll_interval: Duration,
}

/// Cloneable handle to a run loop
#[derive(Clone)]
pub struct RunLoop {
    inner: Arc<Inner>,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RunLoop")
            .field("sources", &state.sources.len())
            .field("queued", &state.work.len())
            .finish()
    }
}

impl RunLoop {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Create a run loop that polls its sources at least this often
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                wake: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                next_source: AtomicU64::new(1),
                poll_interval,
            }),
        }
    }

    /// Whether two handles refer to the same run loop
    pub fn ptr_eq(&self, other: &RunLoop) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Schedule a source in `mode`
    pub fn add_source(&self, source: Arc<dyn RunLoopSource>, mode: &str) -> SourceId {
        let id = SourceId(self.inner.next_source.fetch_add(1, Ordering::Relaxed));
        self.inner.state.lock().sources.push(Scheduled {
            id,
            mode: mode.to_owned(),
            source,
        });
        self.inner.wake.notify_all();
        id
    }

    /// Remove a previously scheduled source; unknown ids are ignored
    pub fn remove_source(&self, id: SourceId) {
        self.inner.state.lock().sources.retain(|s| s.id != id);
    }

    pub fn source_count(&self) -> usize {
        self.inner.state.lock().sources.len()
    }

    /// Queue work to run on the run-loop thread and wake it
    pub fn perform_block<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.state.lock().work.push_back(Box::new(work));
        self.inner.wake.notify_all();
    }

    /// Request the current (or next) `run` invocation to return
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        // Take the lock so a waiter between its check and its wait sees the flag
        let _state = self.inner.state.lock();
        self.inner.wake.notify_all();
    }

    /// Discard a stop request no `run` invocation has consumed
    pub fn clear_stop(&self) {
        self.inner.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Drive the loop in the default mode until stopped.
    ///
    /// Returns [`RunResult::Finished`] straight away if nothing is scheduled.
    pub fn run(&self) -> RunResult {
        debug!("Run loop started");
        loop {
            if self.take_stop() {
                debug!("Run loop stopped");
                return RunResult::Stopped;
            }
            if self.is_idle() {
                debug!("Run loop finished: no sources");
                return RunResult::Finished;
            }
            self.iterate(DEFAULT_MODE, self.inner.poll_interval);
        }
    }

    /// Drive the loop in `mode` for at most `timeout`
    pub fn run_in_mode(
        &self,
        mode: &str,
        timeout: Duration,
        return_after_source_handled: bool,
    ) -> RunResult {
        let deadline = Instant::now() + timeout;
        loop {
            if self.take_stop() {
                return RunResult::Stopped;
            }
            if self.is_idle() {
                return RunResult::Finished;
            }
            let now = Instant::now();
            if now >= deadline {
                return RunResult::TimedOut;
            }
            let wait = (deadline - now).min(self.inner.poll_interval);
            let handled = self.iterate(mode, wait);
            if handled && return_after_source_handled {
                return RunResult::HandledSource;
            }
        }
    }

    fn take_stop(&self) -> bool {
        self.inner.stop_requested.swap(false, Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.sources.is_empty() && state.work.is_empty()
    }

    /// One pass: wait for work (bounded), run queued work, poll sources.
    /// Returns whether any queued work was executed.
    fn iterate(&self, mode: &str, wait: Duration) -> bool {
        let (work, sources) = {
            let mut state = self.inner.state.lock();
            if state.work.is_empty() && !self.inner.stop_requested.load(Ordering::SeqCst) {
                self.inner.wake.wait_for(&mut state, wait);
            }
            let work: Vec<Work> = state.work.drain(..).collect();
            let sources: Vec<Arc<dyn RunLoopSource>> = state
                .sources
                .iter()
                .filter(|s| s.mode == mode)
                .map(|s| Arc::clone(&s.source))
                .collect();
            (work, sources)
        };

        // Callbacks run without the lock held so they may schedule more work
        let handled = !work.is_empty();
        for item in work {
            item();
        }
        for source in &sources {
            source.perform();
        }
        handled
    }
}
