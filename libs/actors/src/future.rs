//! Futures
//!
//! A [`Future`] is a single-assignment result cell with a deadline. It is
//! registered in the process registry under a synthetic PID so a reply can
//! be addressed to it like any actor. Whichever comes first, the reply or
//! the timer, resolves it; everything after that is ignored.
//!
//! Two ways to consume the result:
//! - [`Future::wait`] blocks the calling thread. Never call it from inside a
//!   behavior: the actor would block its own mailbox.
//! - [`Context::await_future`](crate::context::Context::await_future)
//!   schedules a continuation back onto the awaiting actor's mailbox.
//!
//! [`Future::result`] is the async counterpart of `wait` for callers running
//! on a tokio runtime.

use crate::error::FutureError;
use crate::messages::{DeadLetterResponse, Envelope, Message, SystemMessage, Terminated};
use crate::pid::Pid;
use crate::process::Process;
use crate::registry::ProcessRegistry;
use crate::system::{ActorSystem, SystemMetrics};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Outcome of a future
pub type FutureResult = std::result::Result<Message, FutureError>;

type Callback = Box<dyn FnOnce(FutureResult) + Send>;

enum FutureState {
    Pending(Vec<Callback>),
    Done(FutureResult),
}

struct FutureInner {
    pid: Pid,
    timeout: Duration,
    state: Mutex<FutureState>,
    completed: Condvar,
    notify: Notify,
    timer: Mutex<Option<AbortHandle>>,
    registry: Arc<ProcessRegistry>,
    metrics: Arc<SystemMetrics>,
}

impl FutureInner {
    /// Resolve once; returns false when the future was already resolved
    fn complete(&self, result: FutureResult) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            match &mut *state {
                FutureState::Done(_) => return false,
                FutureState::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = FutureState::Done(result.clone());
                    callbacks
                }
            }
        };

        self.completed.notify_all();
        self.notify.notify_waiters();
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.registry.remove(&self.pid);

        match &result {
            Err(FutureError::Timeout { .. }) => {
                self.metrics.futures_timed_out.fetch_add(1, Ordering::Relaxed);
                debug!(pid = %self.pid, timeout_ms = self.timeout.as_millis() as u64, "Future timed out");
            }
            _ => {
                self.metrics.futures_completed.fetch_add(1, Ordering::Relaxed);
                trace!(pid = %self.pid, "Future resolved");
            }
        }

        for callback in callbacks {
            callback(result.clone());
        }
        true
    }

    fn current(&self) -> Option<FutureResult> {
        match &*self.state.lock() {
            FutureState::Done(result) => Some(result.clone()),
            FutureState::Pending(_) => None,
        }
    }
}

/// Timeout-bounded, single-assignment result of a request
#[derive(Clone)]
pub struct Future {
    inner: Arc<FutureInner>,
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("pid", &self.inner.pid)
            .field("timeout", &self.inner.timeout)
            .field("done", &self.is_done())
            .finish()
    }
}

impl Future {
    /// Register a new future with `system`; the timer starts immediately
    pub fn new(system: &ActorSystem, timeout: Duration) -> Self {
        let registry = system.registry();
        let id = format!("future{}", registry.next_id());
        let inner = Arc::new(FutureInner {
            pid: Pid::new(registry.address(), id.clone()),
            timeout,
            state: Mutex::new(FutureState::Pending(Vec::new())),
            completed: Condvar::new(),
            notify: Notify::new(),
            timer: Mutex::new(None),
            registry: Arc::clone(&registry),
            metrics: system.metrics(),
        });

        registry.add(Arc::new(FutureProcess { inner: Arc::clone(&inner) }), &id);

        let weak = Arc::downgrade(&inner);
        let timer = system.runtime().spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.complete(Err(FutureError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
        });
        *inner.timer.lock() = Some(timer.abort_handle());

        Self { inner }
    }

    /// Synthetic PID replies must be addressed to
    pub fn pid(&self) -> &Pid {
        &self.inner.pid
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn is_done(&self) -> bool {
        self.inner.current().is_some()
    }

    /// Result if already resolved
    pub fn try_result(&self) -> Option<FutureResult> {
        self.inner.current()
    }

    /// Block the calling thread until the future resolves
    pub fn wait(&self) -> FutureResult {
        let mut state = self.inner.state.lock();
        loop {
            if let FutureState::Done(result) = &*state {
                return result.clone();
            }
            self.inner.completed.wait(&mut state);
        }
    }

    /// Await resolution without blocking a runtime worker
    pub async fn result(&self) -> FutureResult {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(result) = self.inner.current() {
                return result;
            }
            notified.await;
        }
    }

    /// Run `callback` once resolved; runs immediately if already resolved
    pub fn continue_with<F>(&self, callback: F)
    where
        F: FnOnce(FutureResult) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        match &mut *state {
            FutureState::Pending(callbacks) => callbacks.push(Box::new(callback)),
            FutureState::Done(result) => {
                let result = result.clone();
                drop(state);
                callback(result);
            }
        }
    }

    /// Forward the reply (not a timeout) to `target` once resolved
    pub fn pipe_to(&self, system: &ActorSystem, target: Pid) {
        let system = system.clone();
        self.continue_with(move |result| match result {
            Ok(message) => system.send(&target, Envelope::from_message(message)),
            Err(err) => debug!(target = %target, error = %err, "Not piping failed future"),
        });
    }
}

/// Registry entry that resolves a future from the first reply
struct FutureProcess {
    inner: Arc<FutureInner>,
}

impl Process for FutureProcess {
    fn send_user_message(&self, pid: &Pid, envelope: Envelope) {
        let result = match envelope.message_as::<DeadLetterResponse>() {
            Some(response) => Err(FutureError::DeadLetter {
                target: response.target.clone(),
            }),
            None => Ok(envelope.message),
        };
        if !self.inner.complete(result) {
            trace!(pid = %pid, "Dropping reply to an already resolved future");
        }
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        match message {
            // Lets a future watch an actor, as `ActorSystem::stop_future` does.
            SystemMessage::Terminated { who } => {
                self.inner.complete(Ok(Arc::new(Terminated { who })));
            }
            other => trace!(pid = %pid, system_message = other.kind(), "Future ignores system message"),
        }
    }
}
