//! Actor Mailbox
//!
//! Dual-queue mailbox: system messages are always drained before user
//! messages, and an IDLE/RUNNING flag guarantees that at most one drain of a
//! given mailbox is in flight.
//!
//! # Scheduling handshake
//!
//! Posting a message enqueues first and then tries to flip the flag from
//! IDLE to RUNNING; only the winner schedules a drain. When a drain ends it
//! stores IDLE (`SeqCst`) and re-checks both queues, so a message enqueued
//! while the drain was finishing is never left without a scheduled run.

use crate::dispatcher::Dispatcher;
use crate::error::ActorError;
use crate::messages::{Envelope, SystemMessage};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{error, trace};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Entry points a mailbox drives; implemented by the actor context
pub trait MessageInvoker: Send {
    fn invoke_system_message(&mut self, message: SystemMessage);

    fn invoke_user_message(&mut self, envelope: Envelope);

    /// Report a fault that escaped the invoke entry points
    fn escalate_failure(&mut self, reason: ActorError, message: Option<Envelope>);
}

/// Per-actor message queues plus the single-runner guarantee
pub struct Mailbox {
    system_tx: Sender<SystemMessage>,
    system_rx: Receiver<SystemMessage>,
    user_tx: Sender<Envelope>,
    user_rx: Receiver<Envelope>,
    status: AtomicU8,
    suspended: AtomicBool,
    invoker: Mutex<Option<Box<dyn MessageInvoker>>>,
    dispatcher: OnceLock<Arc<dyn Dispatcher>>,
    capacity: Option<usize>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("system_messages", &self.system_rx.len())
            .field("user_messages", &self.user_rx.len())
            .field("running", &(self.status.load(Ordering::Relaxed) == RUNNING))
            .field("suspended", &self.suspended.load(Ordering::Relaxed))
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Mailbox {
    /// Mailbox whose user queue never rejects
    pub fn unbounded() -> Self {
        let (user_tx, user_rx) = crossbeam_channel::unbounded();
        Self::with_user_queue(user_tx, user_rx, None)
    }

    /// Mailbox whose user queue holds at most `capacity` envelopes
    ///
    /// Envelopes posted to a full queue are rejected and become dead letters.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (user_tx, user_rx) = crossbeam_channel::bounded(capacity);
        Self::with_user_queue(user_tx, user_rx, Some(capacity))
    }

    fn with_user_queue(
        user_tx: Sender<Envelope>,
        user_rx: Receiver<Envelope>,
        capacity: Option<usize>,
    ) -> Self {
        let (system_tx, system_rx) = crossbeam_channel::unbounded();
        Self {
            system_tx,
            system_rx,
            user_tx,
            user_rx,
            status: AtomicU8::new(IDLE),
            suspended: AtomicBool::new(false),
            invoker: Mutex::new(None),
            dispatcher: OnceLock::new(),
            capacity,
        }
    }

    /// Attach the invoker and dispatcher; messages posted before this are kept
    pub fn register_handlers(&self, invoker: Box<dyn MessageInvoker>, dispatcher: Arc<dyn Dispatcher>) {
        *self.invoker.lock() = Some(invoker);
        if self.dispatcher.set(dispatcher).is_err() {
            error!("Mailbox handlers registered twice; keeping the first dispatcher");
        }
    }

    /// Schedule a drain if anything was posted before handlers were attached
    pub fn start(self: &Arc<Self>) {
        if self.has_pending() {
            self.schedule();
        }
    }

    /// Enqueue a user message; a full bounded queue hands the envelope back
    pub fn post_user_message(self: &Arc<Self>, envelope: Envelope) -> Result<(), Envelope> {
        match self.user_tx.try_send(envelope) {
            Ok(()) => {
                self.schedule();
                Ok(())
            }
            Err(TrySendError::Full(envelope)) | Err(TrySendError::Disconnected(envelope)) => {
                Err(envelope)
            }
        }
    }

    pub fn post_system_message(self: &Arc<Self>, message: SystemMessage) {
        if self.system_tx.send(message).is_ok() {
            self.schedule();
        }
    }

    pub fn user_message_count(&self) -> usize {
        self.user_rx.len()
    }

    pub fn system_message_count(&self) -> usize {
        self.system_rx.len()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn has_pending(&self) -> bool {
        !self.system_rx.is_empty() || (!self.is_suspended() && !self.user_rx.is_empty())
    }

    fn schedule(self: &Arc<Self>) {
        if self
            .status
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        match self.dispatcher.get() {
            Some(dispatcher) => {
                let mailbox = Arc::clone(self);
                dispatcher.schedule(Box::new(move || mailbox.run()));
            }
            None => self.release_unstarted(),
        }
    }

    /// Give up a claim taken before handlers were attached
    ///
    /// `register_handlers` and `start` may have run while the claim was held,
    /// in which case their own scheduling attempts lost the race.
    fn release_unstarted(self: &Arc<Self>) {
        self.status.store(IDLE, Ordering::SeqCst);
        if self.dispatcher.get().is_some() && self.has_pending() {
            self.schedule();
        }
    }

    fn run(self: Arc<Self>) {
        self.process_messages();
        self.status.store(IDLE, Ordering::SeqCst);
        if self.has_pending() {
            self.schedule();
        }
    }

    fn process_messages(&self) {
        let throughput = self
            .dispatcher
            .get()
            .map(|d| d.throughput())
            .unwrap_or(crate::dispatcher::DEFAULT_THROUGHPUT);

        let mut guard = self.invoker.lock();
        let Some(invoker) = guard.as_mut() else {
            return;
        };

        let mut processed = 0usize;
        loop {
            if let Ok(message) = self.system_rx.try_recv() {
                match message {
                    SystemMessage::SuspendMailbox => {
                        trace!("Mailbox suspended");
                        self.suspended.store(true, Ordering::SeqCst);
                    }
                    SystemMessage::ResumeMailbox => {
                        trace!("Mailbox resumed");
                        self.suspended.store(false, Ordering::SeqCst);
                    }
                    message => {
                        let kind = message.kind();
                        if let Err(payload) =
                            catch_unwind(AssertUnwindSafe(|| invoker.invoke_system_message(message)))
                        {
                            let reason = ActorError::from_panic(payload);
                            error!(
                                system_message = kind,
                                error = %reason,
                                "System message handling panicked"
                            );
                            invoker.escalate_failure(reason, None);
                        }
                    }
                }
                continue;
            }

            if self.is_suspended() || processed >= throughput {
                return;
            }

            let Ok(envelope) = self.user_rx.try_recv() else {
                return;
            };
            processed += 1;
            let retained = envelope.clone();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| invoker.invoke_user_message(envelope))) {
                let reason = ActorError::from_panic(payload);
                error!(error = %reason, "User message handling panicked outside the behavior");
                invoker.escalate_failure(reason, Some(retained));
            }
        }
    }
}
