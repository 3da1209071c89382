//! Processes
//!
//! A `Process` is what a PID resolves to: the uniform send target behind an
//! address. Local actors are backed by a mailbox, futures by a result cell,
//! remote actors by a transport, and unknown PIDs by the dead-letter process.

use crate::event_stream::{DeadLetterEvent, EventStream, SystemEvent};
use crate::mailbox::Mailbox;
use crate::messages::{DeadLetterResponse, Envelope, SystemMessage};
use crate::pid::Pid;
use crate::registry::ProcessRegistry;
use crate::system::SystemMetrics;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Send-side abstraction behind a PID
pub trait Process: Send + Sync {
    fn send_user_message(&self, pid: &Pid, envelope: Envelope);

    fn send_system_message(&self, pid: &Pid, message: SystemMessage);

    fn stop(&self, pid: &Pid) {
        self.send_system_message(pid, SystemMessage::Stop);
    }
}

/// Mailbox-backed process for actors living in this runtime
pub struct LocalProcess {
    mailbox: Arc<Mailbox>,
    dead_letter: Arc<DeadLetterProcess>,
}

impl LocalProcess {
    pub fn new(mailbox: Arc<Mailbox>, dead_letter: Arc<DeadLetterProcess>) -> Self {
        Self {
            mailbox,
            dead_letter,
        }
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }
}

impl Process for LocalProcess {
    fn send_user_message(&self, pid: &Pid, envelope: Envelope) {
        if let Err(rejected) = self.mailbox.post_user_message(envelope) {
            warn!(pid = %pid, "Mailbox full, routing message to dead letters");
            self.dead_letter.send_user_message(pid, rejected);
        }
    }

    fn send_system_message(&self, _pid: &Pid, message: SystemMessage) {
        self.mailbox.post_system_message(message);
    }
}

/// Sink for messages addressed to PIDs with no live process
pub struct DeadLetterProcess {
    registry: Weak<ProcessRegistry>,
    event_stream: Arc<EventStream>,
    metrics: Arc<SystemMetrics>,
    logging: bool,
}

impl DeadLetterProcess {
    pub fn new(
        registry: Weak<ProcessRegistry>,
        event_stream: Arc<EventStream>,
        metrics: Arc<SystemMetrics>,
        logging: bool,
    ) -> Self {
        Self {
            registry,
            event_stream,
            metrics,
            logging,
        }
    }

    fn record(&self, event: DeadLetterEvent) {
        self.metrics.dead_letters.fetch_add(1, Ordering::Relaxed);
        if self.logging {
            debug!(
                pid = %event.pid,
                sender = ?event.sender,
                system_message = ?event.system_message,
                "Dead letter"
            );
        }
        self.event_stream.publish(&SystemEvent::DeadLetter(event));
    }
}

impl Process for DeadLetterProcess {
    fn send_user_message(&self, pid: &Pid, envelope: Envelope) {
        let reply_to = envelope
            .sender
            .clone()
            .filter(|_| !envelope.is::<DeadLetterResponse>());

        self.record(DeadLetterEvent {
            pid: pid.clone(),
            message: Some(Arc::clone(&envelope.message)),
            sender: envelope.sender.clone(),
            system_message: None,
        });

        // Let a waiting requester fail fast instead of running into its timeout.
        if let (Some(sender), Some(registry)) = (reply_to, self.registry.upgrade()) {
            registry.get(&sender).send_user_message(
                &sender,
                Envelope::new(DeadLetterResponse { target: pid.clone() }),
            );
        }
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        if let SystemMessage::Watch { watcher } = &message {
            // Watching something that is already gone terminates immediately.
            if let Some(registry) = self.registry.upgrade() {
                registry
                    .get(watcher)
                    .send_system_message(watcher, SystemMessage::Terminated { who: pid.clone() });
            }
            return;
        }

        self.record(DeadLetterEvent {
            pid: pid.clone(),
            message: None,
            sender: None,
            system_message: Some(message.kind()),
        });
    }
}
