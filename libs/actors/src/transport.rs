//! Remote Transport Seam
//!
//! The core never serializes anything itself. PIDs whose address is not the
//! local address resolve to a [`RemoteProcess`], which hands envelopes and
//! system messages to whatever [`RemoteTransport`] the application
//! registered. Framing, encoding and connection management belong to that
//! transport.

use crate::messages::{Envelope, SystemMessage};
use crate::pid::Pid;
use crate::process::Process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Cross-node delivery implemented by a remoting layer
pub trait RemoteTransport: Send + Sync {
    fn send_user_message(&self, target: &Pid, envelope: Envelope);

    fn send_system_message(&self, target: &Pid, message: SystemMessage);
}

/// Counters for traffic handed to the remote transport
#[derive(Debug, Default)]
pub struct TransportMetrics {
    pub user_sends: AtomicU64,
    pub system_sends: AtomicU64,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_sends(&self) -> u64 {
        self.user_sends.load(Ordering::Relaxed) + self.system_sends.load(Ordering::Relaxed)
    }
}

/// Process for a PID that lives behind a transport
pub struct RemoteProcess {
    transport: Arc<dyn RemoteTransport>,
    metrics: Arc<TransportMetrics>,
}

impl RemoteProcess {
    pub fn new(transport: Arc<dyn RemoteTransport>, metrics: Arc<TransportMetrics>) -> Self {
        Self { transport, metrics }
    }
}

impl Process for RemoteProcess {
    fn send_user_message(&self, pid: &Pid, envelope: Envelope) {
        trace!(pid = %pid, "Forwarding user message to remote transport");
        self.metrics.user_sends.fetch_add(1, Ordering::Relaxed);
        self.transport.send_user_message(pid, envelope);
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        trace!(pid = %pid, system_message = message.kind(), "Forwarding system message to remote transport");
        self.metrics.system_sends.fetch_add(1, Ordering::Relaxed);
        self.transport.send_system_message(pid, message);
    }
}
