//! Process Registry
//!
//! The one piece of state shared by every actor context: a concurrent
//! PID → Process map owned by the actor system. Removal is immediately
//! visible to later lookups, so a late send to a stopped PID resolves to the
//! dead-letter process instead of a stale mailbox.

use crate::event_stream::EventStream;
use crate::pid::{Pid, LOCAL_ADDRESS};
use crate::process::{DeadLetterProcess, Process};
use crate::system::SystemMetrics;
use crate::transport::{RemoteProcess, RemoteTransport, TransportMetrics};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Concurrent PID → Process map
pub struct ProcessRegistry {
    address: String,
    local: DashMap<String, Arc<dyn Process>>,
    sequence: AtomicU64,
    remote: RwLock<Option<Arc<RemoteProcess>>>,
    remote_metrics: Arc<TransportMetrics>,
    dead_letter: Arc<DeadLetterProcess>,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("address", &self.address)
            .field("local_processes", &self.local.len())
            .field("has_remote_transport", &self.remote.read().is_some())
            .finish()
    }
}

impl ProcessRegistry {
    pub fn new(
        address: impl Into<String>,
        event_stream: Arc<EventStream>,
        metrics: Arc<SystemMetrics>,
        log_dead_letters: bool,
    ) -> Arc<Self> {
        let address = address.into();
        Arc::new_cyclic(|registry| Self {
            address,
            local: DashMap::new(),
            sequence: AtomicU64::new(0),
            remote: RwLock::new(None),
            remote_metrics: Arc::new(TransportMetrics::new()),
            dead_letter: Arc::new(DeadLetterProcess::new(
                registry.clone(),
                event_stream,
                metrics,
                log_dead_letters,
            )),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Allocate a fresh process id
    pub fn next_id(&self) -> String {
        format!("${}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register `process` under `id`; the flag is false when the id is taken
    pub fn add(&self, process: Arc<dyn Process>, id: &str) -> (Pid, bool) {
        let pid = Pid::new(self.address.clone(), id);
        match self.local.entry(id.to_string()) {
            Entry::Occupied(_) => (pid, false),
            Entry::Vacant(slot) => {
                tracing::trace!(pid = %pid, "Registering process");
                slot.insert(process);
                (pid, true)
            }
        }
    }

    pub fn remove(&self, pid: &Pid) -> bool {
        let removed = self.local.remove(pid.id()).is_some();
        if removed {
            tracing::trace!(pid = %pid, "Unregistered process");
        }
        removed
    }

    /// Resolve a PID; unknown PIDs resolve to the dead-letter process
    pub fn get(&self, pid: &Pid) -> Arc<dyn Process> {
        if !self.is_local(pid) {
            return match self.remote.read().as_ref() {
                Some(remote) => Arc::clone(remote) as Arc<dyn Process>,
                None => Arc::clone(&self.dead_letter) as Arc<dyn Process>,
            };
        }
        match self.local.get(pid.id()) {
            Some(process) => Arc::clone(process.value()),
            None => Arc::clone(&self.dead_letter) as Arc<dyn Process>,
        }
    }

    pub fn contains(&self, pid: &Pid) -> bool {
        self.is_local(pid) && self.local.contains_key(pid.id())
    }

    pub fn is_local(&self, pid: &Pid) -> bool {
        pid.address() == self.address || pid.address() == LOCAL_ADDRESS
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub fn dead_letter(&self) -> Arc<DeadLetterProcess> {
        Arc::clone(&self.dead_letter)
    }

    /// Route every non-local PID through `transport`
    pub fn register_remote_transport(&self, transport: Arc<dyn RemoteTransport>) {
        tracing::info!(address = %self.address, "Registering remote transport");
        *self.remote.write() = Some(Arc::new(RemoteProcess::new(
            transport,
            Arc::clone(&self.remote_metrics),
        )));
    }

    pub fn remote_metrics(&self) -> Arc<TransportMetrics> {
        Arc::clone(&self.remote_metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::SystemEvent;
    use crate::messages::{Envelope, SystemMessage};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingProcess {
        user: Mutex<Vec<Envelope>>,
        system: Mutex<Vec<String>>,
    }

    impl Process for RecordingProcess {
        fn send_user_message(&self, _pid: &Pid, envelope: Envelope) {
            self.user.lock().push(envelope);
        }

        fn send_system_message(&self, _pid: &Pid, message: SystemMessage) {
            let entry = match &message {
                SystemMessage::Terminated { who } => format!("Terminated:{}", who.id()),
                other => other.kind().to_string(),
            };
            self.system.lock().push(entry);
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        targets: Mutex<Vec<Pid>>,
    }

    impl RemoteTransport for RecordingTransport {
        fn send_user_message(&self, target: &Pid, _envelope: Envelope) {
            self.targets.lock().push(target.clone());
        }

        fn send_system_message(&self, target: &Pid, _message: SystemMessage) {
            self.targets.lock().push(target.clone());
        }
    }

    fn registry() -> (Arc<ProcessRegistry>, Arc<EventStream>, Arc<SystemMetrics>) {
        let events = Arc::new(EventStream::new());
        let metrics = Arc::new(SystemMetrics::default());
        let registry = ProcessRegistry::new("node-a", Arc::clone(&events), Arc::clone(&metrics), true);
        (registry, events, metrics)
    }

    #[test]
    fn test_add_lookup_remove() {
        let (registry, _, _) = registry();
        let process = Arc::new(RecordingProcess::default());

        let (pid, absent) = registry.add(process.clone(), "foo");
        assert!(absent);
        assert_eq!(pid, Pid::new("node-a", "foo"));
        assert!(registry.contains(&pid));
        assert_eq!(registry.len(), 1);

        let (_, absent) = registry.add(Arc::new(RecordingProcess::default()), "foo");
        assert!(!absent, "duplicate id must be rejected");

        registry.get(&pid).send_user_message(&pid, Envelope::new(1u8));
        assert_eq!(process.user.lock().len(), 1);

        assert!(registry.remove(&pid));
        assert!(!registry.remove(&pid));
        assert!(!registry.contains(&pid));
    }

    #[test]
    fn test_next_id_is_unique() {
        let (registry, _, _) = registry();
        let a = registry.next_id();
        let b = registry.next_id();
        assert_ne!(a, b);
        assert!(a.starts_with('$'));
    }

    #[test]
    fn test_unknown_pid_becomes_dead_letter() {
        let (registry, events, metrics) = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe(move |event| {
            let SystemEvent::DeadLetter(dl) = event;
            sink.lock().push(dl.pid.clone());
        });

        let ghost = Pid::new("node-a", "ghost");
        registry.get(&ghost).send_user_message(&ghost, Envelope::new("hello"));

        assert_eq!(seen.lock().as_slice(), &[ghost]);
        assert_eq!(metrics.dead_letters.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_dead_letter_answers_watch_with_terminated() {
        let (registry, _, _) = registry();
        let watcher = Arc::new(RecordingProcess::default());
        let (watcher_pid, _) = registry.add(watcher.clone(), "watcher");

        let ghost = Pid::new("node-a", "ghost");
        registry.get(&ghost).send_system_message(
            &ghost,
            SystemMessage::Watch {
                watcher: watcher_pid,
            },
        );

        assert_eq!(watcher.system.lock().as_slice(), &["Terminated:ghost".to_string()]);
    }

    #[test]
    fn test_dead_letter_replies_to_sender() {
        let (registry, _, _) = registry();
        let requester = Arc::new(RecordingProcess::default());
        let (requester_pid, _) = registry.add(requester.clone(), "requester");

        let ghost = Pid::new("node-a", "ghost");
        registry
            .get(&ghost)
            .send_user_message(&ghost, Envelope::new("ping").with_sender(requester_pid));

        let replies = requester.user.lock();
        assert_eq!(replies.len(), 1);
        let response = replies[0]
            .message_as::<crate::messages::DeadLetterResponse>()
            .unwrap();
        assert_eq!(response.target, ghost);
    }

    #[test]
    fn test_remote_pids_route_through_transport() {
        let (registry, _, metrics) = registry();
        let remote = Pid::new("node-b:8080", "worker");

        // Without a transport a remote PID is a dead letter.
        registry.get(&remote).send_user_message(&remote, Envelope::new(1u8));
        assert_eq!(metrics.dead_letters.load(Ordering::Relaxed), 1);

        let transport = Arc::new(RecordingTransport::default());
        registry.register_remote_transport(transport.clone());
        registry.get(&remote).send_user_message(&remote, Envelope::new(2u8));
        registry.get(&remote).stop(&remote);

        assert_eq!(transport.targets.lock().len(), 2);
        assert_eq!(registry.remote_metrics().total_sends(), 2);
        assert!(!registry.contains(&remote));
    }
}
