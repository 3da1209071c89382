//! Actor System Core
//!
//! The runtime root. An [`ActorSystem`] owns the process registry, the
//! default dispatcher, the event stream, configuration and metrics, and is
//! the entry point for code running outside any actor: spawning top-level
//! actors, sending to them, and making requests that resolve as futures.
//!
//! The handle is cheap to clone; every clone refers to the same runtime.

use crate::dispatcher::{Dispatcher, TokioDispatcher};
use crate::error::{ActorError, Result, SpawnError};
use crate::event_stream::EventStream;
use crate::future::Future;
use crate::messages::{Envelope, SystemMessage};
use crate::pid::Pid;
use crate::props::Props;
use crate::registry::ProcessRegistry;
use crate::supervision::SupervisorStrategy;
use crate::system_config::ActorSystemConfig;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;
use uuid::Uuid;

/// System-wide counters
#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub actors_spawned: AtomicU64,
    pub actors_stopped: AtomicU64,
    pub messages_processed: AtomicU64,
    pub total_processing_time_ns: AtomicU64,

    // Supervision
    pub actor_failures: AtomicU64,
    pub actor_restarts: AtomicU64,

    pub dead_letters: AtomicU64,
    pub futures_completed: AtomicU64,
    pub futures_timed_out: AtomicU64,
}

impl SystemMetrics {
    pub fn record_message_handled(&self, duration: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn avg_processing_time_ns(&self) -> f64 {
        let count = self.messages_processed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_processing_time_ns.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> SystemStats {
        SystemStats {
            actors_spawned: self.actors_spawned.load(Ordering::Relaxed),
            actors_stopped: self.actors_stopped.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            avg_processing_time_ns: self.avg_processing_time_ns(),
            actor_failures: self.actor_failures.load(Ordering::Relaxed),
            actor_restarts: self.actor_restarts.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            futures_completed: self.futures_completed.load(Ordering::Relaxed),
            futures_timed_out: self.futures_timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`SystemMetrics`]
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStats {
    pub actors_spawned: u64,
    pub actors_stopped: u64,
    pub messages_processed: u64,
    pub avg_processing_time_ns: f64,
    pub actor_failures: u64,
    pub actor_restarts: u64,
    pub dead_letters: u64,
    pub futures_completed: u64,
    pub futures_timed_out: u64,
}

impl SystemStats {
    /// Actors spawned and not yet stopped
    pub fn live_actors(&self) -> u64 {
        self.actors_spawned.saturating_sub(self.actors_stopped)
    }
}

struct SystemInner {
    system_id: String,
    config: ActorSystemConfig,
    registry: Arc<ProcessRegistry>,
    event_stream: Arc<EventStream>,
    metrics: Arc<SystemMetrics>,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Handle,
    /// Decides failures of top-level actors
    root_strategy: Arc<dyn SupervisorStrategy>,
    /// Used by parents whose props carry no strategy
    default_strategy: Arc<dyn SupervisorStrategy>,
}

/// Core actor system managing actor lifecycles and routing
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("system_id", &self.inner.system_id)
            .field("address", &self.inner.config.address)
            .field("processes", &self.inner.registry.len())
            .finish()
    }
}

impl ActorSystem {
    /// Create a system on the current tokio runtime
    pub fn new(config: ActorSystemConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ActorError::runtime(format!("ActorSystem::new requires a tokio runtime: {}", e)))?;
        Self::with_handle(config, handle)
    }

    /// Create a system whose actors run on `handle`
    pub fn with_handle(config: ActorSystemConfig, handle: Handle) -> Result<Self> {
        config.validate()?;

        let system_id = format!("system-{}", Uuid::new_v4());
        let event_stream = Arc::new(EventStream::new());
        let metrics = Arc::new(SystemMetrics::default());
        let registry = ProcessRegistry::new(
            config.address.clone(),
            Arc::clone(&event_stream),
            Arc::clone(&metrics),
            config.dead_letter_logging,
        );
        let dispatcher: Arc<dyn Dispatcher> =
            Arc::new(TokioDispatcher::new(handle.clone(), config.dispatcher_throughput));
        let strategy: Arc<dyn SupervisorStrategy> = Arc::new(config.supervision.one_for_one());

        info!(
            system_id = %system_id,
            address = %config.address,
            throughput = config.dispatcher_throughput,
            max_retries = config.supervision.max_retries,
            within_ms = config.supervision.within_ms,
            "Creating new actor system"
        );

        Ok(Self {
            inner: Arc::new(SystemInner {
                system_id,
                config,
                registry,
                event_stream,
                metrics,
                dispatcher,
                runtime: handle,
                root_strategy: Arc::clone(&strategy),
                default_strategy: strategy,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.system_id
    }

    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    pub fn config(&self) -> &ActorSystemConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> Arc<ProcessRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn event_stream(&self) -> Arc<EventStream> {
        Arc::clone(&self.inner.event_stream)
    }

    pub fn metrics(&self) -> Arc<SystemMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn root_strategy(&self) -> Arc<dyn SupervisorStrategy> {
        Arc::clone(&self.inner.root_strategy)
    }

    pub fn default_strategy(&self) -> Arc<dyn SupervisorStrategy> {
        Arc::clone(&self.inner.default_strategy)
    }

    /// Spawn a top-level actor with a generated id
    pub fn spawn(&self, props: &Props) -> std::result::Result<Pid, SpawnError> {
        let id = self.inner.registry.next_id();
        self.spawn_named(props, &id)
    }

    /// Spawn a top-level actor registered under `name`
    pub fn spawn_named(&self, props: &Props, name: &str) -> std::result::Result<Pid, SpawnError> {
        props.spawn(self, name, None)
    }

    /// Spawn a top-level actor with a generated id starting with `prefix`
    pub fn spawn_prefix(&self, props: &Props, prefix: &str) -> std::result::Result<Pid, SpawnError> {
        let id = format!("{}{}", prefix, self.inner.registry.next_id());
        self.spawn_named(props, &id)
    }

    /// Deliver an envelope; unknown targets become dead letters
    pub fn send(&self, target: &Pid, envelope: Envelope) {
        self.inner.registry.get(target).send_user_message(target, envelope);
    }

    pub fn tell<M: Any + Send + Sync>(&self, target: &Pid, message: M) {
        self.send(target, Envelope::new(message));
    }

    pub fn send_system(&self, target: &Pid, message: SystemMessage) {
        self.inner.registry.get(target).send_system_message(target, message);
    }

    /// Send `message` with a fresh future as sender
    pub fn request_future<M: Any + Send + Sync>(&self, target: &Pid, message: M, timeout: Duration) -> Future {
        let future = Future::new(self, timeout);
        self.send(target, Envelope::new(message).with_sender(future.pid().clone()));
        future
    }

    pub fn stop(&self, pid: &Pid) {
        self.inner.registry.get(pid).stop(pid);
    }

    /// Stop `pid`; the future resolves with `Terminated` once it has stopped
    pub fn stop_future(&self, pid: &Pid, timeout: Duration) -> Future {
        let future = Future::new(self, timeout);
        self.send_system(
            pid,
            SystemMessage::Watch {
                watcher: future.pid().clone(),
            },
        );
        self.stop(pid);
        future
    }

    /// Stop `pid` once it has drained the messages queued before this call
    pub fn poison(&self, pid: &Pid) {
        self.tell(pid, crate::messages::PoisonPill);
    }
}
