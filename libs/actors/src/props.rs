//! Spawn Configuration
//!
//! `Props` describes how to build an actor: its producer, supervisor
//! strategy, mailbox, dispatcher and middleware. Every `with_*` call returns
//! a new `Props`, leaving the receiver untouched.

use crate::context::{Actor, Context};
use crate::dispatcher::Dispatcher;
use crate::error::SpawnError;
use crate::mailbox::Mailbox;
use crate::messages::SystemMessage;
use crate::middleware::{Decorator, ReceiverFn, ReceiverMiddleware, SenderFn, SenderMiddleware};
use crate::pid::Pid;
use crate::process::LocalProcess;
use crate::supervision::SupervisorStrategy;
use crate::system::ActorSystem;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Builds a fresh actor instance; called at spawn and on every restart
pub type Producer = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Builds the mailbox for a new actor
pub type MailboxProducer = Arc<dyn Fn() -> Mailbox + Send + Sync>;

/// Replaces the default spawn procedure, e.g. with a test double
pub type Spawner =
    Arc<dyn Fn(&ActorSystem, &str, &Props, Option<&Pid>) -> Result<Pid, SpawnError> + Send + Sync>;

/// Immutable spawn configuration
#[derive(Clone)]
pub struct Props {
    producer: Producer,
    supervisor_strategy: Option<Arc<dyn SupervisorStrategy>>,
    mailbox_producer: Option<MailboxProducer>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    receiver_middleware: Vec<ReceiverMiddleware>,
    sender_middleware: Vec<SenderMiddleware>,
    spawner: Option<Spawner>,
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("has_supervisor_strategy", &self.supervisor_strategy.is_some())
            .field("has_mailbox_producer", &self.mailbox_producer.is_some())
            .field("dispatcher", &self.dispatcher)
            .field("receiver_middleware", &self.receiver_middleware.len())
            .field("sender_middleware", &self.sender_middleware.len())
            .field("has_spawner", &self.spawner.is_some())
            .finish()
    }
}

/// Actor backed by a shared receive function
struct FnActor<F> {
    receive: Arc<F>,
}

impl<F> Actor for FnActor<F>
where
    F: Fn(&mut Context) -> crate::Result<()> + Send + Sync + 'static,
{
    fn receive(&mut self, ctx: &mut Context) -> crate::Result<()> {
        (self.receive)(ctx)
    }
}

impl Props {
    /// Props whose actors are built by `producer`
    pub fn from_producer<A, F>(producer: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::from_boxed_producer(Arc::new(move || Box::new(producer()) as Box<dyn Actor>))
    }

    pub fn from_boxed_producer(producer: Producer) -> Self {
        Self {
            producer,
            supervisor_strategy: None,
            mailbox_producer: None,
            dispatcher: None,
            receiver_middleware: Vec::new(),
            sender_middleware: Vec::new(),
            spawner: None,
        }
    }

    /// Props for a stateless actor whose behavior is a plain function
    pub fn from_fn<F>(receive: F) -> Self
    where
        F: Fn(&mut Context) -> crate::Result<()> + Send + Sync + 'static,
    {
        let receive = Arc::new(receive);
        Self::from_producer(move || FnActor {
            receive: Arc::clone(&receive),
        })
    }

    /// Supervisor strategy applied to this actor's children
    pub fn with_supervisor<S>(&self, strategy: S) -> Self
    where
        S: SupervisorStrategy + 'static,
    {
        let mut props = self.clone();
        props.supervisor_strategy = Some(Arc::new(strategy));
        props
    }

    pub fn with_mailbox<F>(&self, producer: F) -> Self
    where
        F: Fn() -> Mailbox + Send + Sync + 'static,
    {
        let mut props = self.clone();
        props.mailbox_producer = Some(Arc::new(producer));
        props
    }

    pub fn with_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let mut props = self.clone();
        props.dispatcher = Some(dispatcher);
        props
    }

    /// Append an inbound decorator; decorators run in the order added
    pub fn with_receiver_middleware<D>(&self, decorator: D) -> Self
    where
        D: Decorator<ReceiverFn> + 'static,
    {
        let mut props = self.clone();
        props.receiver_middleware.push(Arc::new(decorator));
        props
    }

    /// Append an outbound decorator; decorators run in the order added
    pub fn with_sender_middleware<D>(&self, decorator: D) -> Self
    where
        D: Decorator<SenderFn> + 'static,
    {
        let mut props = self.clone();
        props.sender_middleware.push(Arc::new(decorator));
        props
    }

    pub fn with_spawner<F>(&self, spawner: F) -> Self
    where
        F: Fn(&ActorSystem, &str, &Props, Option<&Pid>) -> Result<Pid, SpawnError> + Send + Sync + 'static,
    {
        let mut props = self.clone();
        props.spawner = Some(Arc::new(spawner));
        props
    }

    pub fn produce(&self) -> Box<dyn Actor> {
        (self.producer)()
    }

    pub fn supervisor_strategy(&self) -> Option<Arc<dyn SupervisorStrategy>> {
        self.supervisor_strategy.clone()
    }

    pub fn receiver_middleware(&self) -> &[ReceiverMiddleware] {
        &self.receiver_middleware
    }

    pub fn sender_middleware(&self) -> &[SenderMiddleware] {
        &self.sender_middleware
    }

    fn produce_mailbox(&self) -> Mailbox {
        match &self.mailbox_producer {
            Some(producer) => producer(),
            None => Mailbox::unbounded(),
        }
    }

    /// Spawn an actor registered under `id`, using the spawner override if set
    pub fn spawn(&self, system: &ActorSystem, id: &str, parent: Option<&Pid>) -> Result<Pid, SpawnError> {
        match &self.spawner {
            Some(spawner) => spawner(system, id, self, parent),
            None => default_spawner(system, id, self, parent),
        }
    }
}

/// Register a mailbox-backed process, attach a fresh context and start it
pub fn default_spawner(
    system: &ActorSystem,
    id: &str,
    props: &Props,
    parent: Option<&Pid>,
) -> Result<Pid, SpawnError> {
    let registry = system.registry();
    let mailbox = Arc::new(props.produce_mailbox());
    let process = Arc::new(LocalProcess::new(Arc::clone(&mailbox), registry.dead_letter()));

    let (pid, absent) = registry.add(process, id);
    if !absent {
        return Err(SpawnError::NameExists(pid));
    }

    let context = Context::new(system.clone(), props.clone(), parent.cloned(), pid.clone());
    let dispatcher = props
        .dispatcher
        .clone()
        .unwrap_or_else(|| system.dispatcher());
    mailbox.register_handlers(Box::new(context), dispatcher);
    mailbox.post_system_message(SystemMessage::Started);
    mailbox.start();

    system.metrics().actors_spawned.fetch_add(1, Ordering::Relaxed);
    debug!(
        pid = %pid,
        parent = ?parent,
        system_id = %system.id(),
        "Actor spawned"
    );
    Ok(pid)
}
