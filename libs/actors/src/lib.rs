//! Actor Runtime Core
//!
//! Actor contexts, the mailbox protocol, supervision, and request/response
//! futures for a location-transparent actor runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐ send  ┌─────────────────┐  get   ┌──────────────────┐
//! │ Context /     │──────▶│ ProcessRegistry │───────▶│ LocalProcess     │
//! │ ActorSystem   │       │ (PID → Process) │        │  └─ Mailbox      │
//! └───────────────┘       └─────────────────┘        │      └─ Context  │
//!                                 │                  ├──────────────────┤
//!                                 ├─────────────────▶│ FutureProcess    │
//!                                 ├─────────────────▶│ RemoteProcess    │
//!                                 └─────────────────▶│ DeadLetter       │
//!                                                    └──────────────────┘
//! ```
//!
//! Each mailbox is drained by at most one worker at a time, so an actor's
//! context is only ever touched by one thread. System messages (stop,
//! watch, failure, restart) always drain before user messages.
//!
//! # Examples
//!
//! ```no_run
//! use actor_core::{ActorSystem, ActorSystemConfig, Props};
//! use std::time::Duration;
//!
//! # async fn run() -> actor_core::Result<()> {
//! let system = ActorSystem::new(ActorSystemConfig::default())?;
//! let props = Props::from_fn(|ctx| {
//!     if ctx.message_as::<&str>() == Some(&"ping") {
//!         ctx.respond("pong");
//!     }
//!     Ok(())
//! });
//! let pid = system.spawn(&props).expect("spawn");
//! let reply = system
//!     .request_future(&pid, "ping", Duration::from_secs(1))
//!     .result()
//!     .await;
//! assert!(reply.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event_stream;
pub mod future;
pub mod mailbox;
pub mod messages;
pub mod middleware;
pub mod pid;
pub mod process;
pub mod props;
pub mod registry;
pub mod supervision;
pub mod system;
pub mod system_config;
pub mod transport;

pub use context::{Actor, BehaviorFn, Context};
pub use dispatcher::{Dispatcher, InlineDispatcher, TokioDispatcher, DEFAULT_THROUGHPUT};
pub use error::{ActorError, FutureError, Result, SpawnError};
pub use event_stream::{DeadLetterEvent, EventStream, Subscription, SystemEvent};
pub use future::{Future, FutureResult};
pub use mailbox::{Mailbox, MessageInvoker};
pub use messages::{
    DeadLetterResponse, Envelope, Message, MessageHeader, PoisonPill, ReceiveTimeout, Restarting,
    Started, Stopped, Stopping, SystemMessage, Terminated,
};
pub use middleware::{
    receiver_fn, sender_fn, Decorator, ReceiverFn, ReceiverMiddleware, SenderFn, SenderMiddleware,
};
pub use pid::{Pid, LOCAL_ADDRESS};
pub use process::{DeadLetterProcess, LocalProcess, Process};
pub use props::Props;
pub use registry::ProcessRegistry;
pub use supervision::{
    default_decider, AllForOneStrategy, Decider, OneForOneStrategy, RestartStatistics,
    RootSupervisor, Supervisor, SupervisorDirective, SupervisorStrategy,
};
pub use system::{ActorSystem, SystemMetrics, SystemStats};
pub use system_config::{ActorSystemConfig, SupervisionConfig};
pub use transport::{RemoteProcess, RemoteTransport, TransportMetrics};
