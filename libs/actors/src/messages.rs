//! Actor Messages
//!
//! User messages are open: any `Send + Sync + 'static` value travels as a
//! type-erased [`Message`] inside an [`Envelope`]. System messages are a
//! closed set handled out-of-band by the mailbox and the actor context.
//!
//! Lifecycle notifications (`Started`, `Stopping`, `Stopped`, `Restarting`,
//! `ReceiveTimeout`, `Terminated`) are delivered to behaviors as ordinary
//! messages so a behavior can match on them like any other payload.

use crate::context::Context;
use crate::error::{ActorError, FutureError};
use crate::pid::Pid;
use crate::supervision::RestartStatistics;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased user message
pub type Message = Arc<dyn Any + Send + Sync>;

/// String headers attached to an envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader(HashMap<String, String>);

impl MessageHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A user message plus its sender and headers
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: Message,
    pub sender: Option<Pid>,
    pub header: MessageHeader,
}

impl Envelope {
    /// Wrap a value as an envelope with no sender
    pub fn new<M: Any + Send + Sync>(message: M) -> Self {
        Self::from_message(Arc::new(message))
    }

    /// Wrap an already type-erased message
    pub fn from_message(message: Message) -> Self {
        Self {
            message,
            sender: None,
            header: MessageHeader::default(),
        }
    }

    pub fn with_sender(mut self, sender: Pid) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.set(key, value);
        self
    }

    /// Borrow the payload as a concrete type
    pub fn message_as<T: Any>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.message.is::<T>()
    }
}

/// Delivered to a behavior once after spawn and after every restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started;

/// Delivered when the actor begins stopping, before children are stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopping;

/// Delivered after all children terminated, before watchers are notified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

/// Delivered before the actor is rebuilt by its producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restarting;

/// Delivered after the configured receive timeout elapsed without traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveTimeout;

/// User message that stops the receiver once it reaches the head of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonPill;

/// Delivered to watchers (and the parent) when `who` has stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminated {
    pub who: Pid,
}

/// Reply sent to the sender of a message whose target has no live process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterResponse {
    pub target: Pid,
}

/// Callback scheduled back into an actor by `Context::await_future`
pub type ContinuationFn =
    Box<dyn FnOnce(std::result::Result<Message, FutureError>, &mut Context) -> crate::Result<()> + Send>;

/// Future result routed back into the awaiting actor's own mailbox
pub struct Continuation {
    /// Message that was being processed when the future was awaited
    pub message: Option<Envelope>,
    pub result: std::result::Result<Message, FutureError>,
    pub callback: ContinuationFn,
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("message", &self.message)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Control-plane messages, always drained before user messages
#[derive(Debug)]
pub enum SystemMessage {
    Started,
    Stop,
    Restart,
    Watch { watcher: Pid },
    Unwatch { watcher: Pid },
    Terminated { who: Pid },
    Failure {
        who: Pid,
        reason: ActorError,
        restart_stats: RestartStatistics,
    },
    /// Handled by the mailbox: stop draining user messages
    SuspendMailbox,
    /// Handled by the mailbox: resume draining user messages
    ResumeMailbox,
    ReceiveTimeout { generation: u64 },
    Continuation(Continuation),
}

impl SystemMessage {
    /// Variant name used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Stop => "Stop",
            Self::Restart => "Restart",
            Self::Watch { .. } => "Watch",
            Self::Unwatch { .. } => "Unwatch",
            Self::Terminated { .. } => "Terminated",
            Self::Failure { .. } => "Failure",
            Self::SuspendMailbox => "SuspendMailbox",
            Self::ResumeMailbox => "ResumeMailbox",
            Self::ReceiveTimeout { .. } => "ReceiveTimeout",
            Self::Continuation(_) => "Continuation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_downcast() {
        let env = Envelope::new("hello").with_sender(Pid::local("sender"));
        assert_eq!(env.message_as::<&str>(), Some(&"hello"));
        assert!(env.message_as::<String>().is_none());
        assert!(env.is::<&str>());
        assert_eq!(env.sender, Some(Pid::local("sender")));
    }

    #[test]
    fn test_envelope_headers() {
        let env = Envelope::new(1u32)
            .with_header("trace-id", "abc")
            .with_header("tenant", "t1");
        assert_eq!(env.header.get("trace-id"), Some("abc"));
        assert_eq!(env.header.len(), 2);
        assert!(env.header.get("missing").is_none());
    }

    #[test]
    fn test_system_message_kind() {
        let msg = SystemMessage::Watch {
            watcher: Pid::local("w"),
        };
        assert_eq!(msg.kind(), "Watch");
        assert_eq!(SystemMessage::Stop.kind(), "Stop");
    }
}
