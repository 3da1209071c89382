//! Middleware Chains
//!
//! Inbound (receive) and outbound (send) pipelines are built once, when an
//! actor context is created, by folding an ordered list of decorators around
//! a terminal handler. The fold runs right-to-left, so the first decorator
//! in the list sees a message first.
//!
//! A decorator forwards by calling `next` exactly once. Not calling it
//! swallows the message: nothing is delivered and no error is raised.

use crate::context::Context;
use crate::messages::Envelope;
use crate::pid::Pid;
use std::sync::Arc;

/// Composed inbound handler: runs before the behavior sees the envelope
pub type ReceiverFn = Arc<dyn Fn(&mut Context, Envelope) -> crate::Result<()> + Send + Sync>;

/// Composed outbound handler: runs before an envelope is handed to its target
pub type SenderFn = Arc<dyn Fn(&Context, &Pid, Envelope) + Send + Sync>;

/// Wraps the next handler of a chain
pub trait Decorator<F>: Send + Sync {
    fn decorate(&self, next: F) -> F;
}

impl<F, D> Decorator<F> for D
where
    D: Fn(F) -> F + Send + Sync,
{
    fn decorate(&self, next: F) -> F {
        self(next)
    }
}

pub type ReceiverMiddleware = Arc<dyn Decorator<ReceiverFn>>;

pub type SenderMiddleware = Arc<dyn Decorator<SenderFn>>;

/// Fold `decorators` around `terminal`; the first decorator ends up outermost
pub fn fold_chain<F>(decorators: &[Arc<dyn Decorator<F>>], terminal: F) -> F {
    decorators
        .iter()
        .rev()
        .fold(terminal, |next, decorator| decorator.decorate(next))
}

/// Build the inbound chain, or `None` when no decorators are configured
pub fn make_receiver_chain(decorators: &[ReceiverMiddleware], terminal: ReceiverFn) -> Option<ReceiverFn> {
    if decorators.is_empty() {
        return None;
    }
    Some(fold_chain(decorators, terminal))
}

/// Build the outbound chain, or `None` when no decorators are configured
pub fn make_sender_chain(decorators: &[SenderMiddleware], terminal: SenderFn) -> Option<SenderFn> {
    if decorators.is_empty() {
        return None;
    }
    Some(fold_chain(decorators, terminal))
}

/// Helper that pins down closure argument types for an inbound handler
pub fn receiver_fn<F>(f: F) -> ReceiverFn
where
    F: Fn(&mut Context, Envelope) -> crate::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Helper that pins down closure argument types for an outbound handler
pub fn sender_fn<F>(f: F) -> SenderFn
where
    F: Fn(&Context, &Pid, Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}
