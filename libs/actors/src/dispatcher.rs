//! Dispatchers
//!
//! A dispatcher runs mailbox drains. The mailbox guarantees at most one
//! drain per actor is scheduled at a time; the dispatcher only decides
//! where it runs and how many user messages one drain may process.

use std::fmt;
use tokio::runtime::Handle;

/// Default number of user messages processed per mailbox turn
pub const DEFAULT_THROUGHPUT: usize = 300;

/// Executes mailbox drain loops
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Run `runner` at some point on some worker; must not run it twice
    fn schedule(&self, runner: Box<dyn FnOnce() + Send>);

    /// Upper bound on user messages drained per turn
    fn throughput(&self) -> usize;
}

/// Runs drains as tasks on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
    throughput: usize,
}

impl TokioDispatcher {
    pub fn new(handle: Handle, throughput: usize) -> Self {
        Self {
            handle,
            throughput: throughput.max(1),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Dispatcher for TokioDispatcher {
    fn schedule(&self, runner: Box<dyn FnOnce() + Send>) {
        // Drains never block, so they can share the async worker pool.
        self.handle.spawn(async move { runner() });
    }

    fn throughput(&self) -> usize {
        self.throughput
    }
}

/// Runs drains immediately on the calling thread
///
/// Only suitable for tests and single-threaded tooling: a send from inside a
/// behavior drains the target's mailbox before the send returns.
#[derive(Debug, Clone)]
pub struct InlineDispatcher {
    throughput: usize,
}

impl InlineDispatcher {
    pub fn new(throughput: usize) -> Self {
        Self {
            throughput: throughput.max(1),
        }
    }
}

impl Default for InlineDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THROUGHPUT)
    }
}

impl Dispatcher for InlineDispatcher {
    fn schedule(&self, runner: Box<dyn FnOnce() + Send>) {
        runner()
    }

    fn throughput(&self) -> usize {
        self.throughput
    }
}
