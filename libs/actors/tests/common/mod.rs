//! Shared helpers for the integration tests
#![allow(dead_code)]

use actor_core::{ActorSystem, ActorSystemConfig};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn system() -> ActorSystem {
    ActorSystem::new(ActorSystemConfig::default()).unwrap()
}

pub fn probe<T>() -> (UnboundedSender<T>, UnboundedReceiver<T>) {
    mpsc::unbounded_channel()
}

/// Next event from a probe, failing the test after `WAIT`
pub async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("probe closed")
}

/// Collect events until `done` returns true for the collected list
pub async fn collect_until<T, F>(rx: &mut UnboundedReceiver<T>, mut done: F) -> Vec<T>
where
    F: FnMut(&[T]) -> bool,
{
    let mut events = Vec::new();
    while !done(&events) {
        events.push(next(rx).await);
    }
    events
}

/// Assert nothing else arrives for a short while
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

/// Poll `condition` until it holds, failing the test after `WAIT`
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
