//! Fault handling: restarts, resume, escalation and panic containment

mod common;

use actor_core::{
    default_decider, Actor, ActorError, AllForOneStrategy, Context, FutureError, OneForOneStrategy,
    Pid, Props, Restarting, Started, Stopped, SupervisorDirective, Terminated,
};
use common::{assert_quiet, collect_until, next, probe, system};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Child that fails on "boom" and reports lifecycle and counter values
struct Flaky {
    name: &'static str,
    count: u32,
    tx: UnboundedSender<String>,
}

impl Flaky {
    fn props(name: &'static str, tx: UnboundedSender<String>) -> Props {
        Props::from_producer(move || Flaky {
            name,
            count: 0,
            tx: tx.clone(),
        })
    }

    fn report(&self, event: impl std::fmt::Display) {
        let _ = self.tx.send(format!("{}:{}", self.name, event));
    }
}

impl Actor for Flaky {
    fn receive(&mut self, ctx: &mut Context) -> actor_core::Result<()> {
        if ctx.message_as::<Started>().is_some() {
            self.report("Started");
        } else if ctx.message_as::<Restarting>().is_some() {
            self.report("Restarting");
        } else if ctx.message_as::<Stopped>().is_some() {
            self.report("Stopped");
        } else if let Some(text) = ctx.message_as::<&str>().copied() {
            match text {
                "boom" => return Err(ActorError::failed("boom")),
                "panic" => panic!("handler panicked"),
                "count" => {
                    self.count += 1;
                    self.report(format!("count={}", self.count));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Parent that spawns the given children on start and reports terminations
fn parent(children: Vec<(&'static str, Props)>, tx: UnboundedSender<String>) -> Props {
    Props::from_fn(move |ctx| {
        if ctx.message_as::<Started>().is_some() {
            let _ = tx.send("parent:Started".to_string());
            for (name, props) in &children {
                ctx.spawn_named(props, name)
                    .map_err(|e| ActorError::failed(e.to_string()))?;
            }
        } else if ctx.message_as::<Restarting>().is_some() {
            let _ = tx.send("parent:Restarting".to_string());
        } else if let Some(terminated) = ctx.message_as::<Terminated>() {
            let _ = tx.send(format!("parent:Terminated:{}", terminated.who.id()));
        }
        Ok(())
    })
}

fn count(events: &[String], event: &str) -> usize {
    events.iter().filter(|e| *e == event).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_for_one_stops_child_after_restart_limit() {
    let system = system();
    let (tx, mut rx) = probe();
    let strategy = OneForOneStrategy::new(2, Duration::from_secs(10), default_decider());
    let supervisor =
        parent(vec![("kid", Flaky::props("kid", tx.clone()))], tx).with_supervisor(strategy);
    let supervisor = system.spawn_named(&supervisor, "sup").unwrap();

    let started = collect_until(&mut rx, |events| events.len() == 2).await;
    assert_eq!(count(&started, "kid:Started"), 1);
    let kid = Pid::new(system.address(), "sup/kid");
    for _ in 0..3 {
        system.tell(&kid, "boom");
    }

    let events = collect_until(&mut rx, |events| {
        events.last().map(String::as_str) == Some("parent:Terminated:sup/kid")
    })
    .await;
    assert_eq!(count(&events, "kid:Restarting"), 2);
    assert_eq!(count(&events, "kid:Started"), 2);
    assert_eq!(count(&events, "kid:Stopped"), 1);
    assert!(system.registry().contains(&supervisor));
    assert!(!system.registry().contains(&kid));

    let stats = system.metrics().snapshot();
    assert_eq!(stats.actor_failures, 3);
    assert_eq!(stats.actor_restarts, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resume_keeps_actor_state() {
    let system = system();
    let (tx, mut rx) = probe();
    let strategy = OneForOneStrategy::new(
        10,
        Duration::from_secs(10),
        Arc::new(|_, _| SupervisorDirective::Resume),
    );
    let supervisor =
        parent(vec![("kid", Flaky::props("kid", tx.clone()))], tx).with_supervisor(strategy);
    system.spawn_named(&supervisor, "sup").unwrap();
    collect_until(&mut rx, |events| events.len() == 2).await;

    let kid = Pid::new(system.address(), "sup/kid");
    system.tell(&kid, "count");
    system.tell(&kid, "boom");
    system.tell(&kid, "count");

    assert_eq!(next(&mut rx).await, "kid:count=1");
    assert_eq!(next(&mut rx).await, "kid:count=2");
    assert_quiet(&mut rx).await;
    assert_eq!(system.metrics().snapshot().actor_restarts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_replaces_actor_state() {
    let system = system();
    let (tx, mut rx) = probe();
    let supervisor = parent(vec![("kid", Flaky::props("kid", tx.clone()))], tx);
    system.spawn_named(&supervisor, "sup").unwrap();
    collect_until(&mut rx, |events| events.len() == 2).await;

    let kid = Pid::new(system.address(), "sup/kid");
    system.tell(&kid, "count");
    system.tell(&kid, "count");
    system.tell(&kid, "boom");
    system.tell(&kid, "count");

    let events = collect_until(&mut rx, |events| events.len() == 5).await;
    assert_eq!(
        events,
        vec!["kid:count=1", "kid:count=2", "kid:Restarting", "kid:Started", "kid:count=1"]
    );
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_escalation_restarts_top_level_parent() {
    let system = system();
    let (tx, mut rx) = probe();
    let strategy = OneForOneStrategy::new(
        10,
        Duration::from_secs(10),
        Arc::new(|_, _| SupervisorDirective::Escalate),
    );
    let supervisor =
        parent(vec![("kid", Flaky::props("kid", tx.clone()))], tx).with_supervisor(strategy);
    let supervisor = system.spawn_named(&supervisor, "sup").unwrap();
    collect_until(&mut rx, |events| events.len() == 2).await;

    system.tell(&Pid::new(system.address(), "sup/kid"), "boom");

    let events = collect_until(&mut rx, |events| events.len() == 4).await;
    assert_eq!(
        events,
        vec!["parent:Restarting", "kid:Stopped", "parent:Started", "kid:Started"]
    );
    assert_quiet(&mut rx).await;
    assert!(system.registry().contains(&supervisor));
    // The failure count covers the child's error and the escalated one.
    assert_eq!(system.metrics().snapshot().actor_failures, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_for_one_restarts_siblings() {
    let system = system();
    let (tx, mut rx) = probe();
    let strategy = AllForOneStrategy::new(5, Duration::from_secs(10), default_decider());
    let children = vec![
        ("left", Flaky::props("left", tx.clone())),
        ("right", Flaky::props("right", tx.clone())),
    ];
    system.spawn_named(&parent(children, tx).with_supervisor(strategy), "pair").unwrap();
    collect_until(&mut rx, |events| events.len() == 3).await;

    system.tell(&Pid::new(system.address(), "pair/left"), "boom");

    let events = collect_until(&mut rx, |events| events.len() == 4).await;
    assert_eq!(count(&events, "left:Restarting"), 1);
    assert_eq!(count(&events, "right:Restarting"), 1);
    assert_eq!(count(&events, "left:Started"), 1);
    assert_eq!(count(&events, "right:Started"), 1);
    assert_eq!(system.metrics().snapshot().actor_restarts, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panic_in_handler_restarts_top_level_actor() {
    let system = system();
    let (tx, mut rx) = probe();
    let pid = system.spawn_named(&Flaky::props("solo", tx), "solo").unwrap();
    assert_eq!(next(&mut rx).await, "solo:Started");

    system.tell(&pid, "count");
    system.tell(&pid, "panic");
    system.tell(&pid, "count");

    let events = collect_until(&mut rx, |events| events.len() == 4).await;
    assert_eq!(
        events,
        vec!["solo:count=1", "solo:Restarting", "solo:Started", "solo:count=1"]
    );
    assert!(system.registry().contains(&pid));
    assert_eq!(system.metrics().actor_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_in_started_is_supervised() {
    let system = system();
    let (tx, mut rx) = probe();
    let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let seen = Arc::clone(&attempts);
    let props = Props::from_fn(move |ctx| {
        if ctx.message_as::<Started>().is_some() {
            let attempt = seen.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = tx.send(attempt);
            if attempt == 1 {
                return Err(ActorError::failed("first start fails"));
            }
        }
        Ok(())
    });

    system.spawn(&props).unwrap();
    assert_eq!(next(&mut rx).await, 1);
    assert_eq!(next(&mut rx).await, 2);
    assert_quiet(&mut rx).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stopping_failed_child_dead_letters_queued_requests() {
    let system = system();
    let (tx, mut rx) = probe();
    let strategy = OneForOneStrategy::new(
        10,
        Duration::from_secs(10),
        Arc::new(|_, _| SupervisorDirective::Stop),
    );
    let supervisor =
        parent(vec![("kid", Flaky::props("kid", tx.clone()))], tx).with_supervisor(strategy);
    system.spawn_named(&supervisor, "sup").unwrap();
    collect_until(&mut rx, |events| events.len() == 2).await;

    let kid = Pid::new(system.address(), "sup/kid");
    system.tell(&kid, "boom");
    let pending = system.request_future(&kid, "count", Duration::from_secs(30));

    let started = std::time::Instant::now();
    let err = pending.result().await.unwrap_err();
    assert_eq!(err, FutureError::DeadLetter { target: kid.clone() });
    assert!(started.elapsed() < Duration::from_secs(5));

    let events = collect_until(&mut rx, |events| {
        events.last().map(String::as_str) == Some("parent:Terminated:sup/kid")
    })
    .await;
    assert_eq!(count(&events, "kid:Stopped"), 1);
    assert_eq!(count(&events, "kid:count=1"), 0);
    assert!(system.metrics().snapshot().dead_letters >= 1);
}
