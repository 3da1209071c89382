//! Actor Context
//!
//! One `Context` per live actor. It owns the actor instance, its behavior
//! stack, its identity and family links, and the compiled middleware
//! chains. The mailbox drives it through [`MessageInvoker`], so every method
//! here runs under the single-runner guarantee and may mutate freely.
//!
//! # Stop sequence
//!
//! `Stop` marks the context as stopping, delivers [`Stopping`], stops every
//! child and waits for their `Terminated`. Once no children remain the
//! context unregisters itself, delivers [`Stopped`], and notifies watchers
//! and the parent. A `Watch` that arrives after stopping began is answered
//! with `Terminated` right away.
//!
//! # Faults
//!
//! An `Err` returned by a behavior, or a panic inside it, suspends the
//! mailbox and reports `Failure` to the parent. Top-level actors are decided
//! by the system's root strategy instead.

use crate::error::{ActorError, Result, SpawnError};
use crate::future::{Future, FutureResult};
use crate::mailbox::MessageInvoker;
use crate::messages::{
    Continuation, Envelope, Message, MessageHeader, PoisonPill, ReceiveTimeout, Restarting,
    Started, Stopped, Stopping, SystemMessage, Terminated,
};
use crate::middleware::{
    make_receiver_chain, make_sender_chain, receiver_fn, sender_fn, ReceiverFn, SenderFn,
};
use crate::pid::Pid;
use crate::process::Process;
use crate::props::Props;
use crate::supervision::{RestartStatistics, RootSupervisor, Supervisor};
use crate::system::ActorSystem;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

/// User-supplied actor state and initial behavior
pub trait Actor: Send + 'static {
    fn receive(&mut self, ctx: &mut Context) -> Result<()>;
}

/// Behavior pushed with [`Context::set_behavior`] or [`Context::become_stacked`]
pub type BehaviorFn = Box<dyn FnMut(&mut Context) -> Result<()> + Send>;

enum Behavior {
    /// Dispatch to the actor instance's `receive`
    Actor,
    Func(BehaviorFn),
    /// Placeholder while the behavior at this slot is executing
    Running,
}

struct ReceiveTimeoutState {
    duration: Duration,
    timer: Option<AbortHandle>,
}

/// Per-actor execution context
pub struct Context {
    system: ActorSystem,
    props: Props,
    self_pid: Pid,
    parent: Option<Pid>,
    actor: Option<Box<dyn Actor>>,
    behaviors: Vec<Behavior>,
    children: HashSet<Pid>,
    watchers: HashSet<Pid>,
    watching: HashSet<Pid>,
    message: Option<Envelope>,
    inbound: Option<ReceiverFn>,
    outbound: Option<SenderFn>,
    stopping: bool,
    stopped: bool,
    restarting: bool,
    /// Own mailbox suspended after a failure, awaiting the supervisor
    suspended: bool,
    restart_stats: RestartStatistics,
    receive_timeout: Option<ReceiveTimeoutState>,
    timeout_generation: u64,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("self_pid", &self.self_pid)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("watchers", &self.watchers.len())
            .field("behaviors", &self.behaviors.len())
            .field("stopping", &self.stopping)
            .field("restarting", &self.restarting)
            .finish_non_exhaustive()
    }
}

/// Run `f`, turning a panic into an actor fault
fn guarded<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ActorError::from_panic(payload)),
    }
}

impl Context {
    pub(crate) fn new(system: ActorSystem, props: Props, parent: Option<Pid>, self_pid: Pid) -> Self {
        let inbound = make_receiver_chain(
            props.receiver_middleware(),
            receiver_fn(|ctx, envelope| ctx.deliver_to_behavior(envelope)),
        );
        let outbound = make_sender_chain(
            props.sender_middleware(),
            sender_fn(|ctx, target, envelope| ctx.system.send(target, envelope)),
        );
        let actor = props.produce();

        Self {
            system,
            props,
            self_pid,
            parent,
            actor: Some(actor),
            behaviors: vec![Behavior::Actor],
            children: HashSet::new(),
            watchers: HashSet::new(),
            watching: HashSet::new(),
            message: None,
            inbound,
            outbound,
            stopping: false,
            stopped: false,
            restarting: false,
            suspended: false,
            restart_stats: RestartStatistics::new(),
            receive_timeout: None,
            timeout_generation: 0,
        }
    }

    // ----- identity and current message -----

    pub fn self_pid(&self) -> &Pid {
        &self.self_pid
    }

    pub fn parent(&self) -> Option<&Pid> {
        self.parent.as_ref()
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Envelope currently being processed
    pub fn envelope(&self) -> Option<&Envelope> {
        self.message.as_ref()
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref().map(|envelope| &envelope.message)
    }

    /// Borrow the current message as a concrete type
    pub fn message_as<T: Any>(&self) -> Option<&T> {
        self.message.as_ref().and_then(|envelope| envelope.message_as::<T>())
    }

    pub fn sender(&self) -> Option<&Pid> {
        self.message.as_ref().and_then(|envelope| envelope.sender.as_ref())
    }

    pub fn header(&self) -> Option<&MessageHeader> {
        self.message.as_ref().map(|envelope| &envelope.header)
    }

    pub fn children(&self) -> Vec<Pid> {
        self.children.iter().cloned().collect()
    }

    pub fn watchers(&self) -> Vec<Pid> {
        self.watchers.iter().cloned().collect()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn restart_stats(&self) -> &RestartStatistics {
        &self.restart_stats
    }

    // ----- sending -----

    /// Fire-and-forget send with no sender
    pub fn tell<M: Any + Send + Sync>(&self, target: &Pid, message: M) {
        self.send_envelope(target, Envelope::new(message));
    }

    /// Send with this actor stamped as sender so the target can respond
    pub fn request<M: Any + Send + Sync>(&self, target: &Pid, message: M) {
        self.send_envelope(target, Envelope::new(message).with_sender(self.self_pid.clone()));
    }

    /// Send with a fresh future stamped as sender; returns immediately
    pub fn request_future<M: Any + Send + Sync>(&self, target: &Pid, message: M, timeout: Duration) -> Future {
        let future = Future::new(&self.system, timeout);
        self.send_envelope(target, Envelope::new(message).with_sender(future.pid().clone()));
        future
    }

    /// Send a prepared envelope through the outbound middleware chain
    pub fn send_envelope(&self, target: &Pid, envelope: Envelope) {
        match &self.outbound {
            Some(chain) => chain(self, target, envelope),
            None => self.system.send(target, envelope),
        }
    }

    /// Reply to the sender of the current message
    pub fn respond<M: Any + Send + Sync>(&self, message: M) {
        match self.sender() {
            Some(sender) => {
                let sender = sender.clone();
                self.send_envelope(&sender, Envelope::new(message));
            }
            None => {
                debug!(actor = %self.self_pid, "Respond without a sender, routing to dead letters");
                let nobody = Pid::new(self.system.address(), "deadletter");
                self.system
                    .registry()
                    .dead_letter()
                    .send_user_message(&nobody, Envelope::new(message));
            }
        }
    }

    /// Re-send the current envelope, sender and headers included, to `target`
    pub fn forward(&self, target: &Pid) {
        match &self.message {
            Some(envelope) => self.send_envelope(target, envelope.clone()),
            None => warn!(actor = %self.self_pid, target = %target, "Nothing to forward"),
        }
    }

    /// Run `continuation` inside this actor once `future` resolves
    ///
    /// The result travels back through this actor's own mailbox, so the
    /// continuation never runs concurrently with a behavior.
    pub fn await_future<F>(&self, future: &Future, continuation: F)
    where
        F: FnOnce(FutureResult, &mut Context) -> Result<()> + Send + 'static,
    {
        let system = self.system.clone();
        let target = self.self_pid.clone();
        let message = self.message.clone();
        future.continue_with(move |result| {
            system.send_system(
                &target,
                SystemMessage::Continuation(Continuation {
                    message,
                    result,
                    callback: Box::new(continuation),
                }),
            );
        });
    }

    // ----- behavior stack -----

    /// Replace the current behavior
    pub fn set_behavior<F>(&mut self, behavior: F)
    where
        F: FnMut(&mut Context) -> Result<()> + Send + 'static,
    {
        let behavior = Behavior::Func(Box::new(behavior));
        match self.behaviors.last_mut() {
            Some(top) => *top = behavior,
            None => self.behaviors.push(behavior),
        }
    }

    /// Push a behavior; `unbecome_stacked` returns to the previous one
    pub fn become_stacked<F>(&mut self, behavior: F)
    where
        F: FnMut(&mut Context) -> Result<()> + Send + 'static,
    {
        self.behaviors.push(Behavior::Func(Box::new(behavior)));
    }

    /// Pop the current behavior; the initial behavior is never popped
    pub fn unbecome_stacked(&mut self) {
        if self.behaviors.len() > 1 {
            self.behaviors.pop();
        } else {
            debug!(actor = %self.self_pid, "unbecome_stacked on the initial behavior ignored");
        }
    }

    pub fn behavior_depth(&self) -> usize {
        self.behaviors.len()
    }

    // ----- family -----

    /// Spawn a child with a generated name
    pub fn spawn(&mut self, props: &Props) -> std::result::Result<Pid, SpawnError> {
        let name = self.system.registry().next_id();
        self.spawn_named(props, &name)
    }

    /// Spawn a child registered as `<self id>/<name>`
    pub fn spawn_named(&mut self, props: &Props, name: &str) -> std::result::Result<Pid, SpawnError> {
        let id = self.self_pid.child_id(name);
        let pid = props.spawn(&self.system, &id, Some(&self.self_pid))?;
        self.children.insert(pid.clone());
        Ok(pid)
    }

    /// Spawn a child with a generated name starting with `prefix`
    pub fn spawn_prefix(&mut self, props: &Props, prefix: &str) -> std::result::Result<Pid, SpawnError> {
        let name = format!("{}{}", prefix, self.system.registry().next_id());
        self.spawn_named(props, &name)
    }

    /// Receive `Terminated` once `pid` stops
    pub fn watch(&mut self, pid: &Pid) {
        self.watching.insert(pid.clone());
        self.system.send_system(
            pid,
            SystemMessage::Watch {
                watcher: self.self_pid.clone(),
            },
        );
    }

    pub fn unwatch(&mut self, pid: &Pid) {
        self.watching.remove(pid);
        self.system.send_system(
            pid,
            SystemMessage::Unwatch {
                watcher: self.self_pid.clone(),
            },
        );
    }

    /// Ask `pid` to stop; pending user messages become dead letters
    pub fn stop(&self, pid: &Pid) {
        self.system.stop(pid);
    }

    /// Stop `pid` after it has processed the user messages queued before this one
    pub fn poison(&self, pid: &Pid) {
        self.send_envelope(pid, Envelope::new(PoisonPill));
    }

    // ----- receive timeout -----

    /// Deliver [`ReceiveTimeout`] after `duration` without user messages
    ///
    /// A zero duration cancels the timeout. The timeout fires once; set it
    /// again to re-arm.
    pub fn set_receive_timeout(&mut self, duration: Duration) {
        if duration.is_zero() {
            self.cancel_receive_timeout();
            return;
        }
        self.stop_receive_timer();
        self.receive_timeout = Some(ReceiveTimeoutState { duration, timer: None });
        self.start_receive_timer();
    }

    pub fn cancel_receive_timeout(&mut self) {
        self.stop_receive_timer();
        self.receive_timeout = None;
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout.as_ref().map(|state| state.duration)
    }

    fn stop_receive_timer(&mut self) {
        self.timeout_generation += 1;
        if let Some(timer) = self.receive_timeout.as_mut().and_then(|state| state.timer.take()) {
            timer.abort();
        }
    }

    fn start_receive_timer(&mut self) {
        let Some(duration) = self.receive_timeout() else {
            return;
        };
        self.timeout_generation += 1;
        let generation = self.timeout_generation;
        let system = self.system.clone();
        let target = self.self_pid.clone();
        let timer = self.system.runtime().spawn(async move {
            tokio::time::sleep(duration).await;
            system.send_system(&target, SystemMessage::ReceiveTimeout { generation });
        });
        if let Some(state) = self.receive_timeout.as_mut() {
            if let Some(previous) = state.timer.replace(timer.abort_handle()) {
                previous.abort();
            }
        }
    }

    // ----- dispatch -----

    fn send_system(&self, pid: &Pid, message: SystemMessage) {
        self.system.send_system(pid, message);
    }

    fn process_message(&mut self, envelope: Envelope) -> Result<()> {
        match self.inbound.clone() {
            Some(chain) => chain(self, envelope),
            None => self.deliver_to_behavior(envelope),
        }
    }

    /// Terminal step of the inbound chain
    fn deliver_to_behavior(&mut self, envelope: Envelope) -> Result<()> {
        let previous = self.message.replace(envelope);
        let result = self.invoke_behavior();
        self.message = previous;
        result
    }

    fn invoke_behavior(&mut self) -> Result<()> {
        let Some(index) = self.behaviors.len().checked_sub(1) else {
            return Ok(());
        };

        match std::mem::replace(&mut self.behaviors[index], Behavior::Running) {
            Behavior::Actor => {
                self.behaviors[index] = Behavior::Actor;
                let Some(mut actor) = self.actor.take() else {
                    return Ok(());
                };
                let result = guarded(|| actor.receive(self));
                self.actor = Some(actor);
                result
            }
            Behavior::Func(mut behavior) => {
                let result = guarded(|| behavior(self));
                // Restore unless the behavior replaced or popped itself.
                if let Some(slot) = self.behaviors.get_mut(index) {
                    if matches!(slot, Behavior::Running) {
                        *slot = Behavior::Func(behavior);
                    }
                }
                result
            }
            Behavior::Running => {
                self.behaviors[index] = Behavior::Running;
                Ok(())
            }
        }
    }

    /// Deliver a lifecycle notification through the inbound chain
    fn invoke_lifecycle<M: Any + Send + Sync>(&mut self, message: M) -> Result<()> {
        let envelope = Envelope::new(message);
        guarded(|| self.process_message(envelope))
    }

    fn report_failure(&mut self, reason: ActorError, message: Option<Envelope>) {
        self.restart_stats.fail();
        self.system.metrics().actor_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            actor = %self.self_pid,
            error = %reason,
            error_category = reason.category(),
            failures = self.restart_stats.failure_count(),
            with_message = message.is_some(),
            "Actor failed, suspending mailbox"
        );

        self.suspended = true;
        self.send_system(&self.self_pid, SystemMessage::SuspendMailbox);
        match &self.parent {
            Some(parent) => self.send_system(
                parent,
                SystemMessage::Failure {
                    who: self.self_pid.clone(),
                    reason,
                    restart_stats: self.restart_stats.clone(),
                },
            ),
            None => {
                let strategy = self.system.root_strategy();
                let registry = self.system.registry();
                let mut root = RootSupervisor::new(&registry, self.self_pid.clone());
                strategy.handle_failure(&mut root, &self.self_pid, &self.restart_stats, &reason);
            }
        }
    }

    fn handle_started(&mut self) {
        if self.stopping {
            return;
        }
        if let Err(reason) = self.invoke_lifecycle(Started) {
            self.report_failure(reason, None);
        }
    }

    fn handle_stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        self.cancel_receive_timeout();
        debug!(actor = %self.self_pid, children = self.children.len(), "Actor stopping");

        if let Err(reason) = self.invoke_lifecycle(Stopping) {
            warn!(actor = %self.self_pid, error = %reason, "Stopping handler failed");
        }
        if self.suspended {
            // Drain what queued up behind the failure into dead letters.
            self.suspended = false;
            self.send_system(&self.self_pid, SystemMessage::ResumeMailbox);
        }
        self.stop_all_children();
        self.try_restart_or_terminate();
    }

    fn handle_restart(&mut self) {
        if self.stopping || self.restarting {
            return;
        }
        self.restarting = true;
        self.cancel_receive_timeout();

        if let Err(reason) = self.invoke_lifecycle(Restarting) {
            warn!(actor = %self.self_pid, error = %reason, "Restarting handler failed");
        }
        self.stop_all_children();
        self.try_restart_or_terminate();
    }

    fn handle_watch(&mut self, watcher: Pid) {
        if self.stopping {
            self.send_system(
                &watcher,
                SystemMessage::Terminated {
                    who: self.self_pid.clone(),
                },
            );
        } else {
            self.watchers.insert(watcher);
        }
    }

    fn handle_terminated(&mut self, who: Pid) {
        let was_child = self.children.remove(&who);
        let was_watched = self.watching.remove(&who);

        if !self.stopping && !self.restarting && (was_child || was_watched) {
            if let Err(reason) = self.invoke_lifecycle(Terminated { who }) {
                self.report_failure(reason, None);
            }
        }
        self.try_restart_or_terminate();
    }

    fn handle_failure(&mut self, who: Pid, reason: ActorError, restart_stats: RestartStatistics) {
        if self.stopping {
            debug!(actor = %self.self_pid, child = %who, "Ignoring child failure while stopping");
            return;
        }
        let strategy = self
            .props
            .supervisor_strategy()
            .unwrap_or_else(|| self.system.default_strategy());
        strategy.handle_failure(self, &who, &restart_stats, &reason);
    }

    fn handle_receive_timeout(&mut self, generation: u64) {
        if self.stopping || self.receive_timeout.is_none() || generation != self.timeout_generation {
            trace!(actor = %self.self_pid, generation, "Stale receive timeout ignored");
            return;
        }
        self.cancel_receive_timeout();
        if let Err(reason) = self.invoke_lifecycle(ReceiveTimeout) {
            self.report_failure(reason, None);
        }
    }

    fn handle_continuation(&mut self, continuation: Continuation) {
        if self.stopping {
            trace!(actor = %self.self_pid, "Dropping continuation for stopping actor");
            return;
        }
        let Continuation {
            message,
            result,
            callback,
        } = continuation;

        let previous = std::mem::replace(&mut self.message, message);
        let outcome = guarded(|| callback(result, self));
        let current = std::mem::replace(&mut self.message, previous);
        if let Err(reason) = outcome {
            self.report_failure(reason, current);
        }
    }

    fn stop_all_children(&self) {
        for child in &self.children {
            self.send_system(child, SystemMessage::Stop);
        }
    }

    fn try_restart_or_terminate(&mut self) {
        if !self.children.is_empty() {
            return;
        }
        if self.stopping {
            self.finalize_stop();
        } else if self.restarting {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.restarting = false;
        self.suspended = false;
        self.actor = Some(self.props.produce());
        self.behaviors.clear();
        self.behaviors.push(Behavior::Actor);
        self.system.metrics().actor_restarts.fetch_add(1, Ordering::Relaxed);
        info!(
            actor = %self.self_pid,
            failures = self.restart_stats.failure_count(),
            "Actor restarted"
        );

        self.send_system(&self.self_pid, SystemMessage::ResumeMailbox);
        if let Err(reason) = self.invoke_lifecycle(Started) {
            self.report_failure(reason, None);
        }
    }

    fn finalize_stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.system.registry().remove(&self.self_pid);
        self.system.metrics().actors_stopped.fetch_add(1, Ordering::Relaxed);

        if let Err(reason) = self.invoke_lifecycle(Stopped) {
            warn!(actor = %self.self_pid, error = %reason, "Stopped handler failed");
        }

        let who = self.self_pid.clone();
        for watched in std::mem::take(&mut self.watching) {
            self.send_system(&watched, SystemMessage::Unwatch { watcher: who.clone() });
        }

        let watchers = std::mem::take(&mut self.watchers);
        for watcher in &watchers {
            self.send_system(watcher, SystemMessage::Terminated { who: who.clone() });
        }
        if let Some(parent) = &self.parent {
            if !watchers.contains(parent) {
                self.send_system(parent, SystemMessage::Terminated { who: who.clone() });
            }
        }

        self.actor = None;
        self.behaviors.clear();
        self.message = None;
        info!(actor = %who, watchers = watchers.len(), "Actor stopped");
    }
}

impl MessageInvoker for Context {
    fn invoke_system_message(&mut self, message: SystemMessage) {
        trace!(actor = %self.self_pid, system_message = message.kind(), "System message");
        match message {
            SystemMessage::Started => self.handle_started(),
            SystemMessage::Stop => self.handle_stop(),
            SystemMessage::Restart => self.handle_restart(),
            SystemMessage::Watch { watcher } => self.handle_watch(watcher),
            SystemMessage::Unwatch { watcher } => {
                self.watchers.remove(&watcher);
            }
            SystemMessage::Terminated { who } => self.handle_terminated(who),
            SystemMessage::Failure {
                who,
                reason,
                restart_stats,
            } => self.handle_failure(who, reason, restart_stats),
            SystemMessage::ReceiveTimeout { generation } => self.handle_receive_timeout(generation),
            SystemMessage::Continuation(continuation) => self.handle_continuation(continuation),
            // Consumed by the mailbox before reaching the context.
            SystemMessage::SuspendMailbox | SystemMessage::ResumeMailbox => {}
        }
    }

    fn invoke_user_message(&mut self, envelope: Envelope) {
        if self.stopping {
            trace!(actor = %self.self_pid, "Actor stopping, message becomes a dead letter");
            self.system
                .registry()
                .dead_letter()
                .send_user_message(&self.self_pid, envelope);
            return;
        }
        if envelope.is::<PoisonPill>() {
            debug!(actor = %self.self_pid, "PoisonPill received");
            self.handle_stop();
            return;
        }

        self.stop_receive_timer();
        let started = Instant::now();
        let retained = envelope.clone();
        let result = guarded(|| self.process_message(envelope));
        self.message = None;

        match result {
            Ok(()) => {
                self.system.metrics().record_message_handled(started.elapsed());
                if !self.stopping {
                    self.start_receive_timer();
                }
            }
            Err(reason) => self.report_failure(reason, Some(retained)),
        }
    }

    fn escalate_failure(&mut self, reason: ActorError, message: Option<Envelope>) {
        self.report_failure(reason, message);
    }
}

impl Supervisor for Context {
    fn children(&self) -> Vec<Pid> {
        Context::children(self)
    }

    fn escalate_failure(&mut self, reason: ActorError, message: Option<Envelope>) {
        warn!(actor = %self.self_pid, error = %reason, "Escalating child failure");
        self.report_failure(reason, message);
    }

    fn restart_children(&self, pids: &[Pid]) {
        for pid in pids {
            self.send_system(pid, SystemMessage::Restart);
        }
    }

    fn stop_children(&self, pids: &[Pid]) {
        for pid in pids {
            self.send_system(pid, SystemMessage::Stop);
        }
    }

    fn resume_children(&self, pids: &[Pid]) {
        for pid in pids {
            self.send_system(pid, SystemMessage::ResumeMailbox);
        }
    }
}
