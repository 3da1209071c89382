//! Supervision
//!
//! When a child faults it suspends its own mailbox and reports `Failure` to
//! its parent. The parent's [`SupervisorStrategy`] turns the failure into a
//! [`SupervisorDirective`] and applies it through the [`Supervisor`] trait,
//! which the actor context implements. Top-level actors are supervised by
//! the [`RootSupervisor`], for which `Escalate` means `Stop`.
//!
//! Restart limits are explicit: every strategy is built with a
//! `max_retries` / `within` pair. Exceeding it inside the window turns a
//! `Restart` into a `Stop`.

use crate::error::ActorError;
use crate::messages::{Envelope, SystemMessage};
use crate::pid::Pid;
use crate::registry::ProcessRegistry;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Upper bound on remembered failure instants per actor
const MAX_TRACKED_FAILURES: usize = 1024;

/// Supervision directive for error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorDirective {
    /// Resume processing with the existing state
    Resume,
    /// Restart the actor
    Restart,
    /// Stop the actor
    Stop,
    /// Escalate to parent supervisor
    Escalate,
}

/// Decides a directive for a failed child
pub type Decider = Arc<dyn Fn(&Pid, &ActorError) -> SupervisorDirective + Send + Sync>;

/// Decider that restarts on every failure
pub fn default_decider() -> Decider {
    Arc::new(|_, _| SupervisorDirective::Restart)
}

/// Failure history of one actor, carried in its `Failure` reports
#[derive(Debug, Clone, Default)]
pub struct RestartStatistics {
    failure_times: Vec<Instant>,
}

impl RestartStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure now
    pub fn fail(&mut self) {
        self.fail_at(Instant::now());
    }

    pub fn fail_at(&mut self, at: Instant) {
        self.failure_times.push(at);
        if self.failure_times.len() > MAX_TRACKED_FAILURES {
            let excess = self.failure_times.len() - MAX_TRACKED_FAILURES;
            self.failure_times.drain(..excess);
        }
    }

    pub fn reset(&mut self) {
        self.failure_times.clear();
    }

    pub fn failure_count(&self) -> usize {
        self.failure_times.len()
    }

    /// Failures recorded inside the trailing window; a zero window counts all
    pub fn number_of_failures(&self, within: Duration) -> usize {
        self.number_of_failures_at(within, Instant::now())
    }

    pub fn number_of_failures_at(&self, within: Duration, now: Instant) -> usize {
        if within.is_zero() {
            return self.failure_times.len();
        }
        self.failure_times
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < within)
            .count()
    }
}

/// Operations a strategy may apply; implemented by actor contexts
pub trait Supervisor {
    fn children(&self) -> Vec<Pid>;

    /// Treat the failure as the supervisor's own and report it upwards
    fn escalate_failure(&mut self, reason: ActorError, message: Option<Envelope>);

    fn restart_children(&self, pids: &[Pid]);

    fn stop_children(&self, pids: &[Pid]);

    fn resume_children(&self, pids: &[Pid]);
}

/// Policy deciding what happens to a failed child
pub trait SupervisorStrategy: Send + Sync {
    fn handle_failure(
        &self,
        supervisor: &mut dyn Supervisor,
        child: &Pid,
        restart_stats: &RestartStatistics,
        reason: &ActorError,
    );
}

/// Shared restart-window bookkeeping for the built-in strategies
#[derive(Clone)]
struct RestartPolicy {
    max_retries: u32,
    within: Duration,
    decider: Decider,
}

impl RestartPolicy {
    fn should_stop(&self, stats: &RestartStatistics) -> bool {
        if self.max_retries == 0 {
            return true;
        }
        stats.number_of_failures(self.within) > self.max_retries as usize
    }

    fn decide(&self, child: &Pid, reason: &ActorError) -> SupervisorDirective {
        (self.decider)(child, reason)
    }
}

impl fmt::Debug for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartPolicy")
            .field("max_retries", &self.max_retries)
            .field("within", &self.within)
            .finish_non_exhaustive()
    }
}

/// Applies the directive to the failed child only
#[derive(Debug, Clone)]
pub struct OneForOneStrategy {
    policy: RestartPolicy,
}

impl OneForOneStrategy {
    pub fn new(max_retries: u32, within: Duration, decider: Decider) -> Self {
        Self {
            policy: RestartPolicy {
                max_retries,
                within,
                decider,
            },
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries
    }

    pub fn within(&self) -> Duration {
        self.policy.within
    }
}

impl SupervisorStrategy for OneForOneStrategy {
    fn handle_failure(
        &self,
        supervisor: &mut dyn Supervisor,
        child: &Pid,
        restart_stats: &RestartStatistics,
        reason: &ActorError,
    ) {
        let directive = self.policy.decide(child, reason);
        let targets = std::slice::from_ref(child);
        match directive {
            SupervisorDirective::Resume => supervisor.resume_children(targets),
            SupervisorDirective::Restart => {
                if self.policy.should_stop(restart_stats) {
                    log_limit_exceeded(child, &self.policy, restart_stats, reason);
                    supervisor.stop_children(targets);
                } else {
                    supervisor.restart_children(targets);
                }
            }
            SupervisorDirective::Stop => supervisor.stop_children(targets),
            SupervisorDirective::Escalate => supervisor.escalate_failure(reason.clone(), None),
        }
        log_decision("one_for_one", child, directive, reason);
    }
}

/// Applies Restart/Stop to every sibling of the failed child
#[derive(Debug, Clone)]
pub struct AllForOneStrategy {
    policy: RestartPolicy,
}

impl AllForOneStrategy {
    pub fn new(max_retries: u32, within: Duration, decider: Decider) -> Self {
        Self {
            policy: RestartPolicy {
                max_retries,
                within,
                decider,
            },
        }
    }
}

impl SupervisorStrategy for AllForOneStrategy {
    fn handle_failure(
        &self,
        supervisor: &mut dyn Supervisor,
        child: &Pid,
        restart_stats: &RestartStatistics,
        reason: &ActorError,
    ) {
        let directive = self.policy.decide(child, reason);
        match directive {
            SupervisorDirective::Resume => supervisor.resume_children(std::slice::from_ref(child)),
            SupervisorDirective::Restart => {
                let siblings = supervisor.children();
                if self.policy.should_stop(restart_stats) {
                    log_limit_exceeded(child, &self.policy, restart_stats, reason);
                    supervisor.stop_children(&siblings);
                } else {
                    supervisor.restart_children(&siblings);
                }
            }
            SupervisorDirective::Stop => {
                let siblings = supervisor.children();
                supervisor.stop_children(&siblings);
            }
            SupervisorDirective::Escalate => supervisor.escalate_failure(reason.clone(), None),
        }
        log_decision("all_for_one", child, directive, reason);
    }
}

fn log_decision(strategy: &str, child: &Pid, directive: SupervisorDirective, reason: &ActorError) {
    info!(
        child = %child,
        strategy,
        directive = ?directive,
        error = %reason,
        error_category = reason.category(),
        "Supervisor handled child failure"
    );
}

fn log_limit_exceeded(child: &Pid, policy: &RestartPolicy, stats: &RestartStatistics, reason: &ActorError) {
    error!(
        child = %child,
        failures_in_window = stats.number_of_failures(policy.within),
        max_retries = policy.max_retries,
        within_ms = policy.within.as_millis() as u64,
        error = %reason,
        "Child exceeded restart limit - stopping instead of restarting"
    );
}

/// Supervisor of top-level actors, which have no parent context
pub struct RootSupervisor<'a> {
    registry: &'a ProcessRegistry,
    child: Pid,
}

impl<'a> RootSupervisor<'a> {
    pub fn new(registry: &'a ProcessRegistry, child: Pid) -> Self {
        Self { registry, child }
    }

    fn send(&self, pid: &Pid, message: SystemMessage) {
        self.registry.get(pid).send_system_message(pid, message);
    }
}

impl Supervisor for RootSupervisor<'_> {
    fn children(&self) -> Vec<Pid> {
        vec![self.child.clone()]
    }

    fn escalate_failure(&mut self, reason: ActorError, _message: Option<Envelope>) {
        error!(
            actor = %self.child,
            error = %reason,
            "Root actor error - no parent to escalate to, stopping actor"
        );
        let child = self.child.clone();
        self.send(&child, SystemMessage::Stop);
    }

    fn restart_children(&self, pids: &[Pid]) {
        for pid in pids {
            warn!(actor = %pid, "Restarting top-level actor");
            self.send(pid, SystemMessage::Restart);
        }
    }

    fn stop_children(&self, pids: &[Pid]) {
        for pid in pids {
            self.send(pid, SystemMessage::Stop);
        }
    }

    fn resume_children(&self, pids: &[Pid]) {
        for pid in pids {
            self.send(pid, SystemMessage::ResumeMailbox);
        }
    }
}
