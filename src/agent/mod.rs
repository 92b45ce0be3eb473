//! Agent sessions.
//!
//! A session is one agent's life: a browsing context, a bounded wall-clock
//! duration, and a decision loop that consults the oracle between actions.
//! Sessions never share mutable state; each returns a [`SessionSummary`] to
//! the orchestrator when it finishes.

pub mod decision;

mod admin;
mod visitor;

pub use admin::{AdminSession, ForcePostPolicy};
pub use visitor::VisitorSession;

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserAutomation;
use crate::content::ContentGenerator;
use crate::fleet::{AgentDescriptor, AgentRole, BrowserFamily};
use crate::oracle::DecisionOracle;
use crate::FleetConfig;

/// Per-session activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub comments_made: u64,
    pub approved: u64,
    pub rejected: u64,
    pub replied: u64,
    pub posts_created: u64,
}

impl SessionCounters {
    pub fn merge(&mut self, other: &SessionCounters) {
        self.comments_made += other.comments_made;
        self.approved += other.approved;
        self.rejected += other.rejected;
        self.replied += other.replied;
        self.posts_created += other.posts_created;
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Ran to its natural end (duration elapsed or the agent chose to leave)
    Completed,
    /// Shut down cooperatively after fleet cancellation
    Cancelled,
    /// Aborted on a fatal error; the message is for the fleet report
    Errored(String),
}

/// Final report for one session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub agent_id: String,
    pub role: AgentRole,
    pub family: BrowserFamily,
    pub action_count: u32,
    pub elapsed: Duration,
    pub counters: SessionCounters,
    pub outcome: SessionOutcome,
}

impl SessionSummary {
    /// Summary for a session that never got to run (cancelled while staggered,
    /// or its task panicked).
    pub fn aborted(descriptor: &AgentDescriptor, outcome: SessionOutcome) -> Self {
        Self {
            agent_id: descriptor.id.clone(),
            role: descriptor.role,
            family: descriptor.family,
            action_count: 0,
            elapsed: Duration::ZERO,
            counters: SessionCounters::default(),
            outcome,
        }
    }
}

/// Wall-clock budget and counters for a running session.
pub(crate) struct SessionRuntime {
    started: Instant,
    duration: Duration,
    pub action_count: u32,
    pub counters: SessionCounters,
}

impl SessionRuntime {
    pub fn begin(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
            action_count: 0,
            counters: SessionCounters::default(),
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summarize(self, descriptor: &AgentDescriptor, outcome: SessionOutcome) -> SessionSummary {
        SessionSummary {
            agent_id: descriptor.id.clone(),
            role: descriptor.role,
            family: descriptor.family,
            action_count: self.action_count,
            elapsed: self.started.elapsed(),
            counters: self.counters,
            outcome,
        }
    }
}

/// Result of one decision cycle.
pub(crate) enum CycleEnd {
    Continue,
    End,
    Cancelled,
    /// The browsing context is gone; retrying cycles is pointless.
    Fatal(String),
}

/// Race an in-flight operation against the cancellation token. Yields `None`
/// when the token fires first, abandoning the operation mid-flight so the
/// session can release its context without finishing the cycle.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    op: impl std::future::Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        value = op => Some(value),
    }
}

/// Sleep for a uniformly drawn interval, aborting early on cancellation.
/// Returns false when cancelled.
pub(crate) async fn human_pause(
    cancel: &CancellationToken,
    rng: &mut StdRng,
    min: f64,
    max: f64,
) -> bool {
    let secs = rng.gen_range(min..=max);
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => true,
    }
}

/// One fleet member's session, dispatched by role.
pub enum AgentSession {
    Visitor(VisitorSession),
    Administrator(AdminSession),
}

impl AgentSession {
    pub fn new(
        descriptor: AgentDescriptor,
        config: Arc<FleetConfig>,
        oracle: Arc<dyn DecisionOracle>,
        browser: Arc<dyn BrowserAutomation>,
        writer: Arc<dyn ContentGenerator>,
        rng: StdRng,
    ) -> Self {
        match descriptor.role {
            AgentRole::Visitor => AgentSession::Visitor(VisitorSession::new(
                descriptor, config, oracle, browser, writer, rng,
            )),
            AgentRole::Administrator => AgentSession::Administrator(AdminSession::new(
                descriptor, config, oracle, browser, writer, rng,
            )),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> SessionSummary {
        match self {
            AgentSession::Visitor(session) => session.run(cancel).await,
            AgentSession::Administrator(session) => session.run(cancel).await,
        }
    }
}
