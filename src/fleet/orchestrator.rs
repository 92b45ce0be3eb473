//! Session orchestrator.
//!
//! Builds the fleet descriptors, launches one task per session with
//! staggered starts, and collects the per-session summaries into a fleet
//! report. Sessions are isolated: a panic or error in one never disturbs
//! the others.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{build_descriptors, AgentDescriptor};
use crate::agent::{AgentSession, SessionCounters, SessionOutcome, SessionSummary};
use crate::browser::BrowserAutomation;
use crate::content::ContentGenerator;
use crate::oracle::DecisionOracle;
use crate::FleetConfig;

/// Aggregated result of one fleet run.
#[derive(Debug, Default)]
pub struct FleetSummary {
    pub sessions: Vec<SessionSummary>,
}

impl FleetSummary {
    pub fn totals(&self) -> SessionCounters {
        let mut totals = SessionCounters::default();
        for session in &self.sessions {
            totals.merge(&session.counters);
        }
        totals
    }

    pub fn total_actions(&self) -> u64 {
        self.sessions.iter().map(|s| s.action_count as u64).sum()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, SessionOutcome::Completed))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, SessionOutcome::Cancelled))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, SessionOutcome::Errored(_)))
    }

    fn count(&self, pred: impl Fn(&SessionOutcome) -> bool) -> usize {
        self.sessions.iter().filter(|s| pred(&s.outcome)).count()
    }
}

/// Launches and supervises the whole fleet.
pub struct SessionOrchestrator {
    config: Arc<FleetConfig>,
    oracle: Arc<dyn DecisionOracle>,
    browser: Arc<dyn BrowserAutomation>,
    writer: Arc<dyn ContentGenerator>,
}

impl SessionOrchestrator {
    pub fn new(
        config: Arc<FleetConfig>,
        oracle: Arc<dyn DecisionOracle>,
        browser: Arc<dyn BrowserAutomation>,
        writer: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            config,
            oracle,
            browser,
            writer,
        }
    }

    /// Run every session to completion (or cancellation) and aggregate the
    /// summaries. Returns once the last session task has finished.
    pub async fn run(&self, cancel: CancellationToken) -> FleetSummary {
        let mut fleet_rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let descriptors = build_descriptors(&self.config, &mut fleet_rng);
        info!(
            "Launching fleet: {} visitors, {} admins against {}",
            self.config.num_visitors, self.config.num_admins, self.config.wp_url
        );

        let mut offset = Duration::ZERO;
        let mut handles: Vec<(AgentDescriptor, JoinHandle<SessionSummary>)> =
            Vec::with_capacity(descriptors.len());

        for (i, descriptor) in descriptors.into_iter().enumerate() {
            // First agent starts immediately; every later one is offset by a
            // fresh draw on top of its predecessor's start.
            if i > 0 {
                offset += Duration::from_secs_f64(
                    fleet_rng.gen_range(self.config.stagger_min..=self.config.stagger_max),
                );
            }

            let session = AgentSession::new(
                descriptor.clone(),
                self.config.clone(),
                self.oracle.clone(),
                self.browser.clone(),
                self.writer.clone(),
                StdRng::seed_from_u64(fleet_rng.gen()),
            );
            let handle = spawn_session(descriptor.clone(), session, offset, cancel.clone());
            handles.push((descriptor, handle));
        }

        let mut summary = FleetSummary::default();
        for (descriptor, handle) in handles {
            let session = match handle.await {
                Ok(session) => session,
                Err(e) => {
                    warn!(agent = %descriptor.id, "Session task lost: {}", e);
                    SessionSummary::aborted(
                        &descriptor,
                        SessionOutcome::Errored(format!("task join failed: {e}")),
                    )
                }
            };
            summary.sessions.push(session);
        }

        let totals = summary.totals();
        info!(
            "Fleet finished: {} completed, {} cancelled, {} errored; \
             {} actions, {} comments, {} approved, {} rejected, {} replies, {} posts",
            summary.completed(),
            summary.cancelled(),
            summary.errored(),
            summary.total_actions(),
            totals.comments_made,
            totals.approved,
            totals.rejected,
            totals.replied,
            totals.posts_created,
        );
        summary
    }
}

/// Spawn one session task: wait out the stagger offset, then run the session
/// behind a panic guard so a crash surfaces as an errored summary instead of
/// taking the fleet down.
fn spawn_session(
    descriptor: AgentDescriptor,
    session: AgentSession,
    offset: Duration,
    cancel: CancellationToken,
) -> JoinHandle<SessionSummary> {
    tokio::spawn(async move {
        if !offset.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return SessionSummary::aborted(&descriptor, SessionOutcome::Cancelled);
                }
                _ = tokio::time::sleep(offset) => {}
            }
        }

        match std::panic::AssertUnwindSafe(session.run(cancel))
            .catch_unwind()
            .await
        {
            Ok(summary) => summary,
            Err(_) => {
                warn!(agent = %descriptor.id, "Session task panicked");
                SessionSummary::aborted(
                    &descriptor,
                    SessionOutcome::Errored("session task panicked".to_string()),
                )
            }
        }
    })
}
