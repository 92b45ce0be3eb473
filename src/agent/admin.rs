//! Administrator session state machine.
//!
//! Admins log in once, then alternate between moderating the comment queue,
//! replying to approved comments and publishing new posts. A forced-post
//! policy keeps a cold site from starving: when nothing has been published
//! yet the session leans strongly toward creating content.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decision::{decide_admin, AdminAction};
use super::{human_pause, until_cancelled, CycleEnd, SessionOutcome, SessionRuntime, SessionSummary};
use crate::browser::{
    BrowserAutomation, CommentRow, ModerationVerdict, PlatformPage, PublishOutcome,
};
use crate::content::ContentGenerator;
use crate::fleet::AgentDescriptor;
use crate::oracle::DecisionOracle;
use crate::FleetConfig;

/// When to bypass the oracle and publish a post outright.
///
/// With no posts published yet and a few warm-up actions behind it, the
/// session forces a post with `cold_start_chance`; otherwise with
/// `baseline_chance`. A forced cycle skips the oracle entirely.
#[derive(Debug, Clone, Copy)]
pub struct ForcePostPolicy {
    pub cold_start_chance: f64,
    pub baseline_chance: f64,
    pub warmup_actions: u32,
}

impl Default for ForcePostPolicy {
    fn default() -> Self {
        Self {
            cold_start_chance: 0.40,
            baseline_chance: 0.15,
            warmup_actions: 3,
        }
    }
}

impl ForcePostPolicy {
    pub fn should_force(
        &self,
        posts_created: u64,
        action_count: u32,
        rng: &mut impl Rng,
    ) -> bool {
        let chance = if posts_created == 0 && action_count >= self.warmup_actions {
            self.cold_start_chance
        } else {
            self.baseline_chance
        };
        rng.gen_bool(chance)
    }
}

/// A site administrator: moderates, replies and publishes.
pub struct AdminSession {
    descriptor: AgentDescriptor,
    config: Arc<FleetConfig>,
    oracle: Arc<dyn DecisionOracle>,
    browser: Arc<dyn BrowserAutomation>,
    writer: Arc<dyn ContentGenerator>,
    rng: StdRng,
    policy: ForcePostPolicy,
}

impl AdminSession {
    pub fn new(
        descriptor: AgentDescriptor,
        config: Arc<FleetConfig>,
        oracle: Arc<dyn DecisionOracle>,
        browser: Arc<dyn BrowserAutomation>,
        writer: Arc<dyn ContentGenerator>,
        rng: StdRng,
    ) -> Self {
        Self {
            descriptor,
            config,
            oracle,
            browser,
            writer,
            rng,
            policy: ForcePostPolicy::default(),
        }
    }

    /// Override the forced-post policy.
    pub fn with_policy(mut self, policy: ForcePostPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) -> SessionSummary {
        let secs = self
            .rng
            .gen_range(self.config.admin_session_min..=self.config.admin_session_max);
        let mut runtime = SessionRuntime::begin(Duration::from_secs_f64(secs));

        info!(
            agent = %self.descriptor.id,
            family = %self.descriptor.family,
            "Admin session starting ({:.0}s budget)",
            secs
        );

        let page = match self.browser.create_context(&self.descriptor).await {
            Ok(page) => page,
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Failed to open browsing context: {}", e);
                return runtime.summarize(&self.descriptor, SessionOutcome::Errored(e.to_string()));
            }
        };

        let login = page.login(&self.config.admin_user, &self.config.admin_password);
        let outcome = match until_cancelled(&cancel, login).await {
            None => SessionOutcome::Cancelled,
            Some(Ok(())) => self.moderate(page.as_ref(), &mut runtime, &cancel).await,
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Admin login failed: {}", e);
                SessionOutcome::Errored(e.to_string())
            }
        };

        if let Err(e) = page.close().await {
            warn!(agent = %self.descriptor.id, "Context close failed: {}", e);
        }

        let summary = runtime.summarize(&self.descriptor, outcome);
        info!(
            agent = %summary.agent_id,
            actions = summary.action_count,
            approved = summary.counters.approved,
            rejected = summary.counters.rejected,
            replied = summary.counters.replied,
            posts = summary.counters.posts_created,
            "Admin session finished: {:?}",
            summary.outcome
        );
        summary
    }

    async fn moderate(
        &mut self,
        page: &dyn PlatformPage,
        runtime: &mut SessionRuntime,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        loop {
            if cancel.is_cancelled() {
                return SessionOutcome::Cancelled;
            }
            if runtime.expired() {
                return SessionOutcome::Completed;
            }

            match self.cycle(page, runtime, cancel).await {
                CycleEnd::Continue => {}
                CycleEnd::End => return SessionOutcome::Completed,
                CycleEnd::Cancelled => return SessionOutcome::Cancelled,
                CycleEnd::Fatal(reason) => return SessionOutcome::Errored(reason),
            }

            if !human_pause(
                cancel,
                &mut self.rng,
                self.config.between_action_min,
                self.config.between_action_max,
            )
            .await
            {
                return SessionOutcome::Cancelled;
            }
        }
    }

    /// One moderation cycle. Every await races the token so a shutdown order
    /// lands before the next side effect, not after it.
    async fn cycle(
        &mut self,
        page: &dyn PlatformPage,
        runtime: &mut SessionRuntime,
        cancel: &CancellationToken,
    ) -> CycleEnd {
        // The forced-post check and the starvation fallback both bypass the
        // oracle; only a regular moderation cycle consults it.
        if self
            .policy
            .should_force(runtime.counters.posts_created, runtime.action_count, &mut self.rng)
        {
            debug!(agent = %self.descriptor.id, "Forcing a new post this cycle");
            if until_cancelled(cancel, self.create_post(page, runtime))
                .await
                .is_none()
            {
                return CycleEnd::Cancelled;
            }
            runtime.action_count += 1;
            return CycleEnd::Continue;
        }

        let pending = match until_cancelled(cancel, page.pending_comments()).await {
            None => return CycleEnd::Cancelled,
            Some(Ok(rows)) => rows,
            Some(Err(e)) if e.is_session_fatal() => return CycleEnd::Fatal(e.to_string()),
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Pending queue fetch failed: {}", e);
                return CycleEnd::Continue;
            }
        };
        let approved = match until_cancelled(cancel, page.approved_comments()).await {
            None => return CycleEnd::Cancelled,
            Some(Ok(rows)) => rows,
            Some(Err(e)) if e.is_session_fatal() => return CycleEnd::Fatal(e.to_string()),
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Approved list fetch failed: {}", e);
                return CycleEnd::Continue;
            }
        };

        if pending.is_empty() && approved.is_empty() {
            debug!(agent = %self.descriptor.id, "Nothing to moderate, publishing instead");
            if until_cancelled(cancel, self.create_post(page, runtime))
                .await
                .is_none()
            {
                return CycleEnd::Cancelled;
            }
            runtime.action_count += 1;
            return CycleEnd::Continue;
        }

        let recent = match until_cancelled(cancel, page.recent_post_titles()).await {
            None => return CycleEnd::Cancelled,
            Some(titles) => titles.unwrap_or_default(),
        };
        let situation = self.describe_situation(&pending, &approved, &recent, runtime);
        let guidance = match until_cancelled(cancel, self.oracle.consult(&situation)).await {
            None => return CycleEnd::Cancelled,
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Oracle unavailable this cycle: {}", e);
                return CycleEnd::Continue;
            }
        };

        let decision = decide_admin(&guidance, pending.len(), &mut self.rng);
        debug!(
            agent = %self.descriptor.id,
            action = ?decision.action,
            item = decision.item,
            "Admin decision"
        );

        match decision.action {
            AdminAction::Approve | AdminAction::Reject => {
                let Some(row) = (decision.item >= 1)
                    .then(|| pending.get(decision.item - 1))
                    .flatten()
                else {
                    debug!(agent = %self.descriptor.id, "No pending comment to moderate");
                    return CycleEnd::Continue;
                };
                let verdict = if decision.action == AdminAction::Approve {
                    ModerationVerdict::Approve
                } else {
                    ModerationVerdict::Spam
                };
                match until_cancelled(cancel, page.moderate_comment(&row.id, verdict)).await {
                    None => return CycleEnd::Cancelled,
                    Some(Ok(())) => {
                        match verdict {
                            ModerationVerdict::Approve => runtime.counters.approved += 1,
                            ModerationVerdict::Spam => runtime.counters.rejected += 1,
                        }
                        info!(
                            agent = %self.descriptor.id,
                            "{:?} comment by {}",
                            verdict,
                            row.author
                        );
                    }
                    Some(Err(e)) if e.is_session_fatal() => {
                        return CycleEnd::Fatal(e.to_string())
                    }
                    Some(Err(e)) => {
                        warn!(agent = %self.descriptor.id, "Moderation failed: {}", e);
                        return CycleEnd::Continue;
                    }
                }
            }
            AdminAction::Reply => {
                if approved.is_empty() {
                    debug!(agent = %self.descriptor.id, "No approved comment to reply to");
                    return CycleEnd::Continue;
                }
                let row = &approved[self.rng.gen_range(0..approved.len())];
                if until_cancelled(cancel, self.reply_to(page, row, runtime))
                    .await
                    .is_none()
                {
                    return CycleEnd::Cancelled;
                }
            }
            AdminAction::CreatePost => {
                if until_cancelled(cancel, self.create_post(page, runtime))
                    .await
                    .is_none()
                {
                    return CycleEnd::Cancelled;
                }
            }
            AdminAction::End => {
                info!(agent = %self.descriptor.id, "Admin decided to log off");
                return CycleEnd::End;
            }
        }

        runtime.action_count += 1;
        CycleEnd::Continue
    }

    async fn reply_to(&mut self, page: &dyn PlatformPage, row: &CommentRow, runtime: &mut SessionRuntime) {
        let text = match self
            .writer
            .generate_reply(&row.excerpt, &row.post_title)
            .await
        {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => return,
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Reply generation failed: {}", e);
                return;
            }
        };
        match page.reply_to_comment(&row.id, &text).await {
            Ok(()) => {
                runtime.counters.replied += 1;
                info!(agent = %self.descriptor.id, "Replied to {}", row.author);
            }
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Reply failed: {}", e);
            }
        }
    }

    /// Draft, illustrate and publish a new post. Only an explicit platform
    /// confirmation counts as success; an uncertain outcome is logged and the
    /// session moves on without retrying.
    async fn create_post(&mut self, page: &dyn PlatformPage, runtime: &mut SessionRuntime) {
        let recent = page.recent_post_titles().await.unwrap_or_default();

        let draft = match self.writer.generate_post(&recent).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Post generation failed: {}", e);
                return;
            }
        };
        let image = match self
            .writer
            .generate_image(draft.illustration, &draft.title)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Illustration generation failed: {}", e);
                return;
            }
        };

        match page.publish_post(&draft.title, &draft.body, &image).await {
            Ok(PublishOutcome::Confirmed) => {
                runtime.counters.posts_created += 1;
                info!(agent = %self.descriptor.id, "Published \"{}\"", draft.title);
            }
            Ok(PublishOutcome::Uncertain) => {
                warn!(
                    agent = %self.descriptor.id,
                    "No publish confirmation for \"{}\", not counting it",
                    draft.title
                );
            }
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Publish failed: {}", e);
            }
        }
    }

    fn describe_situation(
        &self,
        pending: &[CommentRow],
        approved: &[CommentRow],
        recent: &[String],
        runtime: &SessionRuntime,
    ) -> String {
        let pending_list = if pending.is_empty() {
            "None".to_string()
        } else {
            pending
                .iter()
                .map(|c| format!("{}. {} - \"{}\"", c.number, c.author, c.excerpt))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let approved_list = if approved.is_empty() {
            "None".to_string()
        } else {
            approved
                .iter()
                .map(|c| format!("{}. {} - \"{}\"", c.number, c.author, c.excerpt))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let recent_list = if recent.is_empty() {
            "None".to_string()
        } else {
            recent.join(", ")
        };

        format!(
            "You are a WordPress site administrator doing a moderation pass.\n\n\
             Comments awaiting moderation:\n{pending_list}\n\n\
             Recently approved comments:\n{approved_list}\n\n\
             Recent posts: {recent_list}\n\
             Actions taken this session: {actions}\n\
             Posts published this session: {posts}\n\n\
             What do you do next? Choose ONE action:\n\
             1. APPROVE - approve a pending comment\n\
             2. REJECT - mark a pending comment as spam\n\
             3. REPLY - reply to an approved comment\n\
             4. CREATE_POST - write and publish a new blog post\n\
             5. END - finish the moderation pass and log off\n\n\
             Respond with ACTION: <number>, and ITEM_NUMBER: <n> when moderating.",
            actions = runtime.action_count,
            posts = runtime.counters.posts_created,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn frequency(policy: &ForcePostPolicy, posts: u64, actions: u32) -> f64 {
        let mut rng = StdRng::seed_from_u64(99);
        let trials = 20_000;
        let hits = (0..trials)
            .filter(|_| policy.should_force(posts, actions, &mut rng))
            .count();
        hits as f64 / trials as f64
    }

    #[test]
    fn cold_start_raises_post_pressure() {
        let policy = ForcePostPolicy::default();
        let p = frequency(&policy, 0, 3);
        assert!((0.35..0.45).contains(&p), "got {p}");
    }

    #[test]
    fn baseline_pressure_once_a_post_exists() {
        let policy = ForcePostPolicy::default();
        let p = frequency(&policy, 1, 10);
        assert!((0.10..0.20).contains(&p), "got {p}");
    }

    #[test]
    fn warmup_actions_gate_the_cold_start_boost() {
        let policy = ForcePostPolicy::default();
        let p = frequency(&policy, 0, 2);
        assert!((0.10..0.20).contains(&p), "got {p}");
    }

    #[test]
    fn policy_can_be_pinned_for_tests() {
        let policy = ForcePostPolicy {
            cold_start_chance: 1.0,
            baseline_chance: 0.0,
            warmup_actions: 3,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!policy.should_force(0, 2, &mut rng));
        assert!(policy.should_force(0, 3, &mut rng));
        assert!(!policy.should_force(1, 9, &mut rng));
    }
}
