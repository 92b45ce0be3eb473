//! Fleet scenario tests with mocked collaborators.
//!
//! The oracle, browser and content writer are replaced with deterministic
//! doubles so whole sessions (and whole fleets) run on the paused tokio
//! clock in milliseconds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use wp_swarm::agent::{
    AdminSession, AgentSession, ForcePostPolicy, SessionOutcome, VisitorSession,
};
use wp_swarm::browser::{
    BrowserAutomation, BrowserError, CommentRow, LinkCandidate, ModerationVerdict, PageView,
    PlatformPage, PublishOutcome,
};
use wp_swarm::content::{ContentGenerator, GeneratedPost, IllustrationKind};
use wp_swarm::fleet::{AgentDescriptor, AgentRole, BrowserFamily, SessionOrchestrator};
use wp_swarm::oracle::{DecisionOracle, OracleError};
use wp_swarm::FleetConfig;

// ---------------------------------------------------------------------------
// Test doubles

struct MockOracle {
    script: Mutex<VecDeque<String>>,
    fallback: String,
    delay: Duration,
    consults: AtomicUsize,
}

impl MockOracle {
    fn scripted(lines: &[&str], fallback: &str) -> Self {
        Self {
            script: Mutex::new(lines.iter().map(|s| s.to_string()).collect()),
            fallback: fallback.to_string(),
            delay: Duration::ZERO,
            consults: AtomicUsize::new(0),
        }
    }

    fn always(fallback: &str) -> Self {
        Self::scripted(&[], fallback)
    }

    /// Make every consultation take this long, like a slow LLM backend.
    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn consult_count(&self) -> usize {
        self.consults.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DecisionOracle for MockOracle {
    async fn consult(&self, _situation: &str) -> Result<String, OracleError> {
        self.consults.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

#[derive(Default)]
struct MockSite {
    links: Vec<LinkCandidate>,
    has_comment_form: bool,
    pending: Vec<CommentRow>,
    approved: Vec<CommentRow>,
    recent: Vec<String>,
    publish_confirms: bool,
    connection_lost: bool,

    opened: AtomicUsize,
    closed: AtomicUsize,
    comments: AtomicUsize,
    moderated: AtomicUsize,
    replies: AtomicUsize,
    publishes: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

fn base_site() -> MockSite {
    MockSite {
        publish_confirms: true,
        ..Default::default()
    }
}

fn comment(number: usize, id: &str, author: &str) -> CommentRow {
    CommentRow {
        number,
        id: id.to_string(),
        author: author.to_string(),
        excerpt: "great read, thanks".to_string(),
        post_title: "Hello World".to_string(),
    }
}

fn link(number: usize, href: &str) -> LinkCandidate {
    LinkCandidate {
        number,
        text: format!("Post {number}"),
        href: href.to_string(),
    }
}

struct MockAutomation {
    site: Arc<MockSite>,
}

#[async_trait]
impl BrowserAutomation for MockAutomation {
    async fn create_context(
        &self,
        _descriptor: &AgentDescriptor,
    ) -> Result<Box<dyn PlatformPage>, BrowserError> {
        self.site.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockPage {
            site: self.site.clone(),
        }))
    }
}

struct MockPage {
    site: Arc<MockSite>,
}

#[async_trait]
impl PlatformPage for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.site.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn observe(&self) -> Result<PageView, BrowserError> {
        if self.site.connection_lost {
            return Err(BrowserError::ConnectionLost("handler ended".to_string()));
        }
        Ok(PageView {
            title: "Mock Blog".to_string(),
            url: "http://wp.test/".to_string(),
            excerpt: "Welcome to the mock blog.".to_string(),
            links: self.site.links.clone(),
            has_comment_form: self.site.has_comment_form,
        })
    }

    async fn scroll_step(&self, _pixels: u32) -> Result<bool, BrowserError> {
        Ok(false)
    }

    async fn submit_comment(
        &self,
        _author: &str,
        _email: &str,
        _text: &str,
    ) -> Result<(), BrowserError> {
        self.site.comments.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn login(&self, _user: &str, _password: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn pending_comments(&self) -> Result<Vec<CommentRow>, BrowserError> {
        if self.site.connection_lost {
            return Err(BrowserError::ConnectionLost("handler ended".to_string()));
        }
        Ok(self.site.pending.clone())
    }

    async fn approved_comments(&self) -> Result<Vec<CommentRow>, BrowserError> {
        Ok(self.site.approved.clone())
    }

    async fn recent_post_titles(&self) -> Result<Vec<String>, BrowserError> {
        Ok(self.site.recent.clone())
    }

    async fn moderate_comment(
        &self,
        _comment_id: &str,
        _verdict: ModerationVerdict,
    ) -> Result<(), BrowserError> {
        self.site.moderated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn reply_to_comment(&self, _comment_id: &str, _text: &str) -> Result<(), BrowserError> {
        self.site.replies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn publish_post(
        &self,
        _title: &str,
        _body: &str,
        _image: &[u8],
    ) -> Result<PublishOutcome, BrowserError> {
        self.site.publishes.fetch_add(1, Ordering::Relaxed);
        Ok(if self.site.publish_confirms {
            PublishOutcome::Confirmed
        } else {
            PublishOutcome::Uncertain
        })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.site.closed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct MockWriter;

#[async_trait]
impl ContentGenerator for MockWriter {
    async fn generate_comment(&self, _post_text: &str) -> Result<String, OracleError> {
        Ok("Nice post, learned something new!".to_string())
    }

    async fn generate_reply(
        &self,
        _comment_text: &str,
        _post_title: &str,
    ) -> Result<String, OracleError> {
        Ok("Thanks for reading!".to_string())
    }

    async fn generate_post(
        &self,
        _existing_topics: &[String],
    ) -> Result<GeneratedPost, OracleError> {
        Ok(GeneratedPost {
            title: "Fresh Post".to_string(),
            body: "A paragraph.\n\nAnother paragraph.".to_string(),
            illustration: IllustrationKind::Header,
        })
    }

    async fn generate_image(
        &self,
        _kind: IllustrationKind,
        _caption: &str,
    ) -> Result<Vec<u8>, OracleError> {
        Ok(vec![0u8; 8])
    }
}

// ---------------------------------------------------------------------------
// Helpers

fn test_config(visitors: usize, admins: usize) -> FleetConfig {
    FleetConfig {
        wp_url: "http://wp.test".to_string(),
        admin_password: "secret".to_string(),
        ollama_host: "http://ollama.test".to_string(),
        num_visitors: visitors,
        num_admins: admins,
        proxy_enabled: false,
        random_seed: Some(7),
        ..Default::default()
    }
}

fn descriptor(id: &str, role: AgentRole) -> AgentDescriptor {
    AgentDescriptor {
        id: id.to_string(),
        role,
        family: BrowserFamily::Chromium,
        proxy_port: None,
    }
}

fn visitor_session(
    config: FleetConfig,
    oracle: Arc<MockOracle>,
    site: Arc<MockSite>,
) -> VisitorSession {
    VisitorSession::new(
        descriptor("visitor-1", AgentRole::Visitor),
        Arc::new(config),
        oracle,
        Arc::new(MockAutomation { site }),
        Arc::new(MockWriter),
        StdRng::seed_from_u64(11),
    )
}

fn admin_session(
    config: FleetConfig,
    oracle: Arc<MockOracle>,
    site: Arc<MockSite>,
) -> AdminSession {
    AdminSession::new(
        descriptor("admin-1", AgentRole::Administrator),
        Arc::new(config),
        oracle,
        Arc::new(MockAutomation { site }),
        Arc::new(MockWriter),
        StdRng::seed_from_u64(12),
    )
}

// ---------------------------------------------------------------------------
// Scenarios

#[tokio::test(start_paused = true)]
async fn cancellation_winds_down_every_session() {
    let site = Arc::new(base_site());
    let oracle = Arc::new(MockOracle::always("ACTION: 1"));
    let config = Arc::new(test_config(5, 0));

    let orchestrator = SessionOrchestrator::new(
        config,
        oracle,
        Arc::new(MockAutomation { site: site.clone() }),
        Arc::new(MockWriter),
    );

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
        })
    };

    let summary = orchestrator.run(cancel).await;
    canceller.await.unwrap();

    assert_eq!(summary.sessions.len(), 5);
    // Session budgets are at least 60s and the fleet is cancelled at 30s, so
    // nothing can have completed; staggered-out sessions count as cancelled
    // too.
    assert_eq!(summary.cancelled(), 5);
    assert_eq!(
        site.opened.load(Ordering::Relaxed),
        site.closed.load(Ordering::Relaxed),
        "every opened context must be closed exactly once"
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_abandons_an_in_flight_consult() {
    let site = Arc::new(MockSite {
        has_comment_form: true,
        ..base_site()
    });
    // The oracle would order a comment, but takes two minutes to answer.
    let oracle = Arc::new(MockOracle::always("ACTION: 3").with_delay(Duration::from_secs(120)));
    let session = visitor_session(test_config(1, 0), oracle, site.clone());

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        })
    };

    let summary = session.run(cancel).await;
    canceller.await.unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Cancelled);
    // Cancellation landed mid-consult; the ordered comment must never reach
    // the site.
    assert_eq!(site.comments.load(Ordering::Relaxed), 0);
    assert_eq!(summary.action_count, 0);
    assert_eq!(site.closed.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_abandons_a_slow_moderation_cycle() {
    let site = Arc::new(MockSite {
        pending: vec![comment(1, "101", "alice")],
        ..base_site()
    });
    let oracle = Arc::new(
        MockOracle::always("ACTION: 1\nITEM_NUMBER: 1").with_delay(Duration::from_secs(120)),
    );
    let session = admin_session(test_config(0, 1), oracle, site.clone()).with_policy(
        ForcePostPolicy {
            cold_start_chance: 0.0,
            baseline_chance: 0.0,
            warmup_actions: 3,
        },
    );

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        })
    };

    let summary = session.run(cancel).await;
    canceller.await.unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Cancelled);
    assert_eq!(site.moderated.load(Ordering::Relaxed), 0);
    assert_eq!(site.closed.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn connection_loss_ends_the_session_early() {
    let site = Arc::new(MockSite {
        connection_lost: true,
        ..base_site()
    });
    let oracle = Arc::new(MockOracle::always("ACTION: 1"));
    let session = visitor_session(test_config(1, 0), oracle.clone(), site.clone());

    let summary = session.run(CancellationToken::new()).await;

    assert!(matches!(summary.outcome, SessionOutcome::Errored(_)));
    // A dead context is released immediately, not retried cycle after cycle
    // for the rest of the budget.
    assert_eq!(oracle.consult_count(), 0);
    assert_eq!(site.closed.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn admin_forces_a_post_after_warmup() {
    let site = Arc::new(MockSite {
        pending: vec![comment(1, "101", "alice"), comment(2, "102", "bob")],
        approved: vec![comment(1, "90", "carol")],
        ..base_site()
    });
    let oracle = Arc::new(MockOracle::scripted(
        &[
            "ACTION: 1\nITEM_NUMBER: 1",
            "ACTION: 1\nITEM_NUMBER: 1",
            "ACTION: 1\nITEM_NUMBER: 1",
            "ACTION: 5",
        ],
        "ACTION: 5",
    ));
    let mut config = test_config(0, 1);
    config.admin_session_min = 600.0;
    config.admin_session_max = 600.0;

    let session = admin_session(config, oracle.clone(), site.clone()).with_policy(
        ForcePostPolicy {
            cold_start_chance: 1.0,
            baseline_chance: 0.0,
            warmup_actions: 3,
        },
    );

    let summary = session.run(CancellationToken::new()).await;

    assert_eq!(summary.outcome, SessionOutcome::Completed);
    assert_eq!(summary.counters.approved, 3);
    // Exactly one forced post: the fourth cycle hits the warmed-up cold
    // start, and the baseline chance is pinned to zero afterwards.
    assert_eq!(summary.counters.posts_created, 1);
    assert_eq!(summary.action_count, 4);
    // The forced cycle must not consult the oracle.
    assert_eq!(oracle.consult_count(), 4);
    assert_eq!(site.moderated.load(Ordering::Relaxed), 3);
    assert_eq!(site.publishes.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn starved_moderation_queue_publishes_without_the_oracle() {
    let site = Arc::new(base_site());
    let oracle = Arc::new(MockOracle::always("ACTION: 5"));
    let mut config = test_config(0, 1);
    config.admin_session_min = 10.0;
    config.admin_session_max = 10.0;

    let session = admin_session(config, oracle.clone(), site.clone()).with_policy(
        ForcePostPolicy {
            cold_start_chance: 0.0,
            baseline_chance: 0.0,
            warmup_actions: 3,
        },
    );

    let summary = session.run(CancellationToken::new()).await;

    assert_eq!(summary.outcome, SessionOutcome::Completed);
    assert!(summary.counters.posts_created >= 1);
    // Both moderation lists are empty every cycle, so the fallback publishes
    // directly and the oracle is never asked.
    assert_eq!(oracle.consult_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_publish_is_not_counted() {
    let site = Arc::new(MockSite {
        publish_confirms: false,
        ..base_site()
    });
    let oracle = Arc::new(MockOracle::always("ACTION: 5"));
    let mut config = test_config(0, 1);
    config.admin_session_min = 10.0;
    config.admin_session_max = 10.0;

    let session = admin_session(config, oracle, site.clone()).with_policy(ForcePostPolicy {
        cold_start_chance: 0.0,
        baseline_chance: 0.0,
        warmup_actions: 3,
    });

    let summary = session.run(CancellationToken::new()).await;

    assert!(site.publishes.load(Ordering::Relaxed) >= 1);
    assert_eq!(summary.counters.posts_created, 0);
}

#[tokio::test(start_paused = true)]
async fn visitor_comments_when_a_form_is_present() {
    let site = Arc::new(MockSite {
        has_comment_form: true,
        ..base_site()
    });
    let oracle = Arc::new(MockOracle::scripted(&["ACTION: 3", "ACTION: 5"], "ACTION: 5"));
    let session = visitor_session(test_config(1, 0), oracle, site.clone());

    let summary = session.run(CancellationToken::new()).await;

    assert_eq!(summary.outcome, SessionOutcome::Completed);
    assert_eq!(summary.counters.comments_made, 1);
    assert_eq!(site.comments.load(Ordering::Relaxed), 1);
    assert_eq!(summary.action_count, 1);
}

#[tokio::test(start_paused = true)]
async fn visitor_follows_the_numbered_link() {
    let site = Arc::new(MockSite {
        links: vec![link(1, "http://wp.test/?p=1"), link(2, "http://wp.test/?p=2")],
        ..base_site()
    });
    let oracle = Arc::new(MockOracle::scripted(
        &["ACTION: 2\nLINK_NUMBER: 2", "ACTION: 5"],
        "ACTION: 5",
    ));
    let session = visitor_session(test_config(1, 0), oracle, site.clone());

    let summary = session.run(CancellationToken::new()).await;

    assert_eq!(summary.outcome, SessionOutcome::Completed);
    let navigations = site.navigations.lock().unwrap().clone();
    assert_eq!(navigations[0], "http://wp.test");
    assert!(navigations.contains(&"http://wp.test/?p=2".to_string()));
}

#[tokio::test(start_paused = true)]
async fn mixed_fleet_runs_to_completion() {
    let site = Arc::new(MockSite {
        has_comment_form: true,
        pending: vec![comment(1, "101", "alice")],
        approved: vec![comment(1, "90", "carol")],
        ..base_site()
    });
    let oracle = Arc::new(MockOracle::always("ACTION: 1"));
    let mut config = test_config(2, 1);
    config.visitor_session_min = 20.0;
    config.visitor_session_max = 30.0;
    config.admin_session_min = 30.0;
    config.admin_session_max = 40.0;
    let config = Arc::new(config);

    let orchestrator = SessionOrchestrator::new(
        config,
        oracle,
        Arc::new(MockAutomation { site: site.clone() }),
        Arc::new(MockWriter),
    );

    let summary = orchestrator.run(CancellationToken::new()).await;

    assert_eq!(summary.sessions.len(), 3);
    assert_eq!(summary.completed(), 3);
    assert!(summary.total_actions() > 0);
    let totals = summary.totals();
    // The admin either approves the pending comment or gets a forced-post
    // draw; both leave a visible trace.
    assert!(totals.approved + totals.posts_created >= 1);
    assert_eq!(site.opened.load(Ordering::Relaxed), 3);
    assert_eq!(site.closed.load(Ordering::Relaxed), 3);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_surfaces_as_an_errored_session() {
    struct FailingAutomation;

    #[async_trait]
    impl BrowserAutomation for FailingAutomation {
        async fn create_context(
            &self,
            _descriptor: &AgentDescriptor,
        ) -> Result<Box<dyn PlatformPage>, BrowserError> {
            Err(BrowserError::LaunchFailed("no chrome".to_string()))
        }
    }

    let oracle = Arc::new(MockOracle::always("ACTION: 1"));
    let session = AgentSession::new(
        descriptor("visitor-1", AgentRole::Visitor),
        Arc::new(test_config(1, 0)),
        oracle,
        Arc::new(FailingAutomation),
        Arc::new(MockWriter),
        StdRng::seed_from_u64(5),
    );

    let summary = session.run(CancellationToken::new()).await;
    assert!(matches!(summary.outcome, SessionOutcome::Errored(_)));
    assert_eq!(summary.action_count, 0);
}
