//! Visitor session state machine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decision::{decide_visitor, VisitorAction};
use super::{human_pause, until_cancelled, CycleEnd, SessionOutcome, SessionRuntime, SessionSummary};
use crate::browser::{BrowserAutomation, LinkCandidate, PageView, PlatformPage};
use crate::content::ContentGenerator;
use crate::fleet::AgentDescriptor;
use crate::oracle::DecisionOracle;
use crate::FleetConfig;

/// A casual reader: browses the site, follows post links, scrolls through
/// articles and occasionally leaves a comment.
pub struct VisitorSession {
    descriptor: AgentDescriptor,
    config: Arc<FleetConfig>,
    oracle: Arc<dyn DecisionOracle>,
    browser: Arc<dyn BrowserAutomation>,
    writer: Arc<dyn ContentGenerator>,
    rng: StdRng,
    visited: HashSet<String>,
    recent_titles: Vec<String>,
}

impl VisitorSession {
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
            visited: HashSet::new(),
            recent_titles: Vec::new(),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> SessionSummary {
        let secs = self
            .rng
            .gen_range(self.config.visitor_session_min..=self.config.visitor_session_max);
        let mut runtime = SessionRuntime::begin(Duration::from_secs_f64(secs));

        info!(
            agent = %self.descriptor.id,
            family = %self.descriptor.family,
            "Visitor session starting ({:.0}s budget)",
            secs
        );

        let page = match self.browser.create_context(&self.descriptor).await {
            Ok(page) => page,
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Failed to open browsing context: {}", e);
                return runtime.summarize(&self.descriptor, SessionOutcome::Errored(e.to_string()));
            }
        };

        let outcome = self.browse(page.as_ref(), &mut runtime, &cancel).await;

        if let Err(e) = page.close().await {
            warn!(agent = %self.descriptor.id, "Context close failed: {}", e);
        }

        let summary = runtime.summarize(&self.descriptor, outcome);
        info!(
            agent = %summary.agent_id,
            actions = summary.action_count,
            comments = summary.counters.comments_made,
            "Visitor session finished: {:?}",
            summary.outcome
        );
        summary
    }

    async fn browse(
        &mut self,
        page: &dyn PlatformPage,
        runtime: &mut SessionRuntime,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let home = self.config.wp_url.clone();
        match until_cancelled(cancel, page.navigate(&home)).await {
            None => return SessionOutcome::Cancelled,
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Home navigation failed: {}", e);
                return SessionOutcome::Errored(e.to_string());
            }
            Some(Ok(())) => {}
        }
        self.visited.insert(home);

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

    /// One decision cycle. Errors here are logged and skip the cycle; only
    /// cancellation and an explicit END escape the loop. Every await inside
    /// the cycle races the token so a shutdown order lands before the next
    /// side effect, not after it.
    async fn cycle(
        &mut self,
        page: &dyn PlatformPage,
        runtime: &mut SessionRuntime,
        cancel: &CancellationToken,
    ) -> CycleEnd {
        let view = match until_cancelled(cancel, page.observe()).await {
            None => return CycleEnd::Cancelled,
            Some(Ok(view)) => view,
            Some(Err(e)) if e.is_session_fatal() => return CycleEnd::Fatal(e.to_string()),
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Page observation failed: {}", e);
                return CycleEnd::Continue;
            }
        };

        self.remember_title(&view.title);
        if !view.url.is_empty() {
            self.visited.insert(view.url.clone());
        }

        let situation = self.describe_situation(&view, runtime);
        let guidance = match until_cancelled(cancel, self.oracle.consult(&situation)).await {
            None => return CycleEnd::Cancelled,
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!(agent = %self.descriptor.id, "Oracle unavailable this cycle: {}", e);
                return CycleEnd::Continue;
            }
        };

        let decision = decide_visitor(&guidance, view.links.len());
        debug!(
            agent = %self.descriptor.id,
            action = ?decision.action,
            item = decision.item,
            "Visitor decision"
        );

        match decision.action {
            VisitorAction::Read => {
                if !self.read_page(page, cancel).await {
                    return CycleEnd::Cancelled;
                }
            }
            VisitorAction::FollowLink => {
                let Some(target) = resolve_link(&view.links, decision.item, &self.visited) else {
                    debug!(agent = %self.descriptor.id, "No link to follow, skipping");
                    return CycleEnd::Continue;
                };
                let href = target.href.clone();
                info!(agent = %self.descriptor.id, "Opening \"{}\"", target.text);
                match until_cancelled(cancel, page.navigate(&href)).await {
                    None => return CycleEnd::Cancelled,
                    Some(Err(e)) if e.is_session_fatal() => {
                        return CycleEnd::Fatal(e.to_string())
                    }
                    Some(Err(e)) => {
                        warn!(agent = %self.descriptor.id, "Link navigation failed: {}", e);
                        return CycleEnd::Continue;
                    }
                    Some(Ok(())) => {}
                }
                self.visited.insert(href);
            }
            VisitorAction::Comment => {
                // Only pages with a comment form accept comments; elsewhere
                // the decision degrades to a no-op.
                if view.has_comment_form {
                    if until_cancelled(cancel, self.leave_comment(page, &view, runtime))
                        .await
                        .is_none()
                    {
                        return CycleEnd::Cancelled;
                    }
                } else {
                    debug!(agent = %self.descriptor.id, "No comment form here, skipping");
                }
            }
            VisitorAction::GoHome => {
                match until_cancelled(cancel, page.navigate(&self.config.wp_url)).await {
                    None => return CycleEnd::Cancelled,
                    Some(Err(e)) if e.is_session_fatal() => {
                        return CycleEnd::Fatal(e.to_string())
                    }
                    Some(Err(e)) => {
                        warn!(agent = %self.descriptor.id, "Home navigation failed: {}", e);
                        return CycleEnd::Continue;
                    }
                    Some(Ok(())) => {}
                }
            }
            VisitorAction::End => {
                info!(agent = %self.descriptor.id, "Visitor decided to leave");
                return CycleEnd::End;
            }
        }

        runtime.action_count += 1;
        CycleEnd::Continue
    }

    /// Scroll through the page in human-sized steps, then linger for the
    /// configured reading time. Returns false on cancellation.
    async fn read_page(&mut self, page: &dyn PlatformPage, cancel: &CancellationToken) -> bool {
        let steps = self.rng.gen_range(3..=8);
        for _ in 0..steps {
            let pixels = self.rng.gen_range(200..=500);
            match page.scroll_step(pixels).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(agent = %self.descriptor.id, "Scroll failed: {}", e);
                    break;
                }
            }
            if !human_pause(cancel, &mut self.rng, 0.5, 1.0).await {
                return false;
            }
        }
        human_pause(
            cancel,
            &mut self.rng,
            self.config.reading_time_min,
            self.config.reading_time_max,
        )
        .await
    }

    async fn leave_comment(
        &mut self,
        page: &dyn PlatformPage,
        view: &PageView,
        runtime: &mut SessionRuntime,
    ) {
        let text = match self.writer.generate_comment(&view.excerpt).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => return,
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Comment generation failed: {}", e);
                return;
            }
        };

        let author = format!("User_{}", self.descriptor.id);
        let email = format!("{}@example.com", self.descriptor.id);
        match page.submit_comment(&author, &email, &text).await {
            Ok(()) => {
                runtime.counters.comments_made += 1;
                info!(agent = %self.descriptor.id, "Left a comment on \"{}\"", view.title);
            }
            Err(e) => {
                warn!(agent = %self.descriptor.id, "Comment submission failed: {}", e);
            }
        }
    }

    fn remember_title(&mut self, title: &str) {
        if title.is_empty() {
            return;
        }
        if self.recent_titles.last().map(String::as_str) == Some(title) {
            return;
        }
        self.recent_titles.push(title.to_string());
        if self.recent_titles.len() > 3 {
            self.recent_titles.remove(0);
        }
    }

    fn describe_situation(&self, view: &PageView, runtime: &SessionRuntime) -> String {
        let links = if view.links.is_empty() {
            "None".to_string()
        } else {
            view.links
                .iter()
                .map(|l| format!("{}. {}", l.number, l.text))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "You are a casual blog visitor browsing a website.\n\n\
             Current page: \"{title}\"\n\n\
             Page content preview:\n{excerpt}\n\n\
             Available post links:\n{links}\n\n\
             Comment form available: {form}\n\
             Time in session: {elapsed}s\n\
             Recently viewed: {recent}\n\n\
             What do you do next? Choose ONE action:\n\
             1. READ - scroll through and read the current page\n\
             2. CLICK_LINK - open one of the numbered links\n\
             3. COMMENT - leave a comment (only if a form is available)\n\
             4. GO_HOME - return to the home page\n\
             5. END - finish browsing and leave\n\n\
             Respond with ACTION: <number>, and LINK_NUMBER: <n> when clicking a link.",
            title = view.title,
            excerpt = view.excerpt,
            links = links,
            form = if view.has_comment_form { "yes" } else { "no" },
            elapsed = runtime.elapsed().as_secs(),
            recent = if self.recent_titles.is_empty() {
                "nothing yet".to_string()
            } else {
                self.recent_titles.join("; ")
            },
        )
    }
}

/// Pick the link to follow. A link that was already visited is substituted
/// with the first unvisited one; when everything is visited the original
/// choice stands (revisiting is allowed).
pub(crate) fn resolve_link<'a>(
    links: &'a [LinkCandidate],
    item: usize,
    visited: &HashSet<String>,
) -> Option<&'a LinkCandidate> {
    if links.is_empty() || item == 0 {
        return None;
    }
    let chosen = &links[(item - 1).min(links.len() - 1)];
    if !visited.contains(&chosen.href) {
        return Some(chosen);
    }
    links
        .iter()
        .find(|l| !visited.contains(&l.href))
        .or(Some(chosen))
}
