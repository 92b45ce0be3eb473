//! Browser automation collaborator.
//!
//! The session state machines only speak the domain-level traits defined
//! here; the actual DOM selectors and navigation mechanics live in the
//! [`cdp`] implementation (and in test doubles).

mod errors;
pub mod cdp;

pub use errors::BrowserError;

use async_trait::async_trait;

use crate::fleet::AgentDescriptor;

/// One numbered, addressable link as presented to the decision oracle.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LinkCandidate {
    /// 1-based display number
    pub number: usize,
    pub text: String,
    pub href: String,
}

/// One comment row in a moderation list, numbered as presented to the oracle.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CommentRow {
    /// 1-based display number
    pub number: usize,
    /// Platform comment id
    pub id: String,
    pub author: String,
    pub excerpt: String,
    #[serde(default)]
    pub post_title: String,
}

/// Observable state of the current page.
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub title: String,
    pub url: String,
    /// Leading page text, capped at 800 chars
    pub excerpt: String,
    /// Post links found on the page, capped at 10
    pub links: Vec<LinkCandidate>,
    pub has_comment_form: bool,
}

/// Moderation verdict for a pending comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationVerdict {
    Approve,
    Spam,
}

/// Result of a publish attempt. `Uncertain` means no success signal was
/// observed; it is logged as a warning and not counted as success, without
/// failing the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Confirmed,
    Uncertain,
}

/// Creates isolated browsing contexts. One shared instance serves the whole
/// fleet and must tolerate concurrent `create_context` calls.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn create_context(
        &self,
        descriptor: &AgentDescriptor,
    ) -> Result<Box<dyn PlatformPage>, BrowserError>;
}

/// An isolated browsing context bound to one agent, exposing the platform
/// operations the session state machines need.
#[async_trait]
pub trait PlatformPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Extract title, text excerpt, numbered post links and the comment-form
    /// flag from the current page.
    async fn observe(&self) -> Result<PageView, BrowserError>;

    /// Scroll down by `pixels`. Returns false once the bottom is reached.
    async fn scroll_step(&self, pixels: u32) -> Result<bool, BrowserError>;

    async fn submit_comment(
        &self,
        author: &str,
        email: &str,
        text: &str,
    ) -> Result<(), BrowserError>;

    /// Authenticate against the platform's admin surface.
    async fn login(&self, user: &str, password: &str) -> Result<(), BrowserError>;

    /// Comments awaiting moderation, capped at 10.
    async fn pending_comments(&self) -> Result<Vec<CommentRow>, BrowserError>;

    /// Approved comments available to reply to, capped at 5.
    async fn approved_comments(&self) -> Result<Vec<CommentRow>, BrowserError>;

    /// Titles of the most recent posts, capped at 5.
    async fn recent_post_titles(&self) -> Result<Vec<String>, BrowserError>;

    async fn moderate_comment(
        &self,
        comment_id: &str,
        verdict: ModerationVerdict,
    ) -> Result<(), BrowserError>;

    async fn reply_to_comment(&self, comment_id: &str, text: &str)
        -> Result<(), BrowserError>;

    /// Publish a new post with an illustration. Success is recorded only on
    /// an explicit confirmation signal from the platform.
    async fn publish_post(
        &self,
        title: &str,
        body: &str,
        image: &[u8],
    ) -> Result<PublishOutcome, BrowserError>;

    /// Release the context. Called exactly once per session.
    async fn close(&self) -> Result<(), BrowserError>;
}
