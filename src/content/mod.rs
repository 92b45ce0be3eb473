//! Content-generation collaborator.
//!
//! Produces comment text, post drafts and illustration bytes for the
//! content-creating actions. Sessions only depend on the structural
//! contract here; the LLM-backed implementation lives in [`writer`].

mod writer;

pub use writer::LlmContentWriter;

use async_trait::async_trait;

use crate::oracle::OracleError;

/// How a post should be illustrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllustrationKind {
    Chart,
    Diagram,
    Header,
    Infographic,
}

impl IllustrationKind {
    /// Parse an illustration label from guidance text; unknown labels fall
    /// back to a header image.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "chart" => IllustrationKind::Chart,
            "diagram" => IllustrationKind::Diagram,
            "infographic" => IllustrationKind::Infographic,
            _ => IllustrationKind::Header,
        }
    }
}

/// A generated blog post draft.
#[derive(Debug, Clone)]
pub struct GeneratedPost {
    pub title: String,
    pub body: String,
    pub illustration: IllustrationKind,
}

/// Generates content on demand for the sessions.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// A short, casual comment reacting to the given post text.
    async fn generate_comment(&self, post_text: &str) -> Result<String, OracleError>;

    /// A short reply from the site owner to a reader's comment.
    async fn generate_reply(
        &self,
        comment_text: &str,
        post_title: &str,
    ) -> Result<String, OracleError>;

    /// A fresh post draft avoiding the listed existing topics.
    async fn generate_post(&self, existing_topics: &[String])
        -> Result<GeneratedPost, OracleError>;

    /// Illustration bytes (PNG) for a post.
    async fn generate_image(
        &self,
        kind: IllustrationKind,
        caption: &str,
    ) -> Result<Vec<u8>, OracleError>;
}
