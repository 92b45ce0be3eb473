//! LLM-backed content writer.
//!
//! Drives the shared decision oracle with dedicated prompts to produce
//! comments, replies and post drafts. Illustration rendering is delegated;
//! this writer only supplies placeholder bytes satisfying the structural
//! contract.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ContentGenerator, GeneratedPost, IllustrationKind};
use crate::oracle::{DecisionOracle, OracleError};

/// Minimal valid 1x1 transparent PNG. Stands in for the rendered chart/
/// diagram/header until a real renderer is wired up.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Content generator that prompts the shared LLM.
pub struct LlmContentWriter {
    oracle: Arc<dyn DecisionOracle>,
}

impl LlmContentWriter {
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentWriter {
    async fn generate_comment(&self, post_text: &str) -> Result<String, OracleError> {
        let prompt = format!(
            "You just read this blog post:\n\n{post_text}\n\n\
             Write a realistic, casual comment (2-3 sentences) as if you're a real \
             person. Be conversational, maybe ask a question or share a brief \
             thought. Don't be overly formal.\n\nComment:"
        );
        let text = self.oracle.consult(&prompt).await?;
        Ok(text.trim().to_string())
    }

    async fn generate_reply(
        &self,
        comment_text: &str,
        post_title: &str,
    ) -> Result<String, OracleError> {
        let prompt = format!(
            "You are the site admin replying to this comment on your post \
             \"{post_title}\":\n\nComment: {comment_text}\n\n\
             Write a friendly, helpful reply (1-2 sentences) as the site owner. \
             Be conversational and appreciative of engagement.\n\nReply:"
        );
        let text = self.oracle.consult(&prompt).await?;
        Ok(text.trim().to_string())
    }

    async fn generate_post(
        &self,
        existing_topics: &[String],
    ) -> Result<GeneratedPost, OracleError> {
        let existing = if existing_topics.is_empty() {
            "None yet".to_string()
        } else {
            existing_topics.join(", ")
        };

        let prompt = format!(
            "You run a tech/lifestyle blog. Current topics covered: {existing}\n\n\
             Generate a NEW blog post idea (don't repeat existing topics).\n\n\
             Respond EXACTLY like this:\n\
             TITLE: [catchy title]\n\
             TOPIC: [one word: tech, lifestyle, tutorial, review, opinion]\n\
             IMAGE_TYPE: [chart, diagram, header, infographic]\n\
             CONTENT: [write 5-6 substantial paragraphs of blog content, \
             approximately 600-800 words total. Include specific details, \
             examples, and insights.]\n\n\
             Keep it authentic, detailed, and engaging."
        );

        let response = self.oracle.consult(&prompt).await?;
        Ok(parse_post_draft(&response))
    }

    async fn generate_image(
        &self,
        kind: IllustrationKind,
        caption: &str,
    ) -> Result<Vec<u8>, OracleError> {
        debug!("Generating {:?} illustration for '{}'", kind, caption);
        Ok(PLACEHOLDER_PNG.to_vec())
    }
}

/// Parse a `TITLE:/TOPIC:/IMAGE_TYPE:/CONTENT:` draft. Everything after the
/// CONTENT marker and before another marker belongs to the body.
fn parse_post_draft(response: &str) -> GeneratedPost {
    let mut title = "New Blog Post".to_string();
    let mut illustration = IllustrationKind::Header;
    let mut body = String::new();
    let mut in_content = false;

    for line in response.lines() {
        if let Some(rest) = line.strip_prefix("TITLE:") {
            title = rest.trim().to_string();
            in_content = false;
        } else if let Some(rest) = line.strip_prefix("IMAGE_TYPE:") {
            illustration = IllustrationKind::parse(rest);
            in_content = false;
        } else if let Some(rest) = line.strip_prefix("CONTENT:") {
            body = rest.trim().to_string();
            in_content = true;
        } else if line.starts_with("TOPIC:") {
            in_content = false;
        } else if in_content {
            body.push('\n');
            body.push_str(line);
        }
    }

    let body: String = strip_tags(&body).trim().chars().take(3000).collect();

    GeneratedPost {
        title,
        body,
        illustration,
    }
}

/// Remove HTML tags the model sometimes sneaks into the body.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
