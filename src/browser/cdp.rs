//! Chrome DevTools implementation of the browser collaborator.
//!
//! Every agent gets its own Chrome process with an isolated user data
//! directory, so cookies and login state never leak between sessions. The
//! assigned browser family is realized as a user-agent override, and the
//! per-agent proxy port becomes a `--proxy-server` flag.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    BrowserAutomation, BrowserError, CommentRow, LinkCandidate, ModerationVerdict, PageView,
    PlatformPage, PublishOutcome,
};
use crate::fleet::AgentDescriptor;
use crate::FleetConfig;

const NAV_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_LINKS: usize = 10;
const MAX_PENDING: usize = 10;
const MAX_APPROVED: usize = 5;
const MAX_RECENT_POSTS: usize = 5;

/// Find a Chrome/Chromium executable on the system.
fn find_chrome() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{local}\Google\Chrome\Application\chrome.exe"
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Launches one Chrome process per agent context.
pub struct CdpAutomation {
    config: Arc<FleetConfig>,
}

impl CdpAutomation {
    pub fn new(config: Arc<FleetConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserAutomation for CdpAutomation {
    async fn create_context(
        &self,
        descriptor: &AgentDescriptor,
    ) -> Result<Box<dyn PlatformPage>, BrowserError> {
        let data_dir = std::env::temp_dir()
            .join("wp-swarm")
            .join("browser_data")
            .join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&data_dir)?;

        let mut builder = BrowserConfig::builder()
            .window_size(1366, 900)
            .user_data_dir(&data_dir)
            .arg("--no-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-default-browser-check")
            .arg("--disable-notifications")
            .arg("--disable-session-crashed-bubble");

        if self.config.headless {
            builder = builder.headless_mode(HeadlessMode::New);
        } else {
            builder = builder.with_head();
        }

        if let Some(chrome_path) = find_chrome() {
            debug!("Using Chrome at {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        if let Some(port) = descriptor.proxy_port {
            builder = builder.arg(format!(
                "--proxy-server=http://{}:{}",
                self.config.proxy_host, port
            ));
        }

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // The handler stream drives the CDP connection; when it ends, Chrome
        // is gone.
        let alive = Arc::new(AtomicBool::new(true));
        let agent_id = descriptor.id.clone();
        let alive_for_handler = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!(agent = %agent_id, "Chrome event handler ended");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        page.set_user_agent(descriptor.family.user_agent())
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!(
            agent = %descriptor.id,
            family = %descriptor.family,
            proxy = ?descriptor.proxy_port,
            "Browsing context ready"
        );

        Ok(Box::new(CdpContext {
            agent_id: descriptor.id.clone(),
            base_url: self.config.wp_url.trim_end_matches('/').to_string(),
            browser: RwLock::new(Some(browser)),
            page,
            alive,
            handler_task: RwLock::new(Some(handler_task)),
        }))
    }
}

/// One live Chrome process bound to an agent.
struct CdpContext {
    agent_id: String,
    base_url: String,
    browser: RwLock<Option<Browser>>,
    page: Page,
    /// Cleared by the handler task when the CDP event stream ends.
    alive: Arc<AtomicBool>,
    handler_task: RwLock<Option<JoinHandle<()>>>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLink {
    text: String,
    href: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPageView {
    title: String,
    url: String,
    excerpt: String,
    links: Vec<RawLink>,
    has_comment_form: bool,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComment {
    id: String,
    author: String,
    excerpt: String,
    #[serde(default)]
    post_title: String,
}

impl CdpContext {
    fn admin_url(&self, path: &str) -> String {
        format!("{}/wp-admin/{}", self.base_url, path)
    }

    fn check_alive(&self) -> Result<(), BrowserError> {
        if self.alive.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(BrowserError::ConnectionLost(
                "Chrome event handler ended".to_string(),
            ))
        }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: &str) -> Result<T, BrowserError> {
        self.check_alive()?;
        self.page
            .evaluate(js)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
    }

    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.check_alive()?;
        let nav = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            Ok(())
        };
        match tokio::time::timeout(NAV_TIMEOUT, nav).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(format!("navigation to {url}"))),
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        Ok(())
    }

    /// Fetch a wp-admin comment list and map its rows.
    async fn comment_list(&self, status: &str, cap: usize) -> Result<Vec<CommentRow>, BrowserError> {
        self.goto(&self.admin_url(&format!(
            "edit-comments.php?comment_status={status}"
        )))
        .await?;

        let js = format!(
            r#"(() => Array.from(document.querySelectorAll('tr[id^="comment-"]')).slice(0, {cap}).map(tr => ({{
                id: tr.id.replace('comment-', ''),
                author: (tr.querySelector('.author strong, .column-author strong')?.innerText || '').trim(),
                excerpt: (tr.querySelector('.comment p')?.innerText || '').trim().slice(0, 200),
                postTitle: (tr.querySelector('.response-links a, .column-response a')?.innerText || '').trim()
            }})))()"#
        );
        let rows: Vec<RawComment> = self.eval(&js).await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| CommentRow {
                number: i + 1,
                id: row.id,
                author: row.author,
                excerpt: row.excerpt,
                post_title: row.post_title,
            })
            .collect())
    }
}

#[async_trait]
impl PlatformPage for CdpContext {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.goto(url).await
    }

    async fn observe(&self) -> Result<PageView, BrowserError> {
        let js = format!(
            r#"(() => {{
                const container = document.querySelector('article, .post, main') || document.body;
                const excerpt = (container.innerText || '').trim().slice(0, 800);
                const seen = new Set();
                const links = [];
                for (const a of document.querySelectorAll('a[href]')) {{
                    const href = a.href;
                    const text = (a.innerText || '').trim();
                    if (!text || seen.has(href)) continue;
                    if (!/\?p=\d+|\/\d{{4}}\/\d{{2}}\//.test(href)) continue;
                    seen.add(href);
                    links.push({{ text: text.slice(0, 120), href }});
                    if (links.length >= {MAX_LINKS}) break;
                }}
                return {{
                    title: document.title,
                    url: window.location.href,
                    excerpt,
                    links,
                    hasCommentForm: !!document.querySelector('#commentform, form.comment-form')
                }};
            }})()"#
        );
        let raw: RawPageView = self.eval(&js).await?;

        Ok(PageView {
            title: raw.title,
            url: raw.url,
            excerpt: raw.excerpt,
            links: raw
                .links
                .into_iter()
                .enumerate()
                .map(|(i, l)| LinkCandidate {
                    number: i + 1,
                    text: l.text,
                    href: l.href,
                })
                .collect(),
            has_comment_form: raw.has_comment_form,
        })
    }

    async fn scroll_step(&self, pixels: u32) -> Result<bool, BrowserError> {
        let js = format!(
            "(() => {{ window.scrollBy(0, {pixels}); \
             return (window.innerHeight + window.scrollY) < document.body.scrollHeight - 2; }})()"
        );
        self.eval(&js).await
    }

    async fn submit_comment(
        &self,
        author: &str,
        email: &str,
        text: &str,
    ) -> Result<(), BrowserError> {
        self.type_into("#comment", text).await?;
        // Name and email fields only exist for logged-out visitors.
        if self.type_into("#author", author).await.is_ok() {
            let _ = self.type_into("#email", email).await;
        }
        self.click("#submit").await?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn login(&self, user: &str, password: &str) -> Result<(), BrowserError> {
        self.goto(&format!("{}/wp-login.php", self.base_url)).await?;
        self.type_into("#user_login", user).await?;
        self.type_into("#user_pass", password).await?;
        self.click("#wp-submit").await?;
        let _ = self.page.wait_for_navigation().await;

        let logged_in: bool = self
            .eval("(() => !!document.querySelector('#wpadminbar, #adminmenu'))()")
            .await?;
        if !logged_in {
            return Err(BrowserError::NavigationFailed(
                "login was not accepted".to_string(),
            ));
        }
        debug!(agent = %self.agent_id, "Logged in to wp-admin");
        Ok(())
    }

    async fn pending_comments(&self) -> Result<Vec<CommentRow>, BrowserError> {
        self.comment_list("moderated", MAX_PENDING).await
    }

    async fn approved_comments(&self) -> Result<Vec<CommentRow>, BrowserError> {
        self.comment_list("approved", MAX_APPROVED).await
    }

    async fn recent_post_titles(&self) -> Result<Vec<String>, BrowserError> {
        self.goto(&self.admin_url("edit.php")).await?;
        let js = format!(
            "(() => Array.from(document.querySelectorAll('.row-title'))\
             .slice(0, {MAX_RECENT_POSTS}).map(a => a.innerText.trim()))()"
        );
        self.eval(&js).await
    }

    async fn moderate_comment(
        &self,
        comment_id: &str,
        verdict: ModerationVerdict,
    ) -> Result<(), BrowserError> {
        self.goto(&self.admin_url("edit-comments.php?comment_status=moderated"))
            .await?;

        let action = match verdict {
            ModerationVerdict::Approve => ".approve a",
            ModerationVerdict::Spam => ".spam a",
        };
        let js = format!(
            r#"(() => {{
                const row = document.querySelector('#comment-{comment_id}');
                const link = row && row.querySelector('{action}');
                if (!link) return false;
                link.click();
                return true;
            }})()"#
        );
        let clicked: bool = self.eval(&js).await?;
        if !clicked {
            return Err(BrowserError::ElementNotFound(format!(
                "comment-{comment_id} {action}"
            )));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    async fn reply_to_comment(&self, comment_id: &str, text: &str) -> Result<(), BrowserError> {
        self.goto(&self.admin_url("edit-comments.php?comment_status=approved"))
            .await?;

        let js = format!(
            r#"(() => {{
                const row = document.querySelector('#comment-{comment_id}');
                const link = row && row.querySelector('.reply a, .comment-inline');
                if (!link) return false;
                link.click();
                return true;
            }})()"#
        );
        let opened: bool = self.eval(&js).await?;
        if !opened {
            return Err(BrowserError::ElementNotFound(format!(
                "comment-{comment_id} reply link"
            )));
        }

        self.type_into("#replycontent", text).await?;
        self.click("#replysubmit .save, #savebtn").await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    async fn publish_post(
        &self,
        title: &str,
        body: &str,
        image: &[u8],
    ) -> Result<PublishOutcome, BrowserError> {
        // TODO: upload `image` through async-upload.php once admin cookies
        // are forwarded to an HTTP client; for now posts go out text-only.
        debug!(
            agent = %self.agent_id,
            bytes = image.len(),
            "Skipping illustration upload"
        );

        self.goto(&self.admin_url("post-new.php")).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Dismiss the block-editor welcome dialog when it shows up.
        let _ = self
            .eval::<bool>(
                "(() => { const b = document.querySelector('.components-modal__header button'); \
                 if (b) { b.click(); return true; } return false; })()",
            )
            .await;

        let title_js = serde_json::to_string(title)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        let body_html = body
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("<p>{}</p>", p.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let body_js = serde_json::to_string(&body_html)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        // Block editor first; classic editor as the fallback.
        let block_editor: bool = self
            .eval(&format!(
                r#"(() => {{
                    if (window.wp && wp.data && wp.data.dispatch('core/editor')) {{
                        wp.data.dispatch('core/editor').editPost({{ title: {title_js}, content: {body_js} }});
                        return true;
                    }}
                    return false;
                }})()"#
            ))
            .await
            .unwrap_or(false);

        if block_editor {
            self.click(".editor-post-publish-panel__toggle, .editor-post-publish-button__button")
                .await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = self.click(".editor-post-publish-button").await;
        } else {
            self.type_into("#title", title).await?;
            self.type_into("#content", body).await?;
            self.click("#publish").await?;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        let confirmed: bool = self
            .eval(
                "(() => !!document.querySelector('.components-snackbar') \
                 || window.location.href.includes('post='))()",
            )
            .await
            .unwrap_or(false);

        Ok(if confirmed {
            PublishOutcome::Confirmed
        } else {
            PublishOutcome::Uncertain
        })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let Some(mut browser) = self.browser.write().await.take() else {
            return Ok(());
        };

        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::CloseFailed(e.to_string()));
        if let Err(e) = browser.wait().await {
            warn!(agent = %self.agent_id, "Chrome did not exit cleanly: {}", e);
        }
        if let Some(task) = self.handler_task.write().await.take() {
            task.abort();
        }
        result
    }
}
