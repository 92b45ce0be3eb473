//! wp-swarm
//!
//! Simulates a fleet of LLM-driven visitors and administrators against a
//! WordPress site for load- and content-generation testing. Visitors browse,
//! read and comment; administrators moderate comments, reply, and publish new
//! posts. Sessions run concurrently with staggered starts, a randomized
//! browser/proxy identity per agent, and per-session failure isolation.

pub mod agent;
pub mod browser;
pub mod content;
pub mod fleet;
pub mod oracle;

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors detected before any session starts.
///
/// These are the only process-fatal errors in the crate: everything that
/// happens after startup is contained at the cycle or session boundary.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fleet configuration.
///
/// Read once at startup and never mutated. Site and LLM identity come from
/// the environment; everything else has defaults and can be overridden by a
/// JSON config file (see [`FleetConfig::load`]).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetConfig {
    /// WordPress base URL (WORDPRESS_URL, required)
    pub wp_url: String,
    /// Admin username (WP_ADMIN_USER, default "admin")
    pub admin_user: String,
    /// Admin password (WP_ADMIN_PASSWORD, required)
    pub admin_password: String,
    /// Ollama base URL (OLLAMA_HOST, required)
    pub ollama_host: String,
    /// Ollama model name (OLLAMA_MODEL, default "qwen2.5:14b")
    pub ollama_model: String,

    /// Number of visitor agents
    pub num_visitors: usize,
    /// Number of administrator agents
    pub num_admins: usize,

    /// Browser family mix (must be non-negative and sum to 1.0)
    pub browser_chrome_pct: f64,
    pub browser_webkit_pct: f64,
    pub browser_firefox_pct: f64,

    /// Route each agent through its own local proxy port
    pub proxy_enabled: bool,
    pub proxy_host: String,
    /// First proxy port; agent at fleet index i gets base + i
    pub proxy_base_port: u16,

    /// Session duration bounds in seconds, drawn uniformly per session
    pub visitor_session_min: f64,
    pub visitor_session_max: f64,
    pub admin_session_min: f64,
    pub admin_session_max: f64,

    /// Delay between consecutive agent launches, seconds
    pub stagger_min: f64,
    pub stagger_max: f64,

    /// Pause between decision cycles, seconds
    pub between_action_min: f64,
    pub between_action_max: f64,
    /// Extra pause after scrolling through a page, seconds
    pub reading_time_min: f64,
    pub reading_time_max: f64,

    /// Run browsers headless
    pub headless: bool,
    /// Seed for the fleet RNG; None seeds from entropy. Allocation and
    /// per-agent policy draws are reproducible for a fixed seed.
    pub random_seed: Option<u64>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            wp_url: String::new(),
            admin_user: "admin".to_string(),
            admin_password: String::new(),
            ollama_host: String::new(),
            ollama_model: "qwen2.5:14b".to_string(),
            num_visitors: 20,
            num_admins: 3,
            browser_chrome_pct: 0.80,
            browser_webkit_pct: 0.15,
            browser_firefox_pct: 0.05,
            proxy_enabled: true,
            proxy_host: "127.0.0.1".to_string(),
            proxy_base_port: 40001,
            visitor_session_min: 60.0,
            visitor_session_max: 180.0,
            admin_session_min: 120.0,
            admin_session_max: 300.0,
            stagger_min: 2.0,
            stagger_max: 10.0,
            between_action_min: 1.0,
            between_action_max: 3.0,
            reading_time_min: 3.0,
            reading_time_max: 10.0,
            headless: true,
            random_seed: None,
        }
    }
}

impl FleetConfig {
    /// Config file path (JSON overrides for the non-identity knobs)
    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WP_SWARM_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("wp-swarm").join("config.json"))
    }

    /// Load configuration: file defaults first, then identity from the
    /// environment, then validation. Missing identity is startup-fatal.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file().unwrap_or_default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_file() -> Option<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                None
            }
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.wp_url = require_env("WORDPRESS_URL")?;
        self.admin_password = require_env("WP_ADMIN_PASSWORD")?;
        self.ollama_host = require_env("OLLAMA_HOST")?;
        if let Ok(user) = std::env::var("WP_ADMIN_USER") {
            self.admin_user = user;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.ollama_model = model;
        }
        Ok(())
    }

    /// Validate invariants. Called before any session starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("WORDPRESS_URL", &self.wp_url), ("OLLAMA_HOST", &self.ollama_host)] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{name} is not a valid URL: {e}")))?;
        }

        let mix = [
            self.browser_chrome_pct,
            self.browser_webkit_pct,
            self.browser_firefox_pct,
        ];
        if mix.iter().any(|p| *p < 0.0) {
            return Err(ConfigError::Invalid(
                "browser mix percentages must be non-negative".into(),
            ));
        }
        let sum: f64 = mix.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "browser mix percentages must sum to 1.0 (got {sum})"
            )));
        }
        check_range("visitorSession", self.visitor_session_min, self.visitor_session_max)?;
        check_range("adminSession", self.admin_session_min, self.admin_session_max)?;
        check_range("stagger", self.stagger_min, self.stagger_max)?;
        check_range("betweenAction", self.between_action_min, self.between_action_max)?;
        check_range("readingTime", self.reading_time_min, self.reading_time_max)?;
        Ok(())
    }

    /// Total fleet size
    pub fn total_agents(&self) -> usize {
        self.num_visitors + self.num_admins
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

fn check_range(name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min < 0.0 || max < min {
        return Err(ConfigError::Invalid(format!(
            "{name} range [{min}, {max}] is invalid"
        )));
    }
    Ok(())
}

/// Get log directory path
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wp-swarm").join("logs"))
}

/// Initialize logging: console layer plus a daily-rolling file layer when a
/// log directory is available. Returns the appender guard; keep it alive for
/// the process lifetime.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "wp-swarm.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
