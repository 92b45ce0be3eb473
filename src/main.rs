use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wp_swarm::browser::{BrowserAutomation, cdp::CdpAutomation};
use wp_swarm::content::{ContentGenerator, LlmContentWriter};
use wp_swarm::fleet::SessionOrchestrator;
use wp_swarm::oracle::{DecisionOracle, OllamaOracle};
use wp_swarm::FleetConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = wp_swarm::init_logging();

    let config = Arc::new(FleetConfig::load().context("loading configuration")?);
    info!(
        "wp-swarm starting: {} visitors + {} admins, model {}",
        config.num_visitors, config.num_admins, config.ollama_model
    );

    let oracle: Arc<dyn DecisionOracle> = Arc::new(
        OllamaOracle::new(&config.ollama_host, &config.ollama_model)
            .context("creating Ollama client")?,
    );
    let writer: Arc<dyn ContentGenerator> = Arc::new(LlmContentWriter::new(oracle.clone()));
    let browser: Arc<dyn BrowserAutomation> = Arc::new(CdpAutomation::new(config.clone()));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, winding the fleet down");
                cancel.cancel();
            }
        });
    }

    let orchestrator = SessionOrchestrator::new(config, oracle, browser, writer);
    let summary = orchestrator.run(cancel).await;

    let totals = summary.totals();
    println!("\n=== Fleet report ===");
    println!(
        "Sessions: {} completed, {} cancelled, {} errored",
        summary.completed(),
        summary.cancelled(),
        summary.errored()
    );
    println!("Actions taken:   {}", summary.total_actions());
    println!("Comments left:   {}", totals.comments_made);
    println!("Approved:        {}", totals.approved);
    println!("Rejected:        {}", totals.rejected);
    println!("Replies:         {}", totals.replied);
    println!("Posts published: {}", totals.posts_created);

    Ok(())
}
