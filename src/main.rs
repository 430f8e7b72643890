use std::sync::Arc;

use msc_resolver::bot;
use msc_resolver::channels::{Channel, MatrixChannel};
use msc_resolver::config::{MatrixConfig, TrackerConfig};
use msc_resolver::error::Result;
use msc_resolver::proposals::{GithubTracker, ProposalResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let matrix_config = MatrixConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export MATRIX_HOMESERVER_URL=https://matrix.example.org");
        eprintln!("  export MATRIX_ACCESS_TOKEN=syt_...");
        std::process::exit(1);
    });
    let tracker_config = Arc::new(TrackerConfig::from_env()?);

    eprintln!("MSC Resolver v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Homeserver: {}", matrix_config.homeserver);
    eprintln!("   Repository: {}", tracker_config.repo);
    eprintln!("   Label: {}", tracker_config.proposal_label);
    eprintln!(
        "   GitHub auth: {}",
        if tracker_config.token.is_some() {
            "token"
        } else {
            "anonymous"
        }
    );

    // ── Issue tracker ───────────────────────────────────────────────────
    let tracker = Arc::new(GithubTracker::new(&tracker_config)?);
    let resolver = ProposalResolver::new(tracker, tracker_config);

    // ── Channel ─────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = Arc::new(MatrixChannel::new(matrix_config)?);
    channel.health_check().await?;

    tokio::select! {
        result = bot::run(Arc::clone(&channel), resolver) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            channel.shutdown().await?;
        }
    }

    Ok(())
}
