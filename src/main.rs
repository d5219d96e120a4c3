use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use post_relay::app::Relay;
use post_relay::config::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let config = RelayConfig::from_env().context("Invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("📡 Post Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Operators: {}", config.admin_ids.len());
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Rewriting: {}",
        if config.rewrite_enabled() {
            "enabled"
        } else {
            "disabled (ANTHROPIC_API_KEY not set)"
        }
    );
    eprintln!("   Album debounce: {:?}", config.album_debounce);
    if let Some(dir) = &config.log_dir {
        eprintln!("   Log files: {}", dir.display());
    }
    eprintln!("   Press Ctrl+C to stop.\n");

    let relay = Relay::build(config)
        .await
        .context("Failed to start relay")?;
    relay.run().await.context("Relay stopped with an error")?;

    Ok(())
}

fn init_tracing(config: &RelayConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "post-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .init();
            None
        }
    }
}
