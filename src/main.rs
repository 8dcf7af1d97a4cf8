mod config;
mod dedup;
mod drive;
mod error;
mod fields;
mod google_hub;
mod llm_extract;
mod pdf_extract;
mod poll_loop;
mod processed_store;
mod sheet_writer;

use config::Config;
use drive::DriveFolder;
use llm_extract::FieldExtractor;
use poll_loop::{PipelineContext, PollLoop};
use processed_store::{ProcessedKeys, ProcessedStore};
use sheet_writer::GoogleSheet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "invoice_poller.toml";

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal — shutting down gracefully");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let once = std::env::args().skip(1).any(|a| a == "--once");
    let config_path =
        std::env::var("INVOICE_POLLER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load(&config_path)?;

    let keys = ProcessedKeys::open(ProcessedStore::new(&cfg.processed_log_path))?;
    info!(keys = keys.len(), "Loaded processed invoice keys from disk");

    let hubs = google_hub::create_hubs(&cfg.service_account_path).await?;
    let ctx = PipelineContext {
        source: Box::new(DriveFolder::new(hubs.drive, &cfg.folder_id)),
        extractor: FieldExtractor::new(
            llm_extract::model_from_config(&cfg.llm),
            cfg.max_prompt_chars,
        ),
        sheet: Box::new(GoogleSheet::new(hubs.sheets, &cfg.sheet_id)),
    };

    let mut poll = PollLoop::new(ctx, keys, cfg.poll_interval(), cfg.max_read_attempts);
    poll.run(shutdown_signal(), once).await;

    info!(keys = poll.processed_count(), state = ?poll.state(), "Stopped");
    Ok(())
}
