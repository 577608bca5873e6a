use crate::classifier::Classifier;
use crate::dedup::DedupWindow;
use crate::pipeline::Pipeline;
use crate::poller::Poller;
use crate::taxonomy;
use anyhow::Result;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use super::shared::{load_notify_cfg, load_relay_cfg, process_env};

pub(super) async fn run() -> Result<()> {
    let cfg = load_relay_cfg(&process_env);
    // Credentials are checked before anything touches the network.
    let notify_cfg = load_notify_cfg(&process_env)?;

    let http = HttpClient::new();
    let notifier = notify_cfg.build(http.clone());
    info!("Notifier: {}", notifier.describe());

    let taxonomy = taxonomy::load(
        &http,
        &cfg.taxonomy_path,
        &cfg.taxonomy_url,
        cfg.taxonomy_timeout,
    )
    .await;
    if taxonomy.is_empty() {
        warn!("Running without a taxonomy; localities will be listed ungrouped");
    }

    let dedup = DedupWindow::new(cfg.dedup_capacity);
    info!(
        "Monitoring alerts for: {} (test alerts {}, dedup window {})",
        cfg.region,
        if cfg.include_test_alerts { "included" } else { "filtered" },
        dedup.capacity()
    );

    let pipeline = Pipeline::new(
        Arc::new(taxonomy),
        dedup,
        Classifier::new(cfg.region.clone(), cfg.include_test_alerts),
        notifier,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested; finishing current cycle.");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    let mut poller =
        Poller::new(cfg.build_source()?, pipeline, cfg.poller).with_shutdown(shutdown_rx);
    poller.run().await;
    if poller.retries() > 0 {
        warn!(
            "Stopped while the feed was unreachable ({} failed attempts)",
            poller.retries()
        );
    }

    Ok(())
}
