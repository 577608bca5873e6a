use crate::classifier::Classifier;
use crate::dedup::DedupWindow;
use crate::notify::Notifier;
use crate::pipeline::{CycleOutcome, Pipeline};
use crate::taxonomy;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use tracing::info;

use super::shared::{
    load_notify_cfg, load_relay_cfg, load_replay_cfg, load_snapshots, process_env,
};

/// Dry-run sink: prints what would have been sent.
struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn dispatch(&self, text: &str) -> Result<()> {
        println!("\n[REPLAY ALERT]\n{}\n", text.replace("\r\n", "\n"));
        Ok(())
    }

    fn describe(&self) -> String {
        "stdout".into()
    }
}

pub(super) async fn run() -> Result<()> {
    let replay = load_replay_cfg(&process_env)?;
    let cfg = load_relay_cfg(&process_env);
    let snapshots = load_snapshots(&replay.input_path)?;
    if snapshots.is_empty() {
        return Err(anyhow!("Replay input is empty: {}", replay.input_path));
    }

    let http = HttpClient::new();
    let notifier: Arc<dyn Notifier> = if replay.broadcast {
        let notifier = load_notify_cfg(&process_env)?.build(http.clone());
        info!("Replay broadcast enabled; alerts will be sent via {}", notifier.describe());
        notifier
    } else {
        Arc::new(StdoutNotifier)
    };

    let taxonomy = taxonomy::load(
        &http,
        &cfg.taxonomy_path,
        &cfg.taxonomy_url,
        cfg.taxonomy_timeout,
    )
    .await;
    let mut pipeline = Pipeline::new(
        Arc::new(taxonomy),
        DedupWindow::new(cfg.dedup_capacity),
        Classifier::new(cfg.region.clone(), cfg.include_test_alerts),
        notifier,
    );

    info!(
        "Replay started: {} snapshots from {}",
        snapshots.len(),
        replay.input_path
    );

    let mut forwarded = 0usize;
    let mut suppressed = 0usize;
    let mut malformed = 0usize;

    for (idx, raw) in snapshots.iter().enumerate() {
        if idx > 0 && !replay.step.is_zero() {
            tokio::time::sleep(replay.step).await;
        }
        match pipeline.process(raw).await {
            CycleOutcome::Dispatched | CycleOutcome::DispatchFailed => forwarded += 1,
            CycleOutcome::Malformed => malformed += 1,
            _ => suppressed += 1,
        }
    }

    info!(
        "Replay complete: total={}, forwarded={}, suppressed={}, malformed={}",
        snapshots.len(),
        forwarded,
        suppressed,
        malformed
    );

    Ok(())
}
