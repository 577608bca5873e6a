//! Per-snapshot processing: parse → region → dedup → drill filter →
//! categorize → dispatch.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::categorize::{categorize, compose_message};
use crate::classifier::Classifier;
use crate::dedup::DedupWindow;
use crate::feed::{AlertEvent, parse_snapshot};
use crate::notify::Notifier;
use crate::taxonomy::Taxonomy;

/// What one processing pass decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Empty snapshot: nothing active.
    NoAlert,
    /// Payload did not parse; skipped.
    Malformed,
    OutOfRegion,
    /// Id already handled.
    Duplicate,
    /// Drill filtered out.
    TestAlert,
    Dispatched,
    /// Marked seen, but the notifier reported an error.
    DispatchFailed,
    /// Shutdown requested before a payload was obtained.
    Cancelled,
}

pub struct Pipeline {
    taxonomy: Arc<Taxonomy>,
    dedup: DedupWindow,
    classifier: Classifier,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        dedup: DedupWindow,
        classifier: Classifier,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            taxonomy,
            dedup,
            classifier,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn dedup(&self) -> &DedupWindow {
        &self.dedup
    }

    /// Handle one raw snapshot body.
    pub async fn process(&mut self, raw: &str) -> CycleOutcome {
        match parse_snapshot(raw) {
            Ok(None) => CycleOutcome::NoAlert,
            Ok(Some(event)) => self.process_event(event).await,
            Err(e) => {
                warn!("Skipping cycle: {e}");
                CycleOutcome::Malformed
            }
        }
    }

    pub async fn process_event(&mut self, event: AlertEvent) -> CycleOutcome {
        if !self.classifier.in_region(&event) {
            debug!("Alert {} does not concern {}", event.id, self.classifier.region);
            return CycleOutcome::OutOfRegion;
        }
        if self.dedup.seen(&event.id) {
            return CycleOutcome::Duplicate;
        }
        if self.classifier.is_test(&event) {
            debug!("Alert {} is a drill, skipping", event.id);
            return CycleOutcome::TestAlert;
        }

        // Marked before dispatch so a delivery failure is never retried.
        self.dedup.record(&event.id);

        let result = categorize(&self.taxonomy, &event.data);
        let text = compose_message(&event, &result);

        match self.notifier.dispatch(&text).await {
            Ok(()) => {
                info!(
                    "Alert {} dispatched ({} localities, {} areas, {} unmatched): {event:?}",
                    event.id,
                    event.data.len(),
                    result.groups.len(),
                    result.unmatched.len()
                );
                CycleOutcome::Dispatched
            }
            Err(e) => {
                error!("Failed to dispatch alert {}: {e:#}", event.id);
                CycleOutcome::DispatchFailed
            }
        }
    }
}
