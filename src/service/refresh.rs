//! Batch refresh scheduler
//!
//! Each cycle picks a small batch of the most overdue profiles and
//! refreshes them one at a time with a jittered pause in between.
//! A failed candidate still gets its sync timestamp advanced so it moves
//! to the back of the queue instead of being retried every cycle.

use serde::Serialize;
use std::sync::Arc;

use super::sync::{ProfileSynchronizer, SyncOutcome};
use crate::config::{DelayRange, SchedulerConfig};
use crate::metrics::{LAST_REFRESH_CYCLE_TIMESTAMP, REFRESH_CYCLE_TOTAL};

/// Aggregate result of one cycle
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: u32,
    pub skipped: u32,
    pub details: Vec<RefreshDetail>,
    /// Set when candidates could not even be selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome for one candidate
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RefreshDetail {
    pub handle: String,
    pub status: String,
}

pub struct RefreshScheduler {
    synchronizer: Arc<ProfileSynchronizer>,
    batch_size: u32,
    jitter: DelayRange,
}

impl RefreshScheduler {
    pub fn new(synchronizer: Arc<ProfileSynchronizer>, config: &SchedulerConfig) -> Self {
        Self {
            synchronizer,
            batch_size: config.batch_size,
            jitter: config.jitter,
        }
    }

    /// Run one refresh cycle
    ///
    /// Never fails; every problem is reported in the summary.
    pub async fn run_cycle(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        let handles = match self.synchronizer.due_handles(self.batch_size).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::error!(error = %e, "Failed to select refresh candidates");
                REFRESH_CYCLE_TOTAL.with_label_values(&["error"]).inc();
                summary.error = Some(e.to_string());
                return summary;
            }
        };

        tracing::info!(candidates = handles.len(), "Starting refresh cycle");

        for handle in handles {
            self.jitter.pause().await;

            let status = self.refresh_candidate(&handle).await;
            if status == "updated" {
                summary.updated += 1;
            } else {
                summary.skipped += 1;
            }
            REFRESH_CYCLE_TOTAL
                .with_label_values(&[status.split(':').next().unwrap_or("skipped")])
                .inc();
            summary.details.push(RefreshDetail { handle, status });
        }

        LAST_REFRESH_CYCLE_TIMESTAMP.set(self.synchronizer.now().timestamp());
        tracing::info!(
            updated = summary.updated,
            skipped = summary.skipped,
            "Refresh cycle finished"
        );

        summary
    }

    async fn refresh_candidate(&self, handle: &str) -> String {
        let status = match self.synchronizer.sync_once(handle).await {
            Ok(SyncOutcome::Updated(_)) => return "updated".to_string(),
            Ok(outcome) => outcome.label().to_string(),
            Err(e) => {
                tracing::error!(handle = %handle, error = %e, "Refresh failed");
                format!("error: {e}")
            }
        };

        match self.synchronizer.record_failed_attempt(handle).await {
            Ok(()) => {
                tracing::info!(handle = %handle, status = %status, "Backing off candidate");
                status
            }
            Err(e) => {
                tracing::error!(handle = %handle, error = %e, "Failed to record sync attempt");
                format!("error: {e}")
            }
        }
    }
}
