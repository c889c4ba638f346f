//! Periodic expiry of stalled operations.
//!
//! Operations that have gone quiet past the configured TTL are marked
//! `expired`. The marking is a compare-and-swap guarded by the version the
//! operation was read at, so a legitimate transition racing the sweeper
//! always wins and the sweeper's loss is a no-op. Expiry never touches job
//! claim status; reopening a job is an explicit `release`.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogExt};
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::model::{Operation, OperationState};

pub struct ExpirySweeper {
    catalog: Arc<dyn Catalog>,
    config: CoordinatorConfig,
}

impl ExpirySweeper {
    pub fn new(catalog: Arc<dyn Catalog>, config: CoordinatorConfig) -> Self {
        Self { catalog, config }
    }

    /// One sweep pass. Returns how many operations were marked expired.
    pub async fn sweep_once(&self) -> Result<usize> {
        let Ok(ttl) = chrono::Duration::from_std(self.config.operation_ttl) else {
            // TTL too large to represent: nothing can ever be overdue.
            return Ok(0);
        };
        let now = Utc::now();

        let candidates = self
            .catalog
            .find_records::<Operation>(&|body| {
                !matches!(
                    body["state"].as_str(),
                    Some("succeeded" | "failed" | "cancelled" | "expired")
                )
            })
            .await?;

        let mut expired = 0;
        for versioned in candidates {
            let mut op = versioned.record;
            let overdue = op
                .updated_at
                .checked_add_signed(ttl)
                .is_some_and(|deadline| deadline <= now);
            if !overdue {
                continue;
            }
            op.state = OperationState::Expired;
            op.updated_at = now;
            if self.catalog.swap_record(versioned.version, &op).await? {
                expired += 1;
                tracing::info!(
                    operation_id = %op.id,
                    job_id = %op.job_id,
                    "Operation expired after TTL"
                );
            } else {
                // A concurrent legitimate transition landed first.
                tracing::debug!(operation_id = %op.id, "Expiry lost race, skipping");
            }
        }
        Ok(expired)
    }

    /// Sweep on the configured interval until the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        // The first tick fires immediately; skip it so a freshly spawned
        // sweeper does not race test setup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::warn!(error = %err, "Expiry sweep failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Expiry sweeper shutting down");
                    break;
                }
            }
        }
    }
}
