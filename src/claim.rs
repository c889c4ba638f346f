//! Claim coordination: matching sites to claimable jobs and granting at
//! most one claim per job under concurrent attempts.
//!
//! Mutual exclusion is optimistic: a claim is a single compare-and-swap on
//! the job document, so exactly one concurrent caller wins and the rest get
//! an immediate [`CoordinatorError::ClaimConflict`] instead of blocking.
//! Losers are expected to re-list claimable jobs, not to retry the same
//! claim.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability;
use crate::catalog::{Catalog, CatalogExt};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::model::{Job, JobId, JobStatus, Operation, Site, SiteId, Workflow, WorkflowId};

pub struct ClaimCoordinator {
    catalog: Arc<dyn Catalog>,
    config: CoordinatorConfig,
}

impl ClaimCoordinator {
    pub fn new(catalog: Arc<dyn Catalog>, config: CoordinatorConfig) -> Self {
        Self { catalog, config }
    }

    /// Unclaimed jobs whose workflow requirements the site satisfies,
    /// ordered by creation time (id as tiebreaker) and paged by the
    /// configured page size. Page numbering starts at 0.
    pub async fn list_claimable(&self, site_id: &SiteId, page: usize) -> Result<Vec<Job>> {
        let site = self
            .catalog
            .require_record::<Site>(site_id.as_str())
            .await?;

        let unclaimed = self
            .catalog
            .find_records::<Job>(&|body| body["status"] == "unclaimed")
            .await?;

        // One workflow lookup per distinct workflow id, not per job.
        let mut workflows: HashMap<WorkflowId, Workflow> = HashMap::new();
        let mut claimable = Vec::new();
        for versioned in unclaimed {
            let job = versioned.record;
            if !workflows.contains_key(&job.workflow_id) {
                let fetched = self
                    .catalog
                    .require_record::<Workflow>(job.workflow_id.as_str())
                    .await?
                    .record;
                workflows.insert(job.workflow_id.clone(), fetched);
            }
            let workflow = &workflows[&job.workflow_id];
            if capability::satisfies(&workflow.required_capabilities, &site.record.capabilities) {
                claimable.push(job);
            }
        }

        claimable.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(claimable
            .into_iter()
            .skip(page * self.config.page_size)
            .take(self.config.page_size)
            .collect())
    }

    /// Attempt to claim a job for a site. On success a fresh operation in
    /// state `initial` is created and returned.
    ///
    /// Capabilities are re-checked here, not only at listing time, to close
    /// the window where a site drops a capability between listing and
    /// claiming.
    pub async fn claim(&self, job_id: &JobId, site_id: &SiteId) -> Result<Operation> {
        let site = self
            .catalog
            .require_record::<Site>(site_id.as_str())
            .await?
            .record;

        let Some(versioned) = self.catalog.get_record::<Job>(job_id.as_str()).await? else {
            return Err(CoordinatorError::ClaimConflict(job_id.to_string()));
        };
        let mut job = versioned.record;
        if job.status == JobStatus::Claimed {
            return Err(CoordinatorError::ClaimConflict(job_id.to_string()));
        }

        let workflow = self
            .catalog
            .require_record::<Workflow>(job.workflow_id.as_str())
            .await?
            .record;
        if !capability::satisfies(&workflow.required_capabilities, &site.capabilities) {
            return Err(CoordinatorError::CapabilityMismatch {
                site_id: site_id.to_string(),
                workflow_id: workflow.id.to_string(),
            });
        }

        job.status = JobStatus::Claimed;
        job.claimed_by = Some(site_id.clone());
        if !self.catalog.swap_record(versioned.version, &job).await? {
            // Another site's claim landed between our read and our swap.
            return Err(CoordinatorError::ClaimConflict(job_id.to_string()));
        }

        let operation = Operation::new(job_id.clone(), site_id.clone());
        if !self.catalog.insert_record(&operation).await? {
            return Err(CoordinatorError::Catalog(format!(
                "operation id collision on {}",
                operation.id
            )));
        }
        tracing::info!(
            job_id = %job_id,
            site_id = %site_id,
            operation_id = %operation.id,
            "Job claimed"
        );
        Ok(operation)
    }

    /// Administrative reopening of a claimed job. Refused while any
    /// operation for the job is still active; an expired or otherwise
    /// terminal operation does not reopen its job automatically.
    pub async fn release(&self, job_id: &JobId) -> Result<Job> {
        let versioned = self.catalog.require_record::<Job>(job_id.as_str()).await?;
        let mut job = versioned.record;
        if job.status == JobStatus::Unclaimed {
            return Err(CoordinatorError::InvalidTransition(format!(
                "job {job_id} is not claimed"
            )));
        }

        let id_value = serde_json::Value::String(job_id.to_string());
        let operations = self
            .catalog
            .find_records::<Operation>(&|body| body["job_id"] == id_value)
            .await?;
        if let Some(active) = operations
            .iter()
            .find(|op| !op.record.state.is_terminal())
        {
            return Err(CoordinatorError::InvalidTransition(format!(
                "job {job_id} has active operation {} in state {}",
                active.record.id, active.record.state
            )));
        }

        job.status = JobStatus::Unclaimed;
        job.claimed_by = None;
        if !self.catalog.swap_record(versioned.version, &job).await? {
            return Err(CoordinatorError::ClaimConflict(job_id.to_string()));
        }
        tracing::info!(job_id = %job_id, "Job released for reclaim");
        Ok(job)
    }
}
