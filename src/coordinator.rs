//! The coordination facade consumed by the (external) request-routing layer.
//!
//! Wires the claim coordinator, operation state machine, trigger engine and
//! expiry sweeper over one shared catalog, and carries the registration
//! surface for workflows, sites, capabilities, content types, triggers and
//! content.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::catalog::memory::MemoryCatalog;
use crate::catalog::{Catalog, CatalogExt, Record};
use crate::claim::ClaimCoordinator;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::model::{
    Capability, Content, ContentId, ContentType, ContentTypeId, Job, JobId, Operation,
    OperationId, OperationState, Site, SiteId, Trigger, Workflow, WorkflowId,
};
use crate::operation::OperationStateMachine;
use crate::sweeper::ExpirySweeper;
use crate::trigger::{AnnotationOutcome, TriggerEngine};

/// A single update request against an operation.
#[derive(Debug, Clone)]
pub enum OperationUpdate {
    /// Replace the progress payload.
    Progress(Value),
    /// Request a state transition, with the result/error payload where the
    /// target requires one.
    Transition {
        target: OperationState,
        payload: Option<Value>,
    },
}

pub struct Coordinator {
    catalog: Arc<dyn Catalog>,
    config: CoordinatorConfig,
    claims: ClaimCoordinator,
    operations: OperationStateMachine,
    triggers: TriggerEngine,
}

impl Coordinator {
    pub fn new(catalog: Arc<dyn Catalog>, config: CoordinatorConfig) -> Self {
        Self {
            claims: ClaimCoordinator::new(Arc::clone(&catalog), config.clone()),
            operations: OperationStateMachine::new(Arc::clone(&catalog)),
            triggers: TriggerEngine::new(Arc::clone(&catalog)),
            catalog,
            config,
        }
    }

    /// Coordinator over a fresh in-memory catalog.
    pub fn in_memory(config: CoordinatorConfig) -> Self {
        Self::new(Arc::new(MemoryCatalog::new()), config)
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // === Registration surface ===

    pub async fn publish_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        self.insert_unique(workflow).await
    }

    pub async fn register_site(&self, site: Site) -> Result<Site> {
        self.insert_unique(site).await
    }

    pub async fn register_capability(&self, capability: Capability) -> Result<Capability> {
        self.insert_unique(capability).await
    }

    pub async fn register_content_type(&self, content_type: ContentType) -> Result<ContentType> {
        self.insert_unique(content_type).await
    }

    /// Register a trigger after checking that both referenced records exist.
    pub async fn register_trigger(&self, trigger: Trigger) -> Result<Trigger> {
        self.catalog
            .require_record::<Workflow>(trigger.workflow_id.as_str())
            .await?;
        self.catalog
            .require_record::<ContentType>(trigger.content_type_id.as_str())
            .await?;
        self.insert_unique(trigger).await
    }

    pub async fn register_content(&self, content: Content) -> Result<Content> {
        self.insert_unique(content).await
    }

    // === Jobs ===

    /// Create a job directly (outside the trigger path), validating the
    /// configuration at the boundary.
    pub async fn create_job(&self, workflow_id: &WorkflowId, config: Value) -> Result<Job> {
        let workflow = self
            .catalog
            .require_record::<Workflow>(workflow_id.as_str())
            .await?
            .record;
        workflow
            .validate_config(&config)
            .map_err(|reason| CoordinatorError::InvalidConfiguration {
                workflow_id: workflow_id.to_string(),
                reason,
            })?;

        let job = Job::new(workflow_id.clone(), config);
        if !self.catalog.insert_record(&job).await? {
            return Err(CoordinatorError::Catalog(format!(
                "job id collision on {}",
                job.id
            )));
        }
        tracing::info!(job_id = %job.id, workflow_id = %workflow_id, "Job created");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &JobId) -> Result<Job> {
        Ok(self
            .catalog
            .require_record::<Job>(job_id.as_str())
            .await?
            .record)
    }

    // === Upward interface ===

    pub async fn list_claimable_jobs(&self, site_id: &SiteId) -> Result<Vec<Job>> {
        self.claims.list_claimable(site_id, 0).await
    }

    pub async fn list_claimable_jobs_page(
        &self,
        site_id: &SiteId,
        page: usize,
    ) -> Result<Vec<Job>> {
        self.claims.list_claimable(site_id, page).await
    }

    pub async fn claim_job(&self, job_id: &JobId, site_id: &SiteId) -> Result<Operation> {
        self.claims.claim(job_id, site_id).await
    }

    pub async fn release_job(&self, job_id: &JobId) -> Result<Job> {
        self.claims.release(job_id).await
    }

    pub async fn get_operation(&self, operation_id: &OperationId) -> Result<Operation> {
        self.operations.get(operation_id).await
    }

    pub async fn update_operation(
        &self,
        operation_id: &OperationId,
        update: OperationUpdate,
    ) -> Result<Operation> {
        match update {
            OperationUpdate::Progress(metadata) => {
                self.operations.update_progress(operation_id, metadata).await
            }
            OperationUpdate::Transition { target, payload } => {
                self.operations.transition(operation_id, target, payload).await
            }
        }
    }

    /// Direct access to the operation state machine for the convenience
    /// wrappers (`pause`, `resume`, `cancel`).
    pub fn operations(&self) -> &OperationStateMachine {
        &self.operations
    }

    // === Annotation events ===

    /// Apply an annotation to registered content, then feed the event to the
    /// trigger engine. Returns the jobs materialized by the event.
    pub async fn annotate_content(
        &self,
        content_id: &ContentId,
        content_type_id: &ContentTypeId,
    ) -> Result<Vec<Job>> {
        self.catalog
            .require_record::<ContentType>(content_type_id.as_str())
            .await?;
        let versioned = self
            .catalog
            .require_record::<Content>(content_id.as_str())
            .await?;
        let mut content = versioned.record;
        if content.types.insert(content_type_id.clone()) {
            if !self.catalog.swap_record(versioned.version, &content).await? {
                return Err(CoordinatorError::Catalog(format!(
                    "content {content_id} was concurrently modified"
                )));
            }
        }
        self.submit_annotation_event(content_id, content_type_id)
            .await
    }

    /// Process one annotation event. Skipped triggers (duplicates,
    /// derivation failures) are logged; callers needing them use
    /// [`Coordinator::handle_annotation_event`].
    pub async fn submit_annotation_event(
        &self,
        content_id: &ContentId,
        content_type_id: &ContentTypeId,
    ) -> Result<Vec<Job>> {
        let outcome = self.handle_annotation_event(content_id, content_type_id).await?;
        if !outcome.skipped.is_empty() {
            tracing::warn!(
                content_id = %content_id,
                content_type_id = %content_type_id,
                skipped = outcome.skipped.len(),
                "Annotation event skipped one or more triggers"
            );
        }
        Ok(outcome.jobs)
    }

    /// Like `submit_annotation_event`, but returns the full per-trigger
    /// outcome including skips.
    pub async fn handle_annotation_event(
        &self,
        content_id: &ContentId,
        content_type_id: &ContentTypeId,
    ) -> Result<AnnotationOutcome> {
        self.triggers.handle_event(content_id, content_type_id).await
    }

    // === Expiry ===

    /// Run one expiry sweep immediately. Returns how many operations were
    /// marked expired.
    pub async fn sweep_expired_operations(&self) -> Result<usize> {
        ExpirySweeper::new(Arc::clone(&self.catalog), self.config.clone())
            .sweep_once()
            .await
    }

    /// Spawn the periodic sweeper; it stops when the token is cancelled.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let sweeper = ExpirySweeper::new(Arc::clone(&self.catalog), self.config.clone());
        tokio::spawn(async move { sweeper.run(shutdown).await })
    }

    async fn insert_unique<R: Record>(&self, record: R) -> Result<R> {
        let id = record.record_id();
        if !self.catalog.insert_record(&record).await? {
            return Err(CoordinatorError::already_exists(R::COLLECTION, id));
        }
        Ok(record)
    }
}
