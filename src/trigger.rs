//! Annotation-driven job materialization.
//!
//! Consumes content-annotation events and creates jobs for every trigger
//! registered against the annotated content type. Creation is idempotent
//! per (content, trigger) pair: a marker document is reserved with
//! insert-if-absent semantics before the job is written, so at-least-once
//! event delivery never materializes the same job twice.

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::{Catalog, CatalogExt};
use crate::error::{CoordinatorError, Result};
use crate::model::{
    Content, ContentId, ContentTypeId, Job, Trigger, TriggerId, TriggerMaterialization, Workflow,
};

/// Per-event result: the jobs created, plus the triggers that matched but
/// were skipped (duplicate materialization or a derivation failure). Skips
/// never halt processing of the remaining triggers.
#[derive(Debug, Default)]
pub struct AnnotationOutcome {
    pub jobs: Vec<Job>,
    pub skipped: Vec<SkippedTrigger>,
}

#[derive(Debug)]
pub struct SkippedTrigger {
    pub trigger_id: TriggerId,
    pub reason: CoordinatorError,
}

pub struct TriggerEngine {
    catalog: Arc<dyn Catalog>,
}

impl TriggerEngine {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Handle one content-annotation event: evaluate every trigger
    /// registered for the annotated content type and materialize jobs.
    pub async fn handle_event(
        &self,
        content_id: &ContentId,
        content_type_id: &ContentTypeId,
    ) -> Result<AnnotationOutcome> {
        let content = self
            .catalog
            .require_record::<Content>(content_id.as_str())
            .await?
            .record;

        let type_value = Value::String(content_type_id.to_string());
        let triggers = self
            .catalog
            .find_records::<Trigger>(&|body| body["content_type_id"] == type_value)
            .await?;

        let mut outcome = AnnotationOutcome::default();
        for versioned in triggers {
            let trigger = versioned.record;
            match self.materialize(&content, &trigger).await {
                Ok(job) => outcome.jobs.push(job),
                Err(reason) if reason.is_trigger_skip() => {
                    tracing::debug!(
                        content_id = %content_id,
                        trigger_id = %trigger.id,
                        %reason,
                        "Trigger skipped"
                    );
                    outcome.skipped.push(SkippedTrigger {
                        trigger_id: trigger.id,
                        reason,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }

    /// Create the job for one (content, trigger) pair, reserving the
    /// idempotency marker first so a concurrent redelivery loses cleanly.
    async fn materialize(&self, content: &Content, trigger: &Trigger) -> Result<Job> {
        let key = TriggerMaterialization::key(&content.id, &trigger.id);
        if self
            .catalog
            .get_record::<TriggerMaterialization>(&key)
            .await?
            .is_some()
        {
            return Err(CoordinatorError::TriggerDuplicate {
                content_id: content.id.to_string(),
                trigger_id: trigger.id.to_string(),
            });
        }

        let config = derive_config(trigger, content)?;
        let workflow = self
            .catalog
            .require_record::<Workflow>(trigger.workflow_id.as_str())
            .await?
            .record;
        validate_config(&trigger.id, &workflow, &config)?;

        let job = Job::new(workflow.id.clone(), config);
        let marker =
            TriggerMaterialization::new(content.id.clone(), trigger.id.clone(), job.id.clone());
        if !self.catalog.insert_record(&marker).await? {
            // Lost the reservation race to a concurrent delivery.
            return Err(CoordinatorError::TriggerDuplicate {
                content_id: content.id.to_string(),
                trigger_id: trigger.id.to_string(),
            });
        }
        if !self.catalog.insert_record(&job).await? {
            return Err(CoordinatorError::Catalog(format!(
                "job id collision on {}",
                job.id
            )));
        }

        tracing::info!(
            content_id = %content.id,
            trigger_id = %trigger.id,
            workflow_id = %workflow.id,
            job_id = %job.id,
            "Job materialized from annotation"
        );
        Ok(job)
    }
}

/// Build the new job's configuration from the trigger's derivation rule:
/// literal template values, then metadata bindings, then the content id.
pub fn derive_config(trigger: &Trigger, content: &Content) -> Result<Value> {
    let mut config = trigger.derivation.template.clone();
    for (key, pointer) in &trigger.derivation.bindings {
        let value = content.metadata.pointer(pointer).ok_or_else(|| {
            CoordinatorError::ConfigDerivation {
                trigger_id: trigger.id.to_string(),
                reason: format!("content {} metadata has no value at {pointer}", content.id),
            }
        })?;
        config.insert(key.clone(), value.clone());
    }
    config.insert(
        "content_id".to_string(),
        Value::String(content.id.to_string()),
    );
    Ok(Value::Object(config))
}

fn validate_config(trigger_id: &TriggerId, workflow: &Workflow, config: &Value) -> Result<()> {
    workflow
        .validate_config(config)
        .map_err(|reason| CoordinatorError::ConfigDerivation {
            trigger_id: trigger_id.to_string(),
            reason: format!("{reason} (required by workflow {})", workflow.id),
        })
}
