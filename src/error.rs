use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Claim conflict on job {0}: already claimed or lost the race")]
    ClaimConflict(String),

    #[error("Site {site_id} lacks capabilities required by workflow {workflow_id}")]
    CapabilityMismatch {
        site_id: String,
        workflow_id: String,
    },

    #[error("Invalid operation transition: {0}")]
    InvalidTransition(String),

    #[error("Job already materialized for content {content_id} and trigger {trigger_id}")]
    TriggerDuplicate {
        content_id: String,
        trigger_id: String,
    },

    #[error("Configuration derivation failed for trigger {trigger_id}: {reason}")]
    ConfigDerivation { trigger_id: String, reason: String },

    #[error("Configuration invalid for workflow {workflow_id}: {reason}")]
    InvalidConfiguration {
        workflow_id: String,
        reason: String,
    },

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl CoordinatorError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// True for the per-event trigger outcomes that are reported and skipped
    /// rather than halting an annotation event stream.
    pub fn is_trigger_skip(&self) -> bool {
        matches!(
            self,
            Self::TriggerDuplicate { .. } | Self::ConfigDerivation { .. }
        )
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Catalog(format!("document (de)serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
