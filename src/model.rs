//! Catalog record types shared across the coordination core.
//!
//! Everything here is a plain serde document. Records referencing other
//! records do so by typed identifier, never by embedded copy, so that a
//! single-document compare-and-swap is always a complete update.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

entity_id!(WorkflowId);
entity_id!(JobId);
entity_id!(OperationId);
entity_id!(SiteId);
entity_id!(CapabilityId);
entity_id!(ContentTypeId);
entity_id!(TriggerId);
entity_id!(ContentId);

impl JobId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl OperationId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A workflow template: what a job of this kind requires of a site, and
/// which configuration keys a concrete job must supply.
///
/// Workflows are immutable once published; a new revision gets a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub required_capabilities: BTreeSet<CapabilityId>,
    /// Keys that must be present in a job's configuration. The in-core
    /// validation boundary; deeper schema validation is an external concern.
    pub config_keys: BTreeSet<String>,
}

impl Workflow {
    /// Check a configuration against this workflow's required keys,
    /// returning the first missing key.
    pub fn validate_config(&self, config: &Value) -> std::result::Result<(), String> {
        for key in &self.config_keys {
            if config.get(key).is_none() {
                return Err(format!("missing required configuration key {key}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Unclaimed,
    Claimed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Unclaimed => write!(f, "unclaimed"),
            JobStatus::Claimed => write!(f, "claimed"),
        }
    }
}

/// A workflow bound to concrete configuration, awaiting or under claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub workflow_id: WorkflowId,
    pub config: Value,
    pub status: JobStatus,
    pub claimed_by: Option<SiteId>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(workflow_id: WorkflowId, config: Value) -> Self {
        Self {
            id: JobId::mint(),
            workflow_id,
            config,
            status: JobStatus::Unclaimed,
            claimed_by: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Initial,
    Running,
    Paused,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl OperationState {
    /// Terminal states accept no further progress updates or transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Failed
                | OperationState::Cancelled
                | OperationState::Expired
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Initial => write!(f, "initial"),
            OperationState::Running => write!(f, "running"),
            OperationState::Paused => write!(f, "paused"),
            OperationState::Succeeded => write!(f, "succeeded"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::Cancelled => write!(f, "cancelled"),
            OperationState::Expired => write!(f, "expired"),
        }
    }
}

/// The tracked lifecycle of one claimed execution of a job.
///
/// The `site_id` is fixed at creation; re-executing a job after release
/// produces a fresh operation rather than rebinding this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub job_id: JobId,
    pub site_id: SiteId,
    pub state: OperationState,
    /// Opaque job-type-specific progress payload, replaced wholesale on
    /// each update.
    pub progress: Value,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(job_id: JobId, site_id: SiteId) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::mint(),
            job_id,
            site_id,
            state: OperationState::Initial,
            progress: Value::Null,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An execution agent. Capabilities are self-declared by the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub capabilities: BTreeSet<CapabilityId>,
    pub description: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// A named precondition referenced by workflows (requirements) and sites
/// (possessions). The core attaches no semantics to what a capability does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub name: String,
}

/// An annotation type applied to content, useful for triggering workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentType {
    pub id: ContentTypeId,
    pub name: String,
}

/// How a matching content's metadata maps to a new job's configuration.
///
/// `template` supplies literal values; `bindings` maps configuration keys to
/// JSON pointers resolved against the content's metadata. The matched
/// content's id is always injected under `content_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivationRule {
    #[serde(default)]
    pub template: serde_json::Map<String, Value>,
    #[serde(default)]
    pub bindings: std::collections::BTreeMap<String, String>,
}

/// An association between a content-annotation type and a workflow, used to
/// auto-materialize jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub content_type_id: ContentTypeId,
    pub workflow_id: WorkflowId,
    pub derivation: DerivationRule,
}

/// Externally managed data artifact; the core only observes annotations on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub types: BTreeSet<ContentTypeId>,
    pub metadata: Value,
}

/// Idempotency marker recording that a (content, trigger) pair has already
/// materialized a job. Keyed by a hash of the pair so redelivered annotation
/// events find the prior materialization instead of creating a second job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerMaterialization {
    pub id: String,
    pub content_id: ContentId,
    pub trigger_id: TriggerId,
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
}

impl TriggerMaterialization {
    /// Hash of the (content, trigger) pair, hex-truncated to 40 chars for a
    /// flat marker namespace. The source ids are stored alongside so a
    /// lookup can verify it found the pair it asked for.
    pub fn key(content_id: &ContentId, trigger_id: &TriggerId) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(content_id.as_str().as_bytes());
        hasher.update(b"\x00");
        hasher.update(trigger_id.as_str().as_bytes());
        let hash = hasher.finalize();
        let mut out = String::with_capacity(40);
        for byte in &hash[..20] {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn new(content_id: ContentId, trigger_id: TriggerId, job_id: JobId) -> Self {
        Self {
            id: Self::key(&content_id, &trigger_id),
            content_id,
            trigger_id,
            job_id,
            created_at: Utc::now(),
        }
    }
}
