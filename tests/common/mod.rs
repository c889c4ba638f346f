//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;

use serde_json::{json, Value};

use fedrun::model::{
    Capability, CapabilityId, Content, ContentId, ContentType, ContentTypeId, DerivationRule,
    Site, SiteId, Trigger, TriggerId, Workflow, WorkflowId,
};
use fedrun::{Coordinator, CoordinatorConfig};

pub fn coordinator() -> Coordinator {
    Coordinator::in_memory(CoordinatorConfig::default())
}

pub fn caps(ids: &[&str]) -> BTreeSet<CapabilityId> {
    ids.iter().map(|id| CapabilityId::from(*id)).collect()
}

pub fn workflow(id: &str, required: &[&str], config_keys: &[&str]) -> Workflow {
    Workflow {
        id: WorkflowId::from(id),
        name: format!("workflow {id}"),
        required_capabilities: caps(required),
        config_keys: config_keys.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn site(id: &str, capabilities: &[&str]) -> Site {
    Site {
        id: SiteId::from(id),
        capabilities: caps(capabilities),
        description: None,
        registered_at: chrono::Utc::now(),
    }
}

pub fn capability(id: &str) -> Capability {
    Capability {
        id: CapabilityId::from(id),
        name: id.to_string(),
    }
}

pub fn content_type(id: &str) -> ContentType {
    ContentType {
        id: ContentTypeId::from(id),
        name: id.to_string(),
    }
}

pub fn content(id: &str, metadata: Value) -> Content {
    Content {
        id: ContentId::from(id),
        types: BTreeSet::new(),
        metadata,
    }
}

pub fn trigger(id: &str, content_type_id: &str, workflow_id: &str) -> Trigger {
    Trigger {
        id: TriggerId::from(id),
        content_type_id: ContentTypeId::from(content_type_id),
        workflow_id: WorkflowId::from(workflow_id),
        derivation: DerivationRule::default(),
    }
}

/// Workflow, site, and one unclaimed job with empty requirements.
pub async fn seed_simple_job(coord: &Coordinator) -> fedrun::model::Job {
    coord
        .publish_workflow(workflow("wf-basic", &[], &[]))
        .await
        .unwrap();
    coord.register_site(site("site-a", &[])).await.unwrap();
    coord
        .create_job(&WorkflowId::from("wf-basic"), json!({}))
        .await
        .unwrap()
}
