//! Operation lifecycle: validates and applies state transitions and
//! progress updates.
//!
//! The transition graph:
//!
//! ```text
//! initial -> running -> {succeeded, failed}
//! running <-> paused
//! {initial, running, paused} -> cancelled
//! ```
//!
//! `succeeded`, `failed`, `cancelled` and `expired` are terminal. `expired`
//! is assigned only by the sweeper; it is never a legal target here.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::catalog::{Catalog, CatalogExt};
use crate::error::{CoordinatorError, Result};
use crate::model::{Operation, OperationId, OperationState};

/// Whether the state machine permits `from -> to` for caller-driven
/// transitions.
pub fn can_transition(from: OperationState, to: OperationState) -> bool {
    use OperationState::*;
    match (from, to) {
        (Initial, Running) => true,
        (Running, Paused) | (Paused, Running) => true,
        (Running, Succeeded) | (Running, Failed) => true,
        (Initial, Cancelled) | (Running, Cancelled) | (Paused, Cancelled) => true,
        _ => false,
    }
}

pub struct OperationStateMachine {
    catalog: Arc<dyn Catalog>,
}

impl OperationStateMachine {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub async fn get(&self, operation_id: &OperationId) -> Result<Operation> {
        Ok(self
            .catalog
            .require_record::<Operation>(operation_id.as_str())
            .await?
            .record)
    }

    /// Replace the progress payload. Permitted only while non-terminal.
    pub async fn update_progress(
        &self,
        operation_id: &OperationId,
        metadata: Value,
    ) -> Result<Operation> {
        let versioned = self
            .catalog
            .require_record::<Operation>(operation_id.as_str())
            .await?;
        let mut op = versioned.record;
        if op.state.is_terminal() {
            return Err(CoordinatorError::InvalidTransition(format!(
                "operation {} is {} and accepts no progress updates",
                op.id, op.state
            )));
        }
        op.progress = metadata;
        op.updated_at = Utc::now();
        self.commit(versioned.version, op).await
    }

    /// Apply a caller-driven state transition. `Succeeded` requires a result
    /// payload and `Failed` an error payload; other targets take none.
    pub async fn transition(
        &self,
        operation_id: &OperationId,
        target: OperationState,
        payload: Option<Value>,
    ) -> Result<Operation> {
        let versioned = self
            .catalog
            .require_record::<Operation>(operation_id.as_str())
            .await?;
        let mut op = versioned.record;

        if !can_transition(op.state, target) {
            return Err(CoordinatorError::InvalidTransition(format!(
                "operation {}: {} -> {} is not a legal edge",
                op.id, op.state, target
            )));
        }

        match target {
            OperationState::Succeeded => {
                op.result = Some(payload.ok_or_else(|| {
                    CoordinatorError::InvalidTransition(format!(
                        "operation {}: succeeded requires a result payload",
                        op.id
                    ))
                })?);
            }
            OperationState::Failed => {
                op.error = Some(payload.ok_or_else(|| {
                    CoordinatorError::InvalidTransition(format!(
                        "operation {}: failed requires an error payload",
                        op.id
                    ))
                })?);
            }
            _ => {}
        }

        let from = op.state;
        op.state = target;
        op.updated_at = Utc::now();
        let op = self.commit(versioned.version, op).await?;
        tracing::info!(operation_id = %op.id, %from, to = %target, "Operation transitioned");
        Ok(op)
    }

    pub async fn pause(&self, operation_id: &OperationId) -> Result<Operation> {
        self.transition(operation_id, OperationState::Paused, None)
            .await
    }

    pub async fn resume(&self, operation_id: &OperationId) -> Result<Operation> {
        self.transition(operation_id, OperationState::Running, None)
            .await
    }

    pub async fn cancel(&self, operation_id: &OperationId) -> Result<Operation> {
        self.transition(operation_id, OperationState::Cancelled, None)
            .await
    }

    /// Conditional write at the version the operation was read at. A failed
    /// swap means a concurrent update (another reporter, or the sweeper)
    /// landed first; the caller must re-read rather than be retried blindly.
    async fn commit(&self, expected_version: u64, op: Operation) -> Result<Operation> {
        if self.catalog.swap_record(expected_version, &op).await? {
            Ok(op)
        } else {
            Err(CoordinatorError::InvalidTransition(format!(
                "operation {} was concurrently modified",
                op.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OperationState::*;

    #[test]
    fn legal_edges() {
        assert!(can_transition(Initial, Running));
        assert!(can_transition(Running, Paused));
        assert!(can_transition(Paused, Running));
        assert!(can_transition(Running, Succeeded));
        assert!(can_transition(Running, Failed));
        assert!(can_transition(Initial, Cancelled));
        assert!(can_transition(Running, Cancelled));
        assert!(can_transition(Paused, Cancelled));
    }

    #[test]
    fn illegal_edges() {
        // No skipping straight to a result.
        assert!(!can_transition(Initial, Succeeded));
        assert!(!can_transition(Initial, Failed));
        assert!(!can_transition(Initial, Paused));
        // No resurrecting a terminal operation.
        for terminal in [Succeeded, Failed, Cancelled, Expired] {
            for target in [Initial, Running, Paused, Succeeded, Failed, Cancelled, Expired] {
                assert!(!can_transition(terminal, target));
            }
        }
        // Expired is the sweeper's alone.
        for from in [Initial, Running, Paused] {
            assert!(!can_transition(from, Expired));
        }
        // No going backwards.
        assert!(!can_transition(Running, Initial));
        assert!(!can_transition(Paused, Initial));
        assert!(!can_transition(Paused, Succeeded));
        assert!(!can_transition(Paused, Failed));
    }
}
