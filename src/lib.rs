//! Federated workflow-job coordination.
//!
//! A central authority publishes jobs (workflow templates bound to concrete
//! configuration), independently operated sites claim the jobs their
//! declared capabilities allow, and the authority tracks each claimed
//! execution as an operation from claim through completion, failure, or
//! expiry. An automation layer watches content annotations and materializes
//! new jobs, exactly once per (content, trigger) pair.
//!
//! All coordination happens through single-document compare-and-swap on the
//! [`catalog::Catalog`] port; there are no multi-record transactions and no
//! held locks. The [`coordinator::Coordinator`] facade is the entry point.

pub mod capability;
pub mod catalog;
pub mod claim;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod operation;
pub mod sweeper;
pub mod trigger;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, OperationUpdate};
pub use error::{CoordinatorError, Result};
