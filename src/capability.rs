//! Capability matching between workflow requirements and site declarations.

use std::collections::BTreeSet;

use crate::model::CapabilityId;

/// True iff every required capability is possessed. Pure set inclusion; an
/// empty requirement set matches any site.
pub fn satisfies(required: &BTreeSet<CapabilityId>, possessed: &BTreeSet<CapabilityId>) -> bool {
    required.is_subset(possessed)
}
