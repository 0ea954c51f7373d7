//! Policy gate.
//!
//! Every mutating remote call is checked against the resource's declared policy. A denied
//! operation is skipped, not retried.

use crate::view::ResourceView;
use crds::EntityPolicy;

/// Whether the resource's policy permits `operation`
#[must_use]
pub fn allows(view: &ResourceView, operation: EntityPolicy) -> bool {
    view.policy.contains(&operation)
}
