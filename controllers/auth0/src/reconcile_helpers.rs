//! Helper functions for status and event bookkeeping
//!
//! Every status the reconciler writes is built here from the status it read, so a write
//! only ever changes the fields the outcome is about.

use crds::{CONDITION_FAILING, CONDITION_READY, EntityStatus, PassthroughDocument, StatusCondition};
use serde_json::{Map, Value};

// Ready condition reasons
pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_BLOCKED: &str = "Blocked";
pub const REASON_PERMANENT_ERROR: &str = "PermanentError";
pub const REASON_RETRYING: &str = "Retrying";
pub const REASON_RATE_LIMITED: &str = "RateLimited";
pub const REASON_POLICY_DENIED: &str = "PolicyDenied";

/// Failing condition reason
pub const REASON_REPEATEDLY_FAILING: &str = "RepeatedlyFailing";

// Event reasons
pub const EVENT_SUCCESS: &str = "Success";
pub const EVENT_API_ERROR: &str = "ApiError";
pub const EVENT_RATE_LIMIT: &str = "RateLimit";
pub const EVENT_RETRY: &str = "Retry";
pub const EVENT_DELETING: &str = "Deleting";

fn clear_failing(status: &mut EntityStatus) {
    status.conditions.retain(|c| c.type_ != CONDITION_FAILING);
}

/// Status after a confirmed remote write: identity, snapshot and Ready in one update
#[must_use]
pub fn applied_status(
    current: &EntityStatus,
    id: &str,
    identifier: Option<String>,
    last_conf: Map<String, Value>,
    generation: Option<i64>,
) -> EntityStatus {
    let mut status = current.clone();
    status.id = Some(id.to_string());
    if identifier.is_some() {
        status.identifier = identifier;
    }
    status.last_conf = Some(PassthroughDocument(last_conf));
    status.observed_generation = generation;
    status.set_condition(StatusCondition::new(CONDITION_READY, true, REASON_RECONCILED, None));
    clear_failing(&mut status);
    status
}

/// Status binding an adopted remote object. The snapshot is dropped so the next plan
/// enforces the full declaration.
#[must_use]
pub fn bound_status(current: &EntityStatus, id: &str, identifier: Option<String>) -> EntityStatus {
    let mut status = current.clone();
    status.id = Some(id.to_string());
    status.identifier = identifier;
    status.last_conf = None;
    status
}

/// Status of a resource that needs no remote write
#[must_use]
pub fn settled_status(
    current: &EntityStatus,
    ready: bool,
    reason: &str,
    message: Option<String>,
    generation: Option<i64>,
) -> EntityStatus {
    let mut status = current.clone();
    status.observed_generation = generation;
    status.set_condition(StatusCondition::new(CONDITION_READY, ready, reason, message));
    clear_failing(&mut status);
    status
}

/// Status after a failed reconciliation.
///
/// `failing` is `Some(true)` once failures outlived the staleness budget, `Some(false)`
/// while they have not, and `None` when the failure does not count towards it.
#[must_use]
pub fn failed_status(
    current: &EntityStatus,
    reason: &str,
    message: String,
    failing: Option<bool>,
) -> EntityStatus {
    let mut status = current.clone();
    status.set_condition(StatusCondition::new(CONDITION_READY, false, reason, Some(message.clone())));
    match failing {
        Some(true) => status.set_condition(StatusCondition::new(
            CONDITION_FAILING,
            true,
            REASON_REPEATEDLY_FAILING,
            Some(message),
        )),
        Some(false) => clear_failing(&mut status),
        None => {}
    }
    status
}

/// Whether writing `next` over `current` changes anything but the reconcile timestamp
#[must_use]
pub fn status_needs_update(current: &EntityStatus, next: &EntityStatus) -> bool {
    let mut current = current.clone();
    current.last_reconcile_time = next.last_reconcile_time;
    current != *next
}

/// Stamp the reconcile time on a status that is about to be written
#[must_use]
pub fn stamped(mut status: EntityStatus) -> EntityStatus {
    status.last_reconcile_time = Some(chrono::Utc::now());
    status
}
