//! Drift detector.
//!
//! Plans the remote write a resource needs. The plan compares the desired `conf` with the
//! `lastConf` snapshot and consults the remote side only to learn whether a bound object
//! still exists. Fields the declaration does not set are never compared and never sent.

use crate::error::ReconcileError;
use crate::reconciler::kinds;
use auth0_client::{RemoteObject, ResourceKind};
use serde_json::{Map, Value};

/// What is known about the remote counterpart
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// No `status.id` yet; carries the object matched by `find`, if any
    Unbound(Option<RemoteObject>),
    /// `status.id` is set and the object exists
    Live,
    /// `status.id` is set but the object is gone
    Vanished,
}

/// The remote write a resource needs
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Remote state already matches the declaration
    NoOp,
    /// Create from `init` merged under `conf`
    Create {
        /// Create body
        payload: Map<String, Value>,
    },
    /// Bind to a pre-existing object
    Adopt(RemoteObject),
    /// Send only the changed fields
    Update {
        /// Changed top-level fields
        delta: Map<String, Value>,
    },
    /// The bound object vanished and must be created again
    Recreate {
        /// Create body
        payload: Map<String, Value>,
    },
}

impl Plan {
    /// Short name for logs and metrics
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::Create { .. } => "create",
            Self::Adopt(_) => "adopt",
            Self::Update { .. } => "update",
            Self::Recreate { .. } => "recreate",
        }
    }
}

/// Decide the remote write for one resource
///
/// # Arguments
/// * `kind` - Entity kind
/// * `desired` - Declared `conf` with references resolved
/// * `init` - Declared create-only configuration
/// * `last_conf` - Snapshot of the configuration last applied
/// * `observation` - Remote existence check
pub fn plan(
    kind: ResourceKind,
    desired: &Map<String, Value>,
    init: Option<&Map<String, Value>>,
    last_conf: Option<&Map<String, Value>>,
    observation: Observation,
) -> Result<Plan, ReconcileError> {
    match observation {
        Observation::Unbound(Some(found)) => Ok(Plan::Adopt(found)),
        Observation::Unbound(None) => Ok(Plan::Create {
            payload: create_payload(init, desired),
        }),
        Observation::Vanished => Ok(Plan::Recreate {
            payload: create_payload(init, desired),
        }),
        Observation::Live => {
            if let Some(last) = last_conf {
                check_immutable(kind, desired, last)?;
            }
            let delta = diff(kind, desired, last_conf);
            if delta.is_empty() {
                Ok(Plan::NoOp)
            } else {
                Ok(Plan::Update { delta })
            }
        }
    }
}

fn get_path<'a>(doc: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(doc.get(*first)?, |value, segment| value.get(*segment))
}

fn check_immutable(
    kind: ResourceKind,
    desired: &Map<String, Value>,
    last: &Map<String, Value>,
) -> Result<(), ReconcileError> {
    for path in kinds::immutable_fields(kind) {
        if let (Some(before), Some(after)) = (get_path(last, path), get_path(desired, path)) {
            if before != after {
                return Err(ReconcileError::ImmutableField(path.join(".")));
            }
        }
    }
    Ok(())
}

/// The part of `desired` recorded as `lastConf`
#[must_use]
pub fn snapshot(kind: ResourceKind, desired: &Map<String, Value>) -> Map<String, Value> {
    let excluded = kinds::snapshot_excludes(kind);
    desired
        .iter()
        .filter(|(key, _)| !excluded.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Top-level fields of `desired` that differ from `last_conf`.
///
/// Without a snapshot every declared field is part of the delta. Keys removed from a
/// nullable map are sent as `null` inside the map so the remote drops them.
#[must_use]
pub fn diff(
    kind: ResourceKind,
    desired: &Map<String, Value>,
    last_conf: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let comparable = snapshot(kind, desired);
    let Some(last) = last_conf else {
        return comparable;
    };

    let nullable = kinds::nullable_maps(kind);
    let mut delta = Map::new();
    for (key, value) in comparable {
        let previous = last.get(&key);
        if previous == Some(&value) {
            continue;
        }
        let value = match (previous, value) {
            (Some(Value::Object(before)), Value::Object(mut after)) if nullable.contains(&key.as_str()) => {
                for removed in before.keys() {
                    if !after.contains_key(removed) {
                        after.insert(removed.clone(), Value::Null);
                    }
                }
                Value::Object(after)
            }
            (_, value) => value,
        };
        delta.insert(key, value);
    }
    delta
}

/// `conf` deep-merged over `init`; `conf` wins on conflicts
#[must_use]
pub fn create_payload(
    init: Option<&Map<String, Value>>,
    desired: &Map<String, Value>,
) -> Map<String, Value> {
    let mut payload = init.cloned().unwrap_or_default();
    merge_into(&mut payload, desired);
    payload
}

fn merge_into(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unbound_without_match_creates() {
        let desired = map(json!({"name": "web", "app_type": "spa"}));
        let init = map(json!({"logo_uri": "https://logo", "name": "placeholder"}));
        let planned = plan(ResourceKind::Client, &desired, Some(&init), None, Observation::Unbound(None)).unwrap();
        assert_eq!(
            planned,
            Plan::Create {
                payload: map(json!({"logo_uri": "https://logo", "name": "web", "app_type": "spa"}))
            }
        );
    }

    #[test]
    fn test_unbound_with_match_adopts() {
        let found = RemoteObject {
            id: "cl_1".to_string(),
            identifier: None,
            state: json!({"client_id": "cl_1"}),
        };
        let planned = plan(
            ResourceKind::Client,
            &Map::new(),
            None,
            None,
            Observation::Unbound(Some(found.clone())),
        )
        .unwrap();
        assert_eq!(planned, Plan::Adopt(found));
    }

    #[test]
    fn test_unchanged_conf_is_noop() {
        let desired = map(json!({"friendly_name": "Acme"}));
        let planned = plan(ResourceKind::Tenant, &desired, None, Some(&desired), Observation::Live).unwrap();
        assert_eq!(planned, Plan::NoOp);
    }

    #[test]
    fn test_changed_field_only_in_delta() {
        let last = map(json!({"friendly_name": "Acme", "support_email": "a@acme.io"}));
        let desired = map(json!({"friendly_name": "Acme Corp", "support_email": "a@acme.io"}));
        let planned = plan(ResourceKind::Tenant, &desired, None, Some(&last), Observation::Live).unwrap();
        assert_eq!(
            planned,
            Plan::Update {
                delta: map(json!({"friendly_name": "Acme Corp"}))
            }
        );
    }

    #[test]
    fn test_field_dropped_from_conf_is_never_sent() {
        let last = map(json!({"name": "web", "description": "old"}));
        let desired = map(json!({"name": "web"}));
        assert_eq!(
            plan(ResourceKind::Client, &desired, None, Some(&last), Observation::Live).unwrap(),
            Plan::NoOp
        );
    }

    #[test]
    fn test_missing_snapshot_sends_full_conf() {
        let desired = map(json!({"name": "web", "callbacks": ["https://a"]}));
        assert_eq!(diff(ResourceKind::Client, &desired, None), desired);
    }

    #[test]
    fn test_vanished_recreates() {
        let desired = map(json!({"name": "API", "identifier": "https://api"}));
        let planned = plan(
            ResourceKind::ResourceServer,
            &desired,
            None,
            Some(&desired),
            Observation::Vanished,
        )
        .unwrap();
        assert_eq!(planned, Plan::Recreate { payload: desired });
    }

    #[test]
    fn test_immutable_field_change_is_rejected() {
        let last = map(json!({"name": "API", "identifier": "https://api"}));
        let desired = map(json!({"name": "API", "identifier": "https://api/v2"}));
        let err = plan(ResourceKind::ResourceServer, &desired, None, Some(&last), Observation::Live).unwrap_err();
        assert!(matches!(err, ReconcileError::ImmutableField(path) if path == "identifier"));
    }

    #[test]
    fn test_nested_immutable_field() {
        let last = map(json!({"flags": {"enable_sso": true, "other": 1}}));
        let desired = map(json!({"flags": {"enable_sso": false, "other": 1}}));
        assert!(plan(ResourceKind::Tenant, &desired, None, Some(&last), Observation::Live).is_err());

        let desired = map(json!({"flags": {"enable_sso": true, "other": 2}}));
        assert!(plan(ResourceKind::Tenant, &desired, None, Some(&last), Observation::Live).is_ok());
    }

    #[test]
    fn test_removed_metadata_keys_are_nulled() {
        let last = map(json!({"client_metadata": {"team": "core", "tier": "gold"}}));
        let desired = map(json!({"client_metadata": {"team": "core"}}));
        assert_eq!(
            diff(ResourceKind::Client, &desired, Some(&last)),
            map(json!({"client_metadata": {"team": "core", "tier": null}}))
        );
    }

    #[test]
    fn test_snapshot_excludes_secrets() {
        let desired = map(json!({"name": "API", "signing_secret": "s3cret"}));
        assert_eq!(snapshot(ResourceKind::ResourceServer, &desired), map(json!({"name": "API"})));
        assert_eq!(
            diff(ResourceKind::ResourceServer, &desired, Some(&map(json!({"name": "API"})))),
            Map::new()
        );
    }

    #[test]
    fn test_passthrough_documents_compare_structurally() {
        let last = map(json!({"addons": {"samlp": {"audience": "x", "mappings": {"a": 1}}}}));
        let desired = map(json!({"addons": {"samlp": {"mappings": {"a": 1}, "audience": "x"}}}));
        assert_eq!(diff(ResourceKind::Client, &desired, Some(&last)), Map::new());
    }

    #[test]
    fn test_create_payload_merges_nested() {
        let init = map(json!({"options": {"mfa": true, "brute_force": true}}));
        let desired = map(json!({"options": {"mfa": false}}));
        assert_eq!(
            create_payload(Some(&init), &desired),
            map(json!({"options": {"mfa": false, "brute_force": true}}))
        );
    }
}
