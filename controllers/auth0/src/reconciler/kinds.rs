//! Kind capabilities.
//!
//! The five entity kinds share one state machine. What differs between them is captured
//! here: which references they carry, how a pre-existing remote object is found, what a
//! create must contain, which fields are fixed after creation and how payloads are shaped
//! for the Management API.

use crate::error::ReconcileError;
use crate::reconciler::resolver::{IdentityField, Reference};
use crate::view::ResourceView;
use auth0_client::{FindDescriptor, ResourceKind};
use crds::{ClientFind, ConnectionFind};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field of a ClientGrant naming its client
pub const CLIENT_REF: &str = "clientRef";
/// Field of a ClientGrant naming its API
pub const AUDIENCE: &str = "audience";
/// Field naming the owning tenant
pub const TENANT_REF: &str = "tenantRef";

/// One reference a resource carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSlot {
    /// Referencing field
    pub field: &'static str,
    /// Kind referenced
    pub target: ResourceKind,
    /// Identity the reference resolves to
    pub wants: IdentityField,
    pub reference: Reference,
}

/// References declared by a resource
pub fn references(view: &ResourceView) -> Result<Vec<ReferenceSlot>, ReconcileError> {
    let kind = view.key.kind;
    let mut slots = Vec::new();

    if kind != ResourceKind::Tenant {
        let tenant_ref = view
            .tenant_ref
            .as_ref()
            .ok_or_else(|| ReconcileError::InvalidSpec("tenantRef is required".to_string()))?;
        slots.push(ReferenceSlot {
            field: TENANT_REF,
            target: ResourceKind::Tenant,
            wants: IdentityField::Id,
            reference: Reference::from(tenant_ref),
        });
    }

    if kind == ResourceKind::ClientGrant {
        let conf = view.conf.as_ref();
        for (field, target, wants) in [
            (CLIENT_REF, ResourceKind::Client, IdentityField::Id),
            (AUDIENCE, ResourceKind::ResourceServer, IdentityField::Identifier),
        ] {
            if let Some(raw) = conf.and_then(|c| c.get(field)) {
                let reference: Reference = serde_json::from_value(raw.clone())
                    .map_err(|e| ReconcileError::InvalidSpec(format!("{field}: {e}")))?;
                slots.push(ReferenceSlot {
                    field,
                    target,
                    wants,
                    reference,
                });
            }
        }
    }
    Ok(slots)
}

/// Kinds whose changes can unblock or alter resources of `kind`
#[must_use]
pub fn dependency_kinds(kind: ResourceKind) -> &'static [ResourceKind] {
    match kind {
        ResourceKind::Tenant => &[],
        ResourceKind::Client | ResourceKind::Connection | ResourceKind::ResourceServer => {
            &[ResourceKind::Tenant]
        }
        ResourceKind::ClientGrant => &[
            ResourceKind::Tenant,
            ResourceKind::Client,
            ResourceKind::ResourceServer,
        ],
    }
}

/// The declared `conf` with references replaced by resolved identifiers
#[must_use]
pub fn desired_payload(view: &ResourceView, resolved: &BTreeMap<&'static str, String>) -> Map<String, Value> {
    let mut desired = view.conf.clone().unwrap_or_default();
    if view.key.kind == ResourceKind::ClientGrant {
        desired.remove(CLIENT_REF);
        desired.remove(AUDIENCE);
        if let Some(client_id) = resolved.get(CLIENT_REF) {
            desired.insert("client_id".to_string(), Value::String(client_id.clone()));
        }
        if let Some(audience) = resolved.get(AUDIENCE) {
            desired.insert("audience".to_string(), Value::String(audience.clone()));
        }
    }
    desired
}

/// The declared `init`, shaped for a create payload
#[must_use]
pub fn init_payload(view: &ResourceView) -> Option<Map<String, Value>> {
    let mut init = view.init.clone()?;
    if view.key.kind == ResourceKind::ClientGrant {
        init.remove(CLIENT_REF);
        init.remove(AUDIENCE);
    }
    Some(init)
}

fn string_field<'a>(payload: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

/// How to look for a pre-existing remote object before creating one
pub fn find_descriptor(
    view: &ResourceView,
    desired: &Map<String, Value>,
) -> Result<Option<FindDescriptor>, ReconcileError> {
    let by_name = || string_field(desired, "name").map(|n| FindDescriptor::ByName(n.to_string()));
    let find = view.find.clone().map(Value::Object);

    Ok(match view.key.kind {
        ResourceKind::Tenant => Some(FindDescriptor::Tenant),
        ResourceKind::ResourceServer => {
            string_field(desired, "identifier").map(|i| FindDescriptor::ByIdentifier(i.to_string()))
        }
        ResourceKind::Client => {
            let find: ClientFind = find
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| ReconcileError::InvalidSpec(format!("find: {e}")))?
                .unwrap_or_default();
            if let Some(id) = find.client_id {
                Some(FindDescriptor::ById(id))
            } else if let Some(urls) = find.callback_urls.filter(|urls| !urls.is_empty()) {
                Some(FindDescriptor::ByCallbackUrls {
                    urls,
                    mode: find.callback_url_match_mode.unwrap_or_default(),
                })
            } else {
                by_name()
            }
        }
        ResourceKind::Connection => {
            let find: ConnectionFind = find
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| ReconcileError::InvalidSpec(format!("find: {e}")))?
                .unwrap_or_default();
            match find.id {
                Some(id) => Some(FindDescriptor::ById(id)),
                None => by_name(),
            }
        }
        ResourceKind::ClientGrant => {
            match (string_field(desired, "client_id"), string_field(desired, "audience")) {
                (Some(client_id), Some(audience)) => Some(FindDescriptor::ByGrant {
                    client_id: client_id.to_string(),
                    audience: audience.to_string(),
                }),
                _ => None,
            }
        }
    })
}

/// Descriptor used to check that a bound remote object still exists
#[must_use]
pub fn live_descriptor(kind: ResourceKind, id: &str) -> FindDescriptor {
    match kind {
        ResourceKind::Tenant => FindDescriptor::Tenant,
        _ => FindDescriptor::ById(id.to_string()),
    }
}

/// Reject create payloads the Management API would refuse
pub fn validate_create(kind: ResourceKind, payload: &Map<String, Value>) -> Result<(), ReconcileError> {
    let required: &[&str] = match kind {
        ResourceKind::Client => &["app_type"],
        ResourceKind::ClientGrant => &["client_id", "audience", "scope"],
        ResourceKind::Connection => &["name", "strategy"],
        ResourceKind::ResourceServer => &["identifier"],
        ResourceKind::Tenant => &[],
    };
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| payload.get(*field).is_none_or(Value::is_null))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::InvalidSpec(format!(
            "{kind} create requires {}",
            missing.join(", ")
        )))
    }
}

/// Field paths that cannot change once the remote object exists
#[must_use]
pub fn immutable_fields(kind: ResourceKind) -> &'static [&'static [&'static str]] {
    match kind {
        ResourceKind::Tenant => &[&["flags", "enable_sso"]],
        ResourceKind::ClientGrant => &[&["client_id"], &["audience"]],
        ResourceKind::ResourceServer => &[&["identifier"]],
        ResourceKind::Connection => &[&["strategy"]],
        ResourceKind::Client => &[],
    }
}

/// Keys never recorded in `lastConf`
#[must_use]
pub fn snapshot_excludes(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Client => &["client_id", "client_secret"],
        ResourceKind::ResourceServer => &["signing_secret"],
        _ => &[],
    }
}

/// Map-valued fields whose removed keys must be sent as `null`
#[must_use]
pub fn nullable_maps(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Client => &["client_metadata"],
        _ => &[],
    }
}

/// Strip fields the update endpoint does not accept
#[must_use]
pub fn update_payload(kind: ResourceKind, mut delta: Map<String, Value>) -> Map<String, Value> {
    let rejected: &[&str] = match kind {
        ResourceKind::ClientGrant => &["client_id", "audience"],
        ResourceKind::Connection => &["name", "strategy"],
        ResourceKind::ResourceServer => &["identifier"],
        ResourceKind::Client => &["client_id"],
        ResourceKind::Tenant => &[],
    };
    for field in rejected {
        delta.remove(*field);
    }
    delta
}

/// Whether the remote object can be deleted at all
#[must_use]
pub fn deletable(kind: ResourceKind) -> bool {
    kind != ResourceKind::Tenant
}
