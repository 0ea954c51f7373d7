//! Connection membership by label.
//!
//! An A0Client labelled `auth0.kubernetes.com/connection` is enabled on the named
//! A0Connection once it has a remote id. The value is `<namespace>.<name>`, the
//! label-safe `<namespace>_<name>`, or a bare `<name>` in the client's own namespace.

use crate::view::{ResourceKey, ResourceView};
use auth0_client::ResourceKind;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Label naming the connection a client joins
pub const CONNECTION_LABEL: &str = "auth0.kubernetes.com/connection";

/// Field of a connection payload listing its enabled client ids
pub const ENABLED_CLIENTS: &str = "enabled_clients";

/// Connection targeted by a label value, relative to the labelled object's namespace
#[must_use]
pub fn connection_target(value: &str, namespace: &str) -> Option<ResourceKey> {
    let value = value.trim();
    let (ns, name) = match value.split_once('.').or_else(|| value.split_once('_')) {
        Some((ns, name)) => (ns, name),
        None => (namespace, value),
    };
    if ns.is_empty() || name.is_empty() {
        return None;
    }
    Some(ResourceKey::new(ResourceKind::Connection, ns, name))
}

/// Connection a client's label points at
#[must_use]
pub fn labelled_connection(client: &ResourceView) -> Option<ResourceKey> {
    let value = client.labels.get(CONNECTION_LABEL)?;
    connection_target(value, &client.key.namespace)
}

/// Remote ids of the clients labelled onto `connection`, sorted
#[must_use]
pub fn labelled_client_ids(connection: &ResourceKey, clients: &[ResourceView]) -> BTreeSet<String> {
    clients
        .iter()
        .filter(|client| labelled_connection(client).as_ref() == Some(connection))
        .filter_map(|client| client.status.id.clone())
        .collect()
}

fn id_list(value: Option<&Value>) -> impl Iterator<Item = String> + '_ {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
}

/// Merge labelled client ids into a connection payload.
///
/// The declared `enabled_clients` are kept. The field is only managed once something
/// asks for it: a declaration, a labelled client, or a previous run that sent it, so a
/// client losing its label is also removed remotely.
pub fn merge_enabled_clients(
    desired: &mut Map<String, Value>,
    labelled: BTreeSet<String>,
    last_conf: Option<&Map<String, Value>>,
) {
    let managed = desired.contains_key(ENABLED_CLIENTS)
        || !labelled.is_empty()
        || last_conf.is_some_and(|last| last.contains_key(ENABLED_CLIENTS));
    if !managed {
        return;
    }
    let mut ids = labelled;
    ids.extend(id_list(desired.get(ENABLED_CLIENTS)));
    desired.insert(
        ENABLED_CLIENTS.to_string(),
        Value::Array(ids.into_iter().map(Value::String).collect()),
    );
}

/// Connections to requeue when `client` changes: the one it is labelled onto and every
/// connection that last sent its id.
#[must_use]
pub fn affected_connections(client: &ResourceView, connections: &[ResourceView]) -> Vec<ResourceKey> {
    let target = labelled_connection(client);
    connections
        .iter()
        .filter(|connection| {
            Some(&connection.key) == target.as_ref()
                || client.status.id.as_ref().is_some_and(|id| {
                    let last = connection.status.last_conf.as_ref().map(|doc| doc.as_map());
                    id_list(last.and_then(|l| l.get(ENABLED_CLIENTS))).any(|sent| &sent == id)
                })
        })
        .map(|connection| connection.key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::view_builder;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn connection(ns: &str, name: &str) -> ResourceKey {
        ResourceKey::new(ResourceKind::Connection, ns, name)
    }

    #[test]
    fn test_connection_target_forms() {
        assert_eq!(connection_target("identity.db", "default"), Some(connection("identity", "db")));
        assert_eq!(connection_target("identity_db", "default"), Some(connection("identity", "db")));
        assert_eq!(connection_target("db", "apps"), Some(connection("apps", "db")));
        assert_eq!(connection_target("", "apps"), None);
        assert_eq!(connection_target(".db", "apps"), None);
    }

    #[test]
    fn test_labelled_client_ids_skip_unbound_and_other_targets() {
        let clients = vec![
            view_builder(ResourceKind::Client, "web")
                .label(CONNECTION_LABEL, "default.db")
                .status_id("cl_web")
                .build(),
            view_builder(ResourceKind::Client, "cli")
                .label(CONNECTION_LABEL, "db")
                .status_id("cl_cli")
                .build(),
            view_builder(ResourceKind::Client, "pending")
                .label(CONNECTION_LABEL, "db")
                .build(),
            view_builder(ResourceKind::Client, "other")
                .label(CONNECTION_LABEL, "default.google")
                .status_id("cl_other")
                .build(),
            view_builder(ResourceKind::Client, "plain").status_id("cl_plain").build(),
        ];

        let ids = labelled_client_ids(&connection("default", "db"), &clients);
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["cl_cli", "cl_web"]);
    }

    #[test]
    fn test_merge_keeps_declared_clients() {
        let mut desired = map(json!({"name": "db", "enabled_clients": ["cl_b", "cl_static"]}));
        merge_enabled_clients(&mut desired, BTreeSet::from(["cl_a".to_string(), "cl_b".to_string()]), None);
        assert_eq!(desired[ENABLED_CLIENTS], json!(["cl_a", "cl_b", "cl_static"]));
    }

    #[test]
    fn test_merge_leaves_unmanaged_connection_alone() {
        let mut desired = map(json!({"name": "db"}));
        merge_enabled_clients(&mut desired, BTreeSet::new(), Some(&map(json!({"name": "db"}))));
        assert!(!desired.contains_key(ENABLED_CLIENTS));
    }

    #[test]
    fn test_merge_clears_after_last_label_removed() {
        let mut desired = map(json!({"name": "db"}));
        let last = map(json!({"name": "db", "enabled_clients": ["cl_web"]}));
        merge_enabled_clients(&mut desired, BTreeSet::new(), Some(&last));
        assert_eq!(desired[ENABLED_CLIENTS], json!([]));
    }

    #[test]
    fn test_affected_connections_include_previous_membership() {
        let connections = vec![
            view_builder(ResourceKind::Connection, "db").build(),
            view_builder(ResourceKind::Connection, "google")
                .last_conf(json!({"name": "google", "enabled_clients": ["cl_web"]}))
                .build(),
            view_builder(ResourceKind::Connection, "github").build(),
        ];
        let client = view_builder(ResourceKind::Client, "web")
            .label(CONNECTION_LABEL, "db")
            .status_id("cl_web")
            .build();

        let affected = affected_connections(&client, &connections);
        assert_eq!(affected, vec![connection("default", "db"), connection("default", "google")]);
    }
}
