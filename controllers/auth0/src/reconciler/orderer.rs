//! Dependency orderer.
//!
//! Before a resource is planned, every local resource it references (transitively) is
//! read into a [`DependencyGraph`]. The graph is checked for cycles and the resource's
//! own references are resolved against it. A reference whose target has no remote
//! identity yet makes the resource [`Readiness::Blocked`]; blocked resources are requeued
//! rather than failed.

use crate::error::{ReconcileError, StoreError};
use crate::reconciler::kinds::{self, TENANT_REF};
use crate::reconciler::resolver::{
    self, ReferenceLookup, Resolution, ResolveError, local_key, needs_lookup,
};
use crate::store::ObjectStore;
use crate::view::{ResourceKey, ResourceView};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Snapshot of a resource and the local resources it depends on
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    views: BTreeMap<ResourceKey, ResourceView>,
}

impl DependencyGraph {
    /// Build a graph from already fetched views
    pub fn from_views(views: impl IntoIterator<Item = ResourceView>) -> Self {
        Self {
            views: views.into_iter().map(|v| (v.key.clone(), v)).collect(),
        }
    }

    /// Local keys `view` depends on that are present in the graph
    fn edges(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        let Some(view) = self.views.get(key) else {
            return Vec::new();
        };
        local_dependencies(view)
            .into_iter()
            .filter(|dep| self.views.contains_key(dep))
            .collect()
    }
}

impl ReferenceLookup for DependencyGraph {
    fn lookup(&self, key: &ResourceKey) -> Option<&ResourceView> {
        self.views.get(key)
    }
}

/// Local resources `view` needs looked up to resolve its references.
/// Resources with malformed references contribute no edges.
pub(crate) fn local_dependencies(view: &ResourceView) -> Vec<ResourceKey> {
    let Ok(slots) = kinds::references(view) else {
        return Vec::new();
    };
    slots
        .iter()
        .filter(|slot| needs_lookup(&slot.reference, slot.wants))
        .filter_map(|slot| local_key(&slot.reference, slot.target, &view.key.namespace))
        .collect()
}

/// Read `root` and every local resource it references, transitively.
/// Missing targets are simply absent from the graph.
pub async fn collect(
    store: &dyn ObjectStore,
    root: &ResourceView,
) -> Result<DependencyGraph, StoreError> {
    let mut graph = DependencyGraph::from_views([root.clone()]);
    let mut visited: BTreeSet<ResourceKey> = BTreeSet::from([root.key.clone()]);
    let mut queue: VecDeque<ResourceKey> = local_dependencies(root).into();

    while let Some(key) = queue.pop_front() {
        if !visited.insert(key.clone()) {
            continue;
        }
        match store.get(&key).await? {
            Some(view) => {
                queue.extend(local_dependencies(&view));
                graph.views.insert(key, view);
            }
            None => debug!("{} is referenced but does not exist", key),
        }
    }
    Ok(graph)
}

/// Find a cycle reachable from `start`, returned as the path that closes it
pub fn find_cycle<N, F>(start: &N, edges: F) -> Option<Vec<N>>
where
    N: Ord + Clone,
    F: Fn(&N) -> Vec<N>,
{
    fn visit<N, F>(node: &N, edges: &F, path: &mut Vec<N>, done: &mut BTreeSet<N>) -> Option<Vec<N>>
    where
        N: Ord + Clone,
        F: Fn(&N) -> Vec<N>,
    {
        if let Some(pos) = path.iter().position(|n| n == node) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(node.clone());
            return Some(cycle);
        }
        if done.contains(node) {
            return None;
        }
        path.push(node.clone());
        for next in edges(node) {
            if let Some(cycle) = visit(&next, edges, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(node.clone());
        None
    }

    visit(start, &edges, &mut Vec::new(), &mut BTreeSet::new())
}

/// References of a ready resource, resolved
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedReferences {
    /// Local key of the owning tenant, when referenced by name
    pub tenant: Option<ResourceKey>,
    /// Resolution per referencing field
    pub values: BTreeMap<&'static str, Resolution>,
}

/// Whether a resource can proceed to planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(ResolvedReferences),
    Blocked(ResolveError),
}

/// Check that `root`'s dependencies are acyclic and resolve its references
pub fn check(root: &ResourceView, graph: &DependencyGraph) -> Result<Readiness, ReconcileError> {
    if let Some(cycle) = find_cycle(&root.key, |key| graph.edges(key)) {
        let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        return Err(ReconcileError::DependencyCycle(path.join(" -> ")));
    }

    let mut resolved = ResolvedReferences::default();
    for slot in kinds::references(root)? {
        if slot.field == TENANT_REF {
            resolved.tenant = local_key(&slot.reference, slot.target, &root.key.namespace);
        }
        match resolver::resolve(
            slot.field,
            &slot.reference,
            slot.target,
            slot.wants,
            &root.key.namespace,
            graph,
        ) {
            Ok(resolution) => {
                resolved.values.insert(slot.field, resolution);
            }
            Err(blocked) => return Ok(Readiness::Blocked(blocked)),
        }
    }
    Ok(Readiness::Ready(resolved))
}
