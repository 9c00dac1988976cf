//! # Resource Events
//!
//! Typed lifecycle events derived from raw watcher events.
//!
//! The watcher only reports "applied" and "deleted". Whether an apply is a
//! create, a resume after a controller restart, a spec update or merely a
//! status refresh depends on what the cache already knows about the object.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

/// Lifecycle event of one custom resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent<K> {
    /// First seen while the watch was running
    Create(K),
    /// Spec changed (`metadata.generation` moved)
    Update(K),
    /// Marked for deletion or removed
    Delete(K),
    /// First seen during the initial list, e.g. after a controller restart
    Resume(K),
}

impl<K> ResourceEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            ResourceEvent::Create(obj)
            | ResourceEvent::Update(obj)
            | ResourceEvent::Delete(obj)
            | ResourceEvent::Resume(obj) => obj,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceEvent::Create(_) => "create",
            ResourceEvent::Update(_) => "update",
            ResourceEvent::Delete(_) => "delete",
            ResourceEvent::Resume(_) => "resume",
        }
    }
}

/// Raw watcher change, stripped of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchChange {
    /// Object listed during the initial (re)list
    InitApply,
    /// Object added or modified
    Apply,
    /// Object removed from the API
    Delete,
}

/// Outcome of classifying one watcher change
#[derive(Debug, Clone, PartialEq)]
pub enum Classified<K> {
    Event(ResourceEvent<K>),
    /// Same generation, only the cached copy needs refreshing
    Refresh(K),
    /// Nothing to do (removal of an uncached object, or a stale copy)
    Ignore,
}

/// Classify a watcher change given the cached copy of the object, if any
pub fn classify<K: Resource>(
    change: WatchChange,
    object: K,
    cached: Option<&K>,
) -> Classified<K> {
    if object.meta().deletion_timestamp.is_some() {
        return Classified::Event(ResourceEvent::Delete(object));
    }

    match (change, cached) {
        (WatchChange::Delete, Some(_)) => Classified::Event(ResourceEvent::Delete(object)),
        (WatchChange::Delete, None) => Classified::Ignore,
        (WatchChange::InitApply, None) => Classified::Event(ResourceEvent::Resume(object)),
        (WatchChange::Apply, None) => Classified::Event(ResourceEvent::Create(object)),
        (_, Some(known)) => {
            if known.meta().generation != object.meta().generation {
                Classified::Event(ResourceEvent::Update(object))
            } else if is_older(object.meta(), known.meta()) {
                // The cache already holds a newer status patch response
                Classified::Ignore
            } else {
                Classified::Refresh(object)
            }
        }
    }
}

/// Whether `incoming` carries an older `resourceVersion` than `known`
///
/// Resource versions are opaque; only numeric ones are compared.
fn is_older(incoming: &ObjectMeta, known: &ObjectMeta) -> bool {
    let version = |meta: &ObjectMeta| {
        meta.resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
    };
    matches!((version(incoming), version(known)), (Some(a), Some(b)) if a < b)
}
