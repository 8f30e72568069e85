//! Helper functions for common reconciliation patterns
//!
//! Finalizer, owner-reference and label bookkeeping shared by every reconciler,
//! plus the write-error logging convention (conflicts at `warn`, everything
//! else at `error`).

use crate::store::StoreError;
use crds::labels::{EXPOSE_PORT_ANNOTATION, EXPOSE_PORTS_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::BTreeMap;
use std::num::ParseIntError;
use tracing::{error, warn};

/// Object is marked for deletion
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add `finalizer`; returns false if it was already present
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove `finalizer`; returns false if it was not present
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    let Some(finalizers) = obj.meta_mut().finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

/// Non-controller owner reference to `owner`; `None` if it has no name or uid yet
pub fn owner_reference<O: Resource<DynamicType = ()>>(owner: &O) -> Option<OwnerReference> {
    owner.owner_ref(&())
}

fn refers_to<O: Resource<DynamicType = ()>>(reference: &OwnerReference, owner: &O) -> bool {
    reference.api_version == O::api_version(&())
        && reference.kind == O::kind(&())
        && Some(&reference.name) == owner.meta().name.as_ref()
}

/// `obj` carries an owner reference to `owner` (matched by apiVersion, kind and name)
pub fn has_owner_ref<K: Resource, O: Resource<DynamicType = ()>>(obj: &K, owner: &O) -> bool {
    obj.meta()
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| refers_to(r, owner)))
}

/// Add an owner reference to `owner`; returns false if already present or the
/// owner cannot be referenced yet
pub fn add_owner_ref<K: Resource, O: Resource<DynamicType = ()>>(obj: &mut K, owner: &O) -> bool {
    if has_owner_ref(obj, owner) {
        return false;
    }
    let Some(reference) = owner_reference(owner) else {
        return false;
    };
    obj.meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(reference);
    true
}

/// Remove every owner reference to `owner`; returns false if there was none
pub fn remove_owner_ref<K: Resource, O: Resource<DynamicType = ()>>(obj: &mut K, owner: &O) -> bool {
    let Some(refs) = obj.meta_mut().owner_references.as_mut() else {
        return false;
    };
    let before = refs.len();
    refs.retain(|r| !refers_to(r, owner));
    refs.len() != before
}

/// Number of owner references on `obj`
pub fn owner_count<K: Resource>(obj: &K) -> usize {
    obj.meta().owner_references.as_ref().map_or(0, Vec::len)
}

/// Names of the owners of kind `O`
pub fn owner_names<'a, K: Resource, O: Resource<DynamicType = ()>>(obj: &'a K) -> impl Iterator<Item = &'a str> {
    let api_version = O::api_version(&()).into_owned();
    let kind = O::kind(&()).into_owned();
    obj.meta()
        .owner_references
        .iter()
        .flatten()
        .filter(move |r| r.api_version == api_version && r.kind == kind)
        .map(|r| r.name.as_str())
}

/// Label value, empty if absent
pub fn label<'a, K: Resource>(obj: &'a K, key: &str) -> &'a str {
    obj.meta()
        .labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map_or("", String::as_str)
}

/// Set every `(key, value)` label; returns true if anything changed
pub fn update_labels<K: Resource>(obj: &mut K, labels: &[(&str, &str)]) -> bool {
    let own = obj.meta_mut().labels.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (key, value) in labels {
        if own.get(*key).map(String::as_str) != Some(*value) {
            own.insert((*key).to_string(), (*value).to_string());
            changed = true;
        }
    }
    changed
}

/// Ports requested by the expose annotations: `expose-ports` (comma separated)
/// followed by `expose-port`. Empty entries are skipped; an empty result means
/// "every port of the Service".
pub fn parse_expose_ports(annotations: &BTreeMap<String, String>) -> Result<Vec<u16>, ParseIntError> {
    let many = annotations.get(EXPOSE_PORTS_ANNOTATION).map_or("", String::as_str);
    let one = annotations.get(EXPOSE_PORT_ANNOTATION).map_or("", String::as_str);
    many.split(',')
        .chain(std::iter::once(one))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<u16>)
        .collect()
}

/// Log a failed write of `what` and hand the error back for `?`
pub fn write_failed(what: &str, err: StoreError) -> StoreError {
    if err.is_conflict() {
        warn!("Conflict writing {}: {}", what, err);
    } else {
        error!("Failed to write {}: {}", what, err);
    }
    err
}

/// Treat NotFound as a successful no-op
pub fn ignore_not_found<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
