//! Finalizer helpers
//!
//! Finalizers are treated as a set: adding is idempotent, and the stored
//! list is kept sorted and free of duplicates.

use std::collections::BTreeSet;

use kube::{Resource, ResourceExt};

/// Returns true if the object carries the given finalizer
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Add a finalizer to the object's metadata
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) {
    let mut finalizers: BTreeSet<String> = obj.finalizers().iter().cloned().collect();
    finalizers.insert(finalizer.to_string());
    *obj.finalizers_mut() = finalizers.into_iter().collect();
}

/// Remove a finalizer from the object's metadata
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) {
    let mut finalizers: BTreeSet<String> = obj.finalizers().iter().cloned().collect();
    finalizers.remove(finalizer);
    *obj.finalizers_mut() = finalizers.into_iter().collect();
}
