//! The two ways a generated section is combined into the document.
//!
//! Callers pick one explicitly at each call site: `deep_merge` for sections
//! whose fields can be overridden one by one, `shallow_replace` for sections
//! that only make sense as a single unit.

use serde_yaml::{Mapping, Value};

/// Recursively merges `patch` into `base`.
///
/// Nested mappings present on both sides are merged key by key. Everything
/// else, sequences included, is overwritten wholesale by the patch value.
pub fn deep_merge(base: &mut Mapping, patch: &Mapping) {
    for (key, patch_value) in patch {
        if let (Some(Value::Mapping(base_child)), Value::Mapping(patch_child)) =
            (base.get_mut(key), patch_value)
        {
            deep_merge(base_child, patch_child);
            continue;
        }
        base.insert(key.clone(), patch_value.clone());
    }
}

/// Overwrites each top-level key of `patch` in `base`, discarding whatever
/// nested structure was there before.
pub fn shallow_replace(base: &mut Mapping, patch: Mapping) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}
