//! Schema migration chain: one pure function per version bump, applied in
//! order. Mirrors the spirit of the teacher's `ForgesConfig` untagged-enum
//! migration helpers (`to_object_format`/`from_forges`) but operates on the
//! raw `serde_json::Value` so older documents can be upgraded before
//! `Config` deserialization is attempted.

use serde_json::Value;

/// Applies every migration strictly after `from` up to
/// [`super::CURRENT_SCHEMA_VERSION`].
pub fn migrate(mut value: Value, from: u32) -> Value {
    if from < 1 {
        value = migrate_to_v1(value);
    }
    value
}

/// Placeholder first migration: there is no version 0 document shape in the
/// wild yet, so this is the identity function. Kept as the template for the
/// next schema bump.
fn migrate_to_v1(value: Value) -> Value {
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_identity_below_current_version() {
        let doc = serde_json::json!({"identities": {}});
        let migrated = migrate(doc.clone(), 0);
        assert_eq!(migrated, doc);
    }
}
