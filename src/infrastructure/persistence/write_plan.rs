//! Write preparation shared by the versioned backends
//!
//! Every document in a batch is validated and version-bumped before a
//! backend touches its store, so a malformed document aborts the batch with
//! no I/O attempted.

use serde_json::{json, Value};

use crate::application::ports::outbound::{Document, DocumentBatch, StorageError};
use crate::domain::value_objects::{EntityKey, Gid};

/// One validated, version-bumped write
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub key: EntityKey,
    /// Version the writer last observed; the optimistic-concurrency guard
    pub observed: u64,
    /// Always fits in `i64`
    pub next_version: u64,
    pub gid: Option<Gid>,
    pub destroyed: bool,
    /// Document with `next_version` embedded
    pub document: Document,
}

impl PreparedWrite {
    pub fn is_insert(&self) -> bool {
        self.observed == 0
    }

    /// Record a storage-assigned gid in both the write and its document
    pub fn assign_gid(&mut self, gid: Gid) {
        self.gid = Some(gid);
        self.document["gid"] = json!(gid.value());
    }

    pub fn serialized(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(&self.document)?)
    }

    pub fn conflict(&self) -> StorageError {
        StorageError::Conflict {
            key: self.key.clone(),
            observed: self.observed,
        }
    }
}

/// Validate and bump a whole batch; fails on the first malformed document
pub fn prepare_batch(diffs: DocumentBatch) -> Result<Vec<PreparedWrite>, StorageError> {
    diffs
        .into_iter()
        .map(|(key, document)| prepare(key, document))
        .collect()
}

pub fn prepare(key: EntityKey, mut document: Document) -> Result<PreparedWrite, StorageError> {
    let malformed = |what: &str| StorageError::MalformedDocument(format!("{key}: {what}"));

    let fields = document
        .as_object()
        .ok_or_else(|| malformed("document is not an object"))?;

    match fields.get("key").and_then(Value::as_str) {
        Some(embedded) if embedded == key.as_str() => {}
        Some(embedded) => return Err(malformed(&format!("embedded key {embedded} differs"))),
        None => return Err(malformed("missing key")),
    }

    let observed = fields
        .get("version")
        .and_then(|v| v.get("i"))
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing version.i"))?;

    let gid = match fields.get("gid") {
        Some(Value::Null) => None,
        Some(value) => Some(Gid::new(
            value.as_i64().ok_or_else(|| malformed("gid is not an integer"))?,
        )),
        None => return Err(malformed("missing gid")),
    };

    if !fields.get("props").is_some_and(Value::is_object) {
        return Err(malformed("missing props"));
    }

    let destroyed = match fields.get("destroyed") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(malformed("destroyed is not a boolean")),
    };

    // Versions are stored as SQLite INTEGER, so both sides must fit in i64
    let next_version = observed
        .checked_add(1)
        .filter(|next| i64::try_from(*next).is_ok())
        .ok_or_else(|| malformed("version.i out of range"))?;
    document["version"] = json!({ "i": next_version });

    Ok(PreparedWrite {
        key,
        observed,
        next_version,
        gid,
        destroyed,
        document,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(key: &str, version: u64) -> Document {
        json!({
            "key": key,
            "version": {"i": version},
            "gid": null,
            "props": {"category": "item"}
        })
    }

    #[test]
    fn test_prepare_bumps_version() {
        let write = prepare(EntityKey::from("k1"), doc("k1", 4)).unwrap();
        assert_eq!(write.observed, 4);
        assert_eq!(write.next_version, 5);
        assert_eq!(write.document["version"], json!({"i": 5}));
        assert!(!write.is_insert());
        assert!(!write.destroyed);
    }

    #[test]
    fn test_assign_gid_updates_document() {
        let mut write = prepare(EntityKey::from("k1"), doc("k1", 0)).unwrap();
        assert!(write.is_insert());
        write.assign_gid(Gid::new(9));
        assert_eq!(write.document["gid"], json!(9));
    }

    #[test]
    fn test_malformed_documents() {
        let key = EntityKey::from("k1");
        let cases = [
            json!("not an object"),
            json!({"version": {"i": 1}, "gid": 1, "props": {}}),
            json!({"key": "other", "version": {"i": 1}, "gid": 1, "props": {}}),
            json!({"key": "k1", "version": 1, "gid": 1, "props": {}}),
            json!({"key": "k1", "version": {"i": 1}, "props": {}}),
            json!({"key": "k1", "version": {"i": 1}, "gid": "one", "props": {}}),
            json!({"key": "k1", "version": {"i": 1}, "gid": 1}),
            json!({"key": "k1", "version": {"i": 1}, "gid": 1, "props": {}, "destroyed": "yes"}),
            json!({"key": "k1", "version": {"i": u64::MAX}, "gid": 1, "props": {}}),
            json!({"key": "k1", "version": {"i": i64::MAX as u64}, "gid": 1, "props": {}}),
            json!({"key": "k1", "version": {"i": i64::MAX as u64 + 1}, "gid": 1, "props": {}}),
        ];
        for case in cases {
            let result = prepare(key.clone(), case.clone());
            assert!(
                matches!(result, Err(StorageError::MalformedDocument(_))),
                "accepted {case}"
            );
        }
    }

    #[test]
    fn test_largest_storable_version_is_accepted() {
        let observed = i64::MAX as u64 - 1;
        let write = prepare(EntityKey::from("k1"), doc("k1", observed)).unwrap();
        assert_eq!(write.next_version, i64::MAX as u64);
    }

    #[test]
    fn test_batch_fails_on_any_malformed_document() {
        let mut batch = DocumentBatch::new();
        batch.insert(EntityKey::from("k1"), doc("k1", 0));
        batch.insert(EntityKey::from("k2"), json!({"key": "k2"}));
        assert!(prepare_batch(batch).is_err());
    }
}
