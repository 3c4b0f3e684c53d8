//! Document-store adapter.
//!
//! The server talks to its metadata backend exclusively through
//! [`DocumentStore`]; lookups exclude tombstoned documents, and a
//! unique-key violation on insert is its own error so the caller can map it
//! to a permission refusal.
//!
//! Audit events never depend on a document existing: an event for a name
//! with no document (a rejected upload, for instance) is preserved in the
//! store's standalone audit log instead of being dropped.

use crate::document::{AuditEvent, ObjectDocument};
use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Adapter over the metadata backend
pub trait DocumentStore: Send + Sync {
    /// Insert a fresh document; fails on an existing document with the same
    /// filename.
    fn insert(&self, doc: ObjectDocument) -> Result<(), StoreError>;

    /// Find the non-deleted document for `filename`.
    fn find_one(&self, filename: &str) -> Result<Option<ObjectDocument>, StoreError>;

    /// Set the tombstone on `filename`. Returns `false` on miss.
    fn mark_deleted(&self, filename: &str) -> Result<bool, StoreError>;

    /// Append an audit event under the next ordinal key of `filename`'s
    /// document. When no document exists the event is preserved in the
    /// standalone audit log instead. Returns `true` when it landed on a
    /// document.
    fn append_audit(&self, filename: &str, event: AuditEvent) -> Result<bool, StoreError>;

    /// Audit events preserved for `filename` outside any document
    fn unattached_audit(&self, filename: &str) -> Result<Vec<AuditEvent>, StoreError>;

    /// All non-deleted documents visible to `fingerprint`
    /// (public, owned, or addressed-to).
    fn iter_visible(&self, fingerprint: &str) -> Result<Vec<ObjectDocument>, StoreError>;
}

/// In-process reference implementation backed by a hash map.
///
/// Concurrent inserts are independent; the unique-key check happens under
/// the write lock, mirroring the backend's unique index on `filename`.
/// Unattached audit events live in a separate log, the analogue of a
/// dedicated audit collection.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, ObjectDocument>>,
    unattached: RwLock<Vec<(String, AuditEvent)>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, ObjectDocument>>, StoreError> {
        self.documents
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, ObjectDocument>>, StoreError> {
        self.documents
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, doc: ObjectDocument) -> Result<(), StoreError> {
        let mut documents = self.write()?;
        if documents.contains_key(&doc.filename) {
            return Err(StoreError::DuplicateKey(doc.filename));
        }
        documents.insert(doc.filename.clone(), doc);
        Ok(())
    }

    fn find_one(&self, filename: &str) -> Result<Option<ObjectDocument>, StoreError> {
        let documents = self.read()?;
        Ok(documents
            .get(filename)
            .filter(|doc| !doc.deleted)
            .cloned())
    }

    fn mark_deleted(&self, filename: &str) -> Result<bool, StoreError> {
        let mut documents = self.write()?;
        match documents.get_mut(filename) {
            Some(doc) if !doc.deleted => {
                doc.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn append_audit(&self, filename: &str, event: AuditEvent) -> Result<bool, StoreError> {
        let mut documents = self.write()?;
        if let Some(doc) = documents.get_mut(filename) {
            let key = doc.next_audit_key();
            doc.audit.insert(key, event);
            return Ok(true);
        }
        drop(documents);

        self.unattached
            .write()
            .map_err(|_| StoreError::Backend("audit lock poisoned".into()))?
            .push((filename.to_owned(), event));
        Ok(false)
    }

    fn unattached_audit(&self, filename: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let unattached = self
            .unattached
            .read()
            .map_err(|_| StoreError::Backend("audit lock poisoned".into()))?;
        Ok(unattached
            .iter()
            .filter(|(name, _)| name == filename)
            .map(|(_, event)| event.clone())
            .collect())
    }

    fn iter_visible(&self, fingerprint: &str) -> Result<Vec<ObjectDocument>, StoreError> {
        let documents = self.read()?;
        let mut visible: Vec<ObjectDocument> = documents
            .values()
            .filter(|doc| !doc.deleted && doc.visible_to(fingerprint))
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AuditKind;

    fn doc(name: &str, owner: &str, recipient: Option<&str>) -> ObjectDocument {
        ObjectDocument::new(
            name.into(),
            10,
            [0u8; 12],
            [0u8; 16],
            owner.into(),
            recipient.map(str::to_owned),
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_insert_and_find() {
        let store = MemoryStore::new();
        store.insert(doc("a.txt", "owner", None)).unwrap();

        let found = store.find_one("a.txt").unwrap().unwrap();
        assert_eq!(found.filename, "a.txt");
        assert!(store.find_one("missing.txt").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.insert(doc("a.txt", "owner", None)).unwrap();

        let err = store.insert(doc("a.txt", "other", None)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(name) if name == "a.txt"));
    }

    #[test]
    fn test_tombstone_hides_document() {
        let store = MemoryStore::new();
        store.insert(doc("a.txt", "owner", None)).unwrap();

        assert!(store.mark_deleted("a.txt").unwrap());
        assert!(store.find_one("a.txt").unwrap().is_none());
        // Second delete is a miss.
        assert!(!store.mark_deleted("a.txt").unwrap());
        // The name stays reserved: a new insert still collides.
        assert!(store.insert(doc("a.txt", "owner", None)).is_err());
    }

    #[test]
    fn test_audit_appends_in_order() {
        let store = MemoryStore::new();
        store.insert(doc("a.txt", "owner", None)).unwrap();

        store
            .append_audit("a.txt", AuditEvent::success(AuditKind::Upload, 1))
            .unwrap();
        store
            .append_audit("a.txt", AuditEvent::success(AuditKind::Download, 2))
            .unwrap();

        let found = store.find_one("a.txt").unwrap().unwrap();
        assert_eq!(found.audit.len(), 2);
        assert_eq!(found.audit["1"].kind, AuditKind::Upload);
        assert_eq!(found.audit["2"].kind, AuditKind::Download);
    }

    #[test]
    fn test_audit_without_document_is_preserved() {
        let store = MemoryStore::new();

        let landed = store
            .append_audit(
                "never-inserted.bin",
                AuditEvent::failure(AuditKind::Upload, 3, "integrity_failure"),
            )
            .unwrap();
        assert!(!landed);

        let events = store.unattached_audit("never-inserted.bin").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, "integrity_failure");
        assert_eq!(events[0].kind, AuditKind::Upload);

        // Other names are unaffected.
        assert!(store.unattached_audit("other.bin").unwrap().is_empty());
    }

    #[test]
    fn test_iter_visible_filters_and_sorts() {
        let store = MemoryStore::new();
        let me = "aa".repeat(32);
        let other = "bb".repeat(32);

        store.insert(doc("pub.txt", &other, None)).unwrap();
        store.insert(doc("mine.txt", &me, Some(&other))).unwrap();
        store.insert(doc("to-me.txt", &other, Some(&me))).unwrap();
        store.insert(doc("hidden.txt", &other, Some(&other))).unwrap();

        let visible = store.iter_visible(&me).unwrap();
        let names: Vec<&str> = visible.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["mine.txt", "pub.txt", "to-me.txt"]);
    }
}
