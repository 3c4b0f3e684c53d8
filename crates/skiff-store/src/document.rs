//! Stored-object document schema.
//!
//! One document per named object, keyed by filename. The encrypted bytes
//! live on disk; the document carries everything needed to find, authorise
//! and decrypt them, plus an ordered audit trail under ascending string keys
//! `"1"`, `"2"`, ...

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    /// Object upload
    Upload,
    /// Object download
    Download,
    /// Object soft-delete
    Delete,
}

/// One audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Wall-clock milliseconds since epoch
    pub at: i64,
    /// Event category
    #[serde(rename = "type")]
    pub kind: AuditKind,
    /// `success`, `failure`, or a specific error kind
    pub status: String,
}

impl AuditEvent {
    /// Successful event of the given kind at `at` ms
    #[must_use]
    pub fn success(kind: AuditKind, at: i64) -> Self {
        Self {
            at,
            kind,
            status: "success".into(),
        }
    }

    /// Failed event with a specific error kind
    #[must_use]
    pub fn failure(kind: AuditKind, at: i64, status: impl Into<String>) -> Self {
        Self {
            at,
            kind,
            status: status.into(),
        }
    }
}

/// Metadata document for one stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDocument {
    /// Primary lookup key
    pub filename: String,
    /// Plaintext byte count (== ciphertext length on disk)
    pub size: i64,
    /// Always true in this design; kept for schema compatibility
    pub encrypted: bool,
    /// AES-256-GCM IV, unique per object
    pub iv: [u8; 12],
    /// AES-256-GCM authentication tag
    pub tag: [u8; 16],
    /// Soft-delete tombstone
    pub deleted: bool,
    /// Uploader identity
    pub owner_fingerprint: String,
    /// Intended recipient; absent means the object is public
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_fingerprint: Option<String>,
    /// Visibility bit, derived from recipient absence
    pub public: bool,
    /// Upload time, wall-clock milliseconds since epoch
    pub uploaded_at: i64,
    /// Ordered audit events keyed "1", "2", ...
    #[serde(rename = "proc", default)]
    pub audit: BTreeMap<String, AuditEvent>,
}

impl ObjectDocument {
    /// Build a fresh document for an upload. Visibility follows the one
    /// rule: public iff no recipient.
    #[must_use]
    pub fn new(
        filename: String,
        size: i64,
        iv: [u8; 12],
        tag: [u8; 16],
        owner_fingerprint: String,
        recipient_fingerprint: Option<String>,
        uploaded_at: i64,
    ) -> Self {
        let public = recipient_fingerprint.is_none();
        Self {
            filename,
            size,
            encrypted: true,
            iv,
            tag,
            deleted: false,
            owner_fingerprint,
            recipient_fingerprint,
            public,
            uploaded_at,
            audit: BTreeMap::new(),
        }
    }

    /// Whether `fingerprint` may read this object: public, owner, or
    /// addressed recipient.
    #[must_use]
    pub fn visible_to(&self, fingerprint: &str) -> bool {
        self.public
            || self.owner_fingerprint == fingerprint
            || self
                .recipient_fingerprint
                .as_deref()
                .is_some_and(|r| r == fingerprint)
    }

    /// Next audit key in the "1", "2", ... sequence
    #[must_use]
    pub fn next_audit_key(&self) -> String {
        (self.audit.len() + 1).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(recipient: Option<&str>) -> ObjectDocument {
        ObjectDocument::new(
            "hello.txt".into(),
            6,
            [1u8; 12],
            [2u8; 16],
            "aa".repeat(32),
            recipient.map(str::to_owned),
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_public_iff_no_recipient() {
        assert!(doc(None).public);
        let addressed = doc(Some(&"bb".repeat(32)));
        assert!(!addressed.public);
    }

    #[test]
    fn test_visibility_rules() {
        let owner = "aa".repeat(32);
        let recipient = "bb".repeat(32);
        let stranger = "cc".repeat(32);

        let public = doc(None);
        assert!(public.visible_to(&stranger));

        let addressed = doc(Some(&recipient));
        assert!(addressed.visible_to(&owner));
        assert!(addressed.visible_to(&recipient));
        assert!(!addressed.visible_to(&stranger));
    }

    #[test]
    fn test_audit_key_sequence() {
        let mut d = doc(None);
        assert_eq!(d.next_audit_key(), "1");
        d.audit.insert(
            "1".into(),
            AuditEvent::success(AuditKind::Upload, d.uploaded_at),
        );
        assert_eq!(d.next_audit_key(), "2");
    }

    #[test]
    fn test_serde_field_names() {
        let mut d = doc(None);
        d.audit.insert(
            "1".into(),
            AuditEvent::failure(AuditKind::Upload, 5, "integrity_failure"),
        );

        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["proc"]["1"]["type"], "upload");
        assert_eq!(json["proc"]["1"]["status"], "integrity_failure");
        assert!(json.get("recipient_fingerprint").is_none());

        let back: ObjectDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }
}
