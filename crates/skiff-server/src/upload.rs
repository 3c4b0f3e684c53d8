//! Upload plane.
//!
//! Metadata is validated before any payload byte is read; the data phase
//! streams exactly `size` bytes in bounded chunks through the BLAKE3
//! verifier, and only an integrity-verified plaintext reaches the at-rest
//! cipher and the document store.

use crate::connection::{ConnState, Connection};
use crate::error::ServerError;
use crate::now_ms;
use crate::transport::Transport;
use skiff_proto::records::CommandRecord;
use skiff_proto::{CHUNK_SIZE, FILENAME_MAX, FINGERPRINT_LEN, Status, framing};
use skiff_store::{AuditEvent, AuditKind, ObjectDocument};

/// Filename rules: non-empty, bounded, no traversal, no separators.
pub(crate) fn validate_filename(filename: &str) -> Result<(), ServerError> {
    if filename.is_empty()
        || filename.len() > FILENAME_MAX
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\0')
    {
        return Err(ServerError::PermissionDenied);
    }
    Ok(())
}

/// Recipient rules: absent, or exactly 64 lowercase hex characters.
pub(crate) fn validate_recipient(recipient: Option<&str>) -> Result<(), ServerError> {
    if let Some(recipient) = recipient {
        if recipient.len() != FINGERPRINT_LEN
            || !recipient
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ServerError::PermissionDenied);
        }
    }
    Ok(())
}

impl<T: Transport> Connection<T> {
    pub(crate) async fn handle_upload(&mut self, record: &CommandRecord) -> Result<(), ServerError> {
        let meta = self.session.open_meta(&record.metadata)?;

        validate_filename(&meta.filename)?;
        validate_recipient(meta.recipient.as_deref())?;
        if meta.size <= 0 || meta.size > self.ctx.config.max_file_size {
            return Err(ServerError::PermissionDenied);
        }

        // Duplicate names are refused before the data phase is authorised.
        if self.ctx.store.find_one(&meta.filename)?.is_some()
            || self.ctx.storage.exists(&meta.filename).await
        {
            return Err(ServerError::PermissionDenied);
        }

        self.send_status(Status::Success, 0).await?;
        self.set_state(ConnState::Transferring);
        let outcome = self.receive_object(record, &meta).await;
        self.set_state(ConnState::Authenticated);
        outcome
    }

    async fn receive_object(
        &mut self,
        record: &CommandRecord,
        meta: &skiff_proto::session::FileMeta,
    ) -> Result<(), ServerError> {
        let mut verifier = skiff_proto::integrity::StreamVerifier::new(record.file_hash);
        let mut plaintext = Vec::with_capacity(meta.size as usize);
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut remaining = meta.size as u64;

        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            match tokio::time::timeout(
                self.idle,
                framing::read_exact(&mut self.transport, &mut chunk[..want]),
            )
            .await
            {
                Err(_) => return Err(ServerError::IdleTimeout),
                Ok(read) => read?,
            }
            verifier.update(&chunk[..want]);
            plaintext.extend_from_slice(&chunk[..want]);
            remaining -= want as u64;
        }

        if !verifier.verify() {
            // No document exists for the name; the store keeps the event in
            // its standalone audit log. The observed digest is not logged.
            self.ctx.store.append_audit(
                &meta.filename,
                AuditEvent::failure(AuditKind::Upload, now_ms(), "integrity_failure"),
            )?;
            tracing::warn!(remote = %self.remote, "upload integrity check failed");
            return Err(ServerError::IntegrityError);
        }

        let (iv, tag) = self.ctx.storage.store(&meta.filename, &plaintext).await?;

        let document = ObjectDocument::new(
            meta.filename.clone(),
            meta.size,
            iv,
            tag,
            self.fingerprint.clone(),
            meta.recipient.clone(),
            now_ms(),
        );
        if let Err(e) = self.ctx.store.insert(document) {
            // Lost an insert race; roll the file back.
            self.ctx.storage.remove(&meta.filename).await?;
            return Err(e.into());
        }
        self.ctx.store.append_audit(
            &meta.filename,
            AuditEvent::success(AuditKind::Upload, now_ms()),
        )?;

        tracing::info!(
            remote = %self.remote,
            filename = %meta.filename,
            size = meta.size,
            "upload complete"
        );
        self.send_status(Status::Success, 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_rules() {
        assert!(validate_filename("hello.txt").is_ok());
        assert!(validate_filename("with space.bin").is_ok());

        assert!(validate_filename("").is_err());
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("a/..b").is_err());
        assert!(validate_filename("dir/file").is_err());
        assert!(validate_filename("nul\0byte").is_err());
        assert!(validate_filename(&"x".repeat(FILENAME_MAX + 1)).is_err());
    }

    #[test]
    fn test_recipient_rules() {
        assert!(validate_recipient(None).is_ok());
        assert!(validate_recipient(Some(&"ab".repeat(32))).is_ok());

        assert!(validate_recipient(Some("short")).is_err());
        assert!(validate_recipient(Some(&"AB".repeat(32))).is_err());
        assert!(validate_recipient(Some(&"zz".repeat(32))).is_err());
    }
}
