//! Download and list planes.
//!
//! Downloads decrypt the stored object after the ACL and consistency checks
//! pass, then stream plaintext from the requested offset in bounded chunks.
//! Listing renders the requester's visible set as `<filename>\t<size>` lines.

use crate::connection::{ConnState, Connection};
use crate::error::ServerError;
use crate::now_ms;
use crate::transport::Transport;
use crate::upload::validate_filename;
use skiff_proto::records::CommandRecord;
use skiff_proto::{CHUNK_SIZE, Status, framing};
use skiff_store::{AuditEvent, AuditKind};

impl<T: Transport> Connection<T> {
    pub(crate) async fn handle_download(
        &mut self,
        record: &CommandRecord,
    ) -> Result<(), ServerError> {
        let meta = self.session.open_meta(&record.metadata)?;
        validate_filename(&meta.filename)?;

        let doc = self
            .ctx
            .store
            .find_one(&meta.filename)?
            .ok_or(ServerError::FileNotFound)?;

        if !doc.visible_to(&self.fingerprint) {
            return Err(ServerError::PermissionDenied);
        }

        // The on-disk ciphertext must be exactly as long as the document
        // says the plaintext is; anything else means the pair is corrupt.
        let disk_len = self
            .ctx
            .storage
            .ciphertext_len(&doc.filename)
            .await
            .map_err(|_| ServerError::Inconsistent)?;
        if disk_len != doc.size as u64 {
            return Err(ServerError::Inconsistent);
        }

        if record.offset < 0 || record.offset > doc.size {
            return Err(ServerError::InvalidOffset);
        }

        let plaintext = self
            .ctx
            .storage
            .load(&doc.filename, &doc.iv, &doc.tag)
            .await?;

        self.send_status(Status::Success, doc.size - record.offset)
            .await?;
        self.set_state(ConnState::Transferring);
        let outcome = self.send_object(&plaintext[record.offset as usize..]).await;
        self.set_state(ConnState::Authenticated);
        outcome?;

        self.ctx.store.append_audit(
            &doc.filename,
            AuditEvent::success(AuditKind::Download, now_ms()),
        )?;

        tracing::info!(
            remote = %self.remote,
            filename = %doc.filename,
            offset = record.offset,
            "download complete"
        );
        Ok(())
    }

    async fn send_object(&mut self, payload: &[u8]) -> Result<(), ServerError> {
        for chunk in payload.chunks(CHUNK_SIZE) {
            framing::write_all(&mut self.transport, chunk).await?;
        }
        Ok(())
    }

    pub(crate) async fn handle_list(&mut self) -> Result<(), ServerError> {
        let visible = self.ctx.store.iter_visible(&self.fingerprint)?;

        let mut listing = String::new();
        for doc in &visible {
            listing.push_str(&doc.filename);
            listing.push('\t');
            listing.push_str(&doc.size.to_string());
            listing.push('\n');
        }

        self.send_status(Status::Success, listing.len() as i64)
            .await?;
        if !listing.is_empty() {
            framing::write_all(&mut self.transport, listing.as_bytes()).await?;
        }
        Ok(())
    }
}
