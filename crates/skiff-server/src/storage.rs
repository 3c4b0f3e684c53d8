//! Encrypted object storage.
//!
//! A flat directory of AES-256-GCM ciphertexts, one file per object, sealed
//! under the server's file-encryption key. Writes are atomic: temp file,
//! fsync, rename. Existing objects are never overwritten.

use crate::error::ServerError;
use skiff_crypto::atrest::ObjectCipher;
use std::path::{Path, PathBuf};

/// Object store rooted at a single directory
pub struct ObjectStorage {
    root: PathBuf,
    cipher: ObjectCipher,
}

impl ObjectStorage {
    /// Create a store over `root` holding the given at-rest cipher
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, cipher: ObjectCipher) -> Self {
        Self {
            root: root.into(),
            cipher,
        }
    }

    /// Create the storage root if needed, mode `0755`.
    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }

    /// Path of an object. Callers validate the name; the namespace is flat.
    #[must_use]
    pub fn object_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    fn temp_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!(".{filename}.tmp"))
    }

    /// Whether an object file exists on disk
    pub async fn exists(&self, filename: &str) -> bool {
        tokio::fs::try_exists(self.object_path(filename))
            .await
            .unwrap_or(false)
    }

    /// Length of the stored ciphertext
    pub async fn ciphertext_len(&self, filename: &str) -> std::io::Result<u64> {
        let meta = tokio::fs::metadata(self.object_path(filename)).await?;
        Ok(meta.len())
    }

    /// Encrypt and persist an object atomically. Returns the IV and tag for
    /// the metadata document.
    ///
    /// Refuses to replace an existing object with `PermissionDenied`.
    pub async fn store(
        &self,
        filename: &str,
        plaintext: &[u8],
    ) -> Result<([u8; 12], [u8; 16]), ServerError> {
        let final_path = self.object_path(filename);
        if tokio::fs::try_exists(&final_path).await? {
            return Err(ServerError::PermissionDenied);
        }

        let sealed = self.cipher.seal(plaintext)?;

        let tmp_path = self.temp_path(filename);
        write_atomic(&tmp_path, &final_path, &sealed.ciphertext).await?;

        Ok((sealed.iv, sealed.tag))
    }

    /// Read and decrypt an object. A tag mismatch is `IntegrityError`.
    pub async fn load(
        &self,
        filename: &str,
        iv: &[u8; 12],
        tag: &[u8; 16],
    ) -> Result<Vec<u8>, ServerError> {
        let ciphertext = tokio::fs::read(self.object_path(filename)).await?;
        self.cipher
            .open(iv, &ciphertext, tag)
            .map_err(|_| ServerError::IntegrityError)
    }

    /// Remove an object file, tolerating a miss
    pub async fn remove(&self, filename: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.object_path(filename)).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

async fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file = {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o644);
        options.open(tmp).await?
    };

    let result = async {
        use tokio::io::AsyncWriteExt;
        let mut file = file;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(tmp, dest).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &tempfile::TempDir) -> ObjectStorage {
        ObjectStorage::new(dir.path(), ObjectCipher::generate().unwrap())
    }

    #[tokio::test]
    async fn test_store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_root().unwrap();

        let (iv, tag) = storage.store("hello.txt", b"hello\n").await.unwrap();

        assert_eq!(storage.ciphertext_len("hello.txt").await.unwrap(), 6);
        let plaintext = storage.load("hello.txt", &iv, &tag).await.unwrap();
        assert_eq!(plaintext, b"hello\n");
    }

    #[tokio::test]
    async fn test_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_root().unwrap();

        storage.store("a.bin", b"one").await.unwrap();
        assert!(matches!(
            storage.store("a.bin", b"two").await,
            Err(ServerError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_root().unwrap();

        let (iv, tag) = storage.store("a.bin", b"payload").await.unwrap();

        let path = storage.object_path("a.bin");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0x01;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            storage.load("a.bin", &iv, &tag).await,
            Err(ServerError::IntegrityError)
        ));
    }

    #[tokio::test]
    async fn test_no_temp_residue() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_root().unwrap();

        storage.store("a.bin", b"bytes").await.unwrap();

        let residues: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(residues.is_empty());
    }

    #[tokio::test]
    async fn test_remove_tolerates_miss() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_root().unwrap();
        storage.remove("never-existed.bin").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_object_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_root().unwrap();
        storage.store("a.bin", b"bytes").await.unwrap();

        let mode = std::fs::metadata(storage.object_path("a.bin"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
