//! Administrator surface: ban list, approval gate, live-connection table.
//!
//! The administrator panel is an external process; it acts through the
//! in-process [`AdminRegistry`] handle. Bans are keyed by the hex-encoded
//! session key observed at establishment and persist across restarts in a
//! versioned flat file written on graceful shutdown.

use crate::connection::ConnState;
use crate::now_ms;
use dashmap::DashMap;
use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Ban file magic
const BAN_MAGIC: [u8; 4] = *b"SKBN";
/// Ban file layout version
const BAN_VERSION: u16 = 1;
/// Fixed reason field width in a ban record
const REASON_MAX: usize = 256;
/// Fixed width of one ban record: key + timestamp + reason length + reason
const BAN_RECORD_LEN: usize = 64 + 8 + 2 + REASON_MAX;

/// One banned identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    /// When the ban was issued, ms since epoch
    pub banned_at: i64,
    /// Human-readable reason, sent to the client on rejection
    pub reason: String,
}

/// A live connection as seen by the administrator surface
pub struct LiveClient {
    /// Peer certificate fingerprint
    pub fingerprint: String,
    /// Remote address
    pub remote: IpAddr,
    /// Connection establishment, ms since epoch
    pub connected_at: i64,
    /// Hex-encoded session key (the ban key)
    pub session_key_hex: String,
    /// Current state-machine state
    pub state: ConnState,
    /// Channel used to tear the connection down on a ban
    kick: mpsc::Sender<String>,
}

/// Snapshot of a live connection for display
#[derive(Debug, Clone)]
pub struct ClientSummary {
    /// Peer certificate fingerprint
    pub fingerprint: String,
    /// Remote address
    pub remote: IpAddr,
    /// Connection establishment, ms since epoch
    pub connected_at: i64,
    /// Current state-machine state
    pub state: ConnState,
}

/// Shared administrator state
pub struct AdminRegistry {
    banned: DashMap<String, BanEntry>,
    pending: DashMap<String, oneshot::Sender<bool>>,
    live: DashMap<u64, LiveClient>,
    // Serialises ban-file writes.
    persist_lock: Mutex<()>,
}

impl AdminRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            banned: DashMap::new(),
            pending: DashMap::new(),
            live: DashMap::new(),
            persist_lock: Mutex::new(()),
        }
    }

    /// Whether a session key is banned
    #[must_use]
    pub fn is_banned(&self, session_key_hex: &str) -> bool {
        self.banned.contains_key(session_key_hex)
    }

    /// The ban entry for a session key, if any
    #[must_use]
    pub fn ban_entry(&self, session_key_hex: &str) -> Option<BanEntry> {
        self.banned.get(session_key_hex).map(|e| e.value().clone())
    }

    /// Ban an identity. Any live connection using that session key is told
    /// to shut down with the reason.
    pub fn ban(&self, session_key_hex: &str, reason: &str) {
        self.banned.insert(
            session_key_hex.to_owned(),
            BanEntry {
                banned_at: now_ms(),
                reason: reason.to_owned(),
            },
        );

        for client in self.live.iter() {
            if client.session_key_hex == session_key_hex {
                let _ = client.kick.try_send(reason.to_owned());
            }
        }
    }

    /// Lift a ban. Returns `false` if the key was not banned.
    pub fn unban(&self, session_key_hex: &str) -> bool {
        self.banned.remove(session_key_hex).is_some()
    }

    /// Approve a pending `Connect`. Returns `false` if no connection with
    /// that fingerprint is waiting.
    pub fn approve(&self, fingerprint: &str) -> bool {
        match self.pending.remove(fingerprint) {
            Some((_, decision)) => decision.send(true).is_ok(),
            None => false,
        }
    }

    /// Reject a pending `Connect`.
    pub fn reject(&self, fingerprint: &str) -> bool {
        match self.pending.remove(fingerprint) {
            Some((_, decision)) => decision.send(false).is_ok(),
            None => false,
        }
    }

    /// Park a connection in the approval gate; the returned receiver yields
    /// the administrator's decision.
    pub(crate) fn register_pending(&self, fingerprint: &str) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(fingerprint.to_owned(), tx);
        rx
    }

    pub(crate) fn register_live(&self, id: u64, client: LiveClient) {
        self.live.insert(id, client);
    }

    pub(crate) fn set_state(&self, id: u64, state: ConnState) {
        if let Some(mut client) = self.live.get_mut(&id) {
            client.state = state;
        }
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.live.remove(&id);
    }

    /// Snapshot of all live, established connections
    #[must_use]
    pub fn clients(&self) -> Vec<ClientSummary> {
        self.live
            .iter()
            .map(|c| ClientSummary {
                fingerprint: c.fingerprint.clone(),
                remote: c.remote,
                connected_at: c.connected_at,
                state: c.state,
            })
            .collect()
    }

    /// Load the persisted ban list. A missing file is an empty list;
    /// unknown magic or version is an error.
    pub fn load_banned(&self, path: &Path) -> std::io::Result<usize> {
        let mut file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut header = [0u8; 4 + 2 + 4];
        file.read_exact(&mut header)?;
        if header[0..4] != BAN_MAGIC {
            return Err(std::io::Error::other("banned file: bad magic"));
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != BAN_VERSION {
            return Err(std::io::Error::other(format!(
                "banned file: unsupported version {version}"
            )));
        }
        let count = u32::from_be_bytes([header[6], header[7], header[8], header[9]]);

        let mut record = [0u8; BAN_RECORD_LEN];
        for _ in 0..count {
            file.read_exact(&mut record)?;

            let key_hex = std::str::from_utf8(&record[0..64])
                .map_err(|_| std::io::Error::other("banned file: non-utf8 key"))?
                .to_owned();
            let mut at_bytes = [0u8; 8];
            at_bytes.copy_from_slice(&record[64..72]);
            let banned_at = i64::from_be_bytes(at_bytes);
            let reason_len = u16::from_be_bytes([record[72], record[73]]) as usize;
            if reason_len > REASON_MAX {
                return Err(std::io::Error::other("banned file: reason too long"));
            }
            let reason = String::from_utf8(record[74..74 + reason_len].to_vec())
                .map_err(|_| std::io::Error::other("banned file: non-utf8 reason"))?;

            self.banned.insert(key_hex, BanEntry { banned_at, reason });
        }

        Ok(count as usize)
    }

    /// Persist the ban list, truncating any previous file.
    pub fn save_banned(&self, path: &Path) -> std::io::Result<()> {
        let _guard = self
            .persist_lock
            .lock()
            .map_err(|_| std::io::Error::other("ban persist lock poisoned"))?;

        let entries: Vec<(String, BanEntry)> = self
            .banned
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut file = std::fs::File::create(path)?;
        file.write_all(&BAN_MAGIC)?;
        file.write_all(&BAN_VERSION.to_be_bytes())?;
        file.write_all(&(entries.len() as u32).to_be_bytes())?;

        for (key_hex, entry) in entries {
            let mut record = [0u8; BAN_RECORD_LEN];
            let key = key_hex.as_bytes();
            if key.len() != 64 {
                continue;
            }
            record[0..64].copy_from_slice(key);
            record[64..72].copy_from_slice(&entry.banned_at.to_be_bytes());
            let reason = entry.reason.as_bytes();
            let reason_len = reason.len().min(REASON_MAX);
            record[72..74].copy_from_slice(&(reason_len as u16).to_be_bytes());
            record[74..74 + reason_len].copy_from_slice(&reason[..reason_len]);
            file.write_all(&record)?;
        }

        file.sync_all()
    }
}

impl Default for AdminRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveClient {
    pub(crate) fn new(
        fingerprint: String,
        remote: IpAddr,
        session_key_hex: String,
        kick: mpsc::Sender<String>,
    ) -> Self {
        Self {
            fingerprint,
            remote,
            connected_at: now_ms(),
            session_key_hex,
            state: ConnState::Authenticated,
            kick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: char) -> String {
        std::iter::repeat_n(fill, 64).collect()
    }

    #[test]
    fn test_ban_unban() {
        let registry = AdminRegistry::new();
        let k = key('a');

        assert!(!registry.is_banned(&k));
        registry.ban(&k, "abuse");
        assert!(registry.is_banned(&k));
        assert_eq!(registry.ban_entry(&k).unwrap().reason, "abuse");

        assert!(registry.unban(&k));
        assert!(!registry.is_banned(&k));
        assert!(!registry.unban(&k));
    }

    #[test]
    fn test_ban_kicks_live_session() {
        let registry = AdminRegistry::new();
        let k = key('b');
        let (tx, mut rx) = mpsc::channel(1);

        registry.register_live(
            7,
            LiveClient::new(key('f'), "192.0.2.1".parse().unwrap(), k.clone(), tx),
        );

        registry.ban(&k, "abuse");
        assert_eq!(rx.try_recv().unwrap(), "abuse");
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let registry = AdminRegistry::new();

        let rx = registry.register_pending("finger");
        assert!(registry.approve("finger"));
        assert!(rx.await.unwrap());

        // Nothing pending any more.
        assert!(!registry.approve("finger"));

        let rx = registry.register_pending("other");
        assert!(registry.reject("other"));
        assert!(!rx.await.unwrap());
    }

    #[test]
    fn test_ban_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned.skbn");

        let registry = AdminRegistry::new();
        registry.ban(&key('a'), "abuse");
        registry.ban(&key('b'), "spam");
        registry.save_banned(&path).unwrap();

        let restored = AdminRegistry::new();
        assert_eq!(restored.load_banned(&path).unwrap(), 2);
        assert_eq!(restored.ban_entry(&key('a')).unwrap().reason, "abuse");
        assert_eq!(restored.ban_entry(&key('b')).unwrap().reason, "spam");
    }

    #[test]
    fn test_ban_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdminRegistry::new();
        assert_eq!(
            registry.load_banned(&dir.path().join("absent.skbn")).unwrap(),
            0
        );
    }

    #[test]
    fn test_ban_file_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned.skbn");
        std::fs::write(&path, b"XXXX\x00\x01\x00\x00\x00\x00").unwrap();

        let registry = AdminRegistry::new();
        assert!(registry.load_banned(&path).is_err());
    }

    #[test]
    fn test_ban_file_unknown_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned.skbn");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"SKBN");
        bytes.extend_from_slice(&9u16.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        std::fs::write(&path, bytes).unwrap();

        let registry = AdminRegistry::new();
        assert!(registry.load_banned(&path).is_err());
    }

    #[test]
    fn test_long_reason_truncated_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned.skbn");

        let registry = AdminRegistry::new();
        registry.ban(&key('c'), &"x".repeat(400));
        registry.save_banned(&path).unwrap();

        let restored = AdminRegistry::new();
        restored.load_banned(&path).unwrap();
        assert_eq!(restored.ban_entry(&key('c')).unwrap().reason.len(), 256);
    }
}
