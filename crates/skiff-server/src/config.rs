//! Server configuration.

use skiff_proto::{DEFAULT_PORT, MAX_FILE_SIZE};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,

    /// Flat directory of encrypted objects
    pub storage_root: PathBuf,

    /// Persisted ban list
    pub banned_file: PathBuf,

    /// TLS material paths
    pub tls: TlsConfig,

    /// Admission control limits
    pub admission: AdmissionConfig,

    /// Tear down a connection after this long without read progress
    pub idle_timeout: Duration,

    /// Cadence of `WaitingApproval` responses inside the approval gate
    pub approval_poll: Duration,

    /// Maximum accepted upload size in bytes
    pub max_file_size: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            storage_root: PathBuf::from("filetrade"),
            banned_file: PathBuf::from("banned_clients.skbn"),
            tls: TlsConfig::default(),
            admission: AdmissionConfig::default(),
            idle_timeout: Duration::from_secs(300),
            approval_poll: Duration::from_secs(5),
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// TLS material locations
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Server certificate chain (PEM)
    pub cert_path: PathBuf,

    /// Server private key (PEM)
    pub key_path: PathBuf,

    /// Trust anchor used to verify client chains (PEM)
    pub trust_anchor_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("certs/server-cert.pem"),
            key_path: PathBuf::from("certs/server-key.pem"),
            trust_anchor_path: PathBuf::from("certs/ca.pem"),
        }
    }
}

/// Admission control limits
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Maximum live connections from one remote address
    pub max_connections_per_ip: usize,

    /// Sliding window length for the request rate limit
    pub rate_window: Duration,

    /// Commands allowed per window per remote address
    pub max_requests_per_window: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_connections_per_ip: 10,
            rate_window: Duration::from_secs(60),
            max_requests_per_window: 100,
        }
    }
}
