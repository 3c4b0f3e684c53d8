//! Mutually-authenticated transport.
//!
//! The server core is generic over [`Transport`]: a duplex byte stream that
//! knows its peer's certificate fingerprint. Production connections are TLS
//! 1.2+ with a required client certificate verified against a configured
//! trust anchor; tests drive the same state machine over in-memory duplex
//! pairs via [`LocalTransport`].

use crate::config::TlsConfig;
use sha2::{Digest, Sha256};
use std::io::BufReader;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig as RustlsConfig};
use tokio_rustls::server::TlsStream;

/// A mutually-authenticated duplex stream
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Lowercase hex SHA-256 of the peer's leaf certificate
    fn peer_fingerprint(&self) -> &str;
}

/// Compute the protocol identity of a certificate: lowercase hex SHA-256 of
/// its DER encoding.
#[must_use]
pub fn certificate_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Build the TLS acceptor from configured certificate, key and trust anchor.
pub fn build_acceptor(config: &TlsConfig) -> std::io::Result<TlsAcceptor> {
    let cert_file = std::fs::File::open(&config.cert_path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()?;

    let key_file = std::fs::File::open(&config.key_path)?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))?
        .ok_or_else(|| std::io::Error::other("no private key in key file"))?;

    let anchor_file = std::fs::File::open(&config.trust_anchor_path)?;
    let mut roots = RootCertStore::empty();
    for anchor in rustls_pemfile::certs(&mut BufReader::new(anchor_file)) {
        roots
            .add(anchor?)
            .map_err(|e| std::io::Error::other(format!("bad trust anchor: {e}")))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| std::io::Error::other(format!("client verifier: {e}")))?;

    let tls = RustlsConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| std::io::Error::other(format!("tls config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(tls)))
}

/// TLS connection with the peer identity extracted
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
    fingerprint: String,
}

/// Run the TLS handshake and extract the client's fingerprint.
pub async fn accept_tls(acceptor: &TlsAcceptor, tcp: TcpStream) -> std::io::Result<TlsTransport> {
    let stream = acceptor.accept(tcp).await?;

    let fingerprint = {
        let (_, session) = stream.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| std::io::Error::other("client presented no certificate"))?;
        certificate_fingerprint(leaf.as_ref())
    };

    Ok(TlsTransport {
        stream,
        fingerprint,
    })
}

impl Transport for TlsTransport {
    fn peer_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl AsyncRead for TlsTransport {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsTransport {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Transport over an arbitrary duplex stream with an externally asserted
/// fingerprint. Used by in-process callers and the integration tests.
pub struct LocalTransport<S> {
    stream: S,
    fingerprint: String,
}

impl<S> LocalTransport<S> {
    /// Wrap `stream`, asserting `fingerprint` as the peer identity
    pub fn new(stream: S, fingerprint: impl Into<String>) -> Self {
        Self {
            stream,
            fingerprint: fingerprint.into(),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport for LocalTransport<S> {
    fn peer_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for LocalTransport<S> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for LocalTransport<S> {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_lowercase_hex_sha256() {
        let fp = certificate_fingerprint(b"not a real certificate");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        // Deterministic for the same DER bytes.
        assert_eq!(fp, certificate_fingerprint(b"not a real certificate"));
        assert_ne!(fp, certificate_fingerprint(b"another certificate"));
    }

    #[tokio::test]
    async fn test_local_transport_passes_bytes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (a, b) = tokio::io::duplex(64);
        let mut left = LocalTransport::new(a, "aa".repeat(32));
        let mut right = LocalTransport::new(b, "bb".repeat(32));

        left.write_all(b"ping").await.unwrap();
        left.flush().await.unwrap();

        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(left.peer_fingerprint(), "aa".repeat(32));
    }
}
