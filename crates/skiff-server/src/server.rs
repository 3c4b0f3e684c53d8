//! Server assembly: shared context, accept loop, graceful shutdown.

use crate::admin::AdminRegistry;
use crate::admission::AdmissionControl;
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::storage::ObjectStorage;
use crate::transport::{self, Transport};
use skiff_crypto::atrest::ObjectCipher;
use skiff_store::DocumentStore;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Application-scoped state threaded through every connection.
///
/// Lifetime is tied to the server, never to a connection; the at-rest key
/// lives inside [`ObjectStorage`] and is generated fresh at startup.
pub struct ServerContext {
    /// Static configuration
    pub config: ServerConfig,
    /// Metadata store adapter
    pub store: Arc<dyn DocumentStore>,
    /// Encrypted object storage
    pub storage: ObjectStorage,
    /// Connection caps and rate windows
    pub admission: AdmissionControl,
    /// Ban list, approval gate, live-connection table
    pub admin: AdminRegistry,
}

/// Listener and TLS acceptor, ready to serve
pub struct Bound {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

/// The exchange server
pub struct Server {
    ctx: Arc<ServerContext>,
    next_id: AtomicU64,
}

impl Server {
    /// Assemble the server: fresh at-rest key, admission tables, persisted
    /// ban list.
    pub fn new(config: ServerConfig, store: Arc<dyn DocumentStore>) -> Result<Self, ServerError> {
        let cipher = ObjectCipher::generate()?;
        let storage = ObjectStorage::new(&config.storage_root, cipher);
        storage.ensure_root()?;
        let admission = AdmissionControl::new(config.admission.clone());

        let admin = AdminRegistry::new();
        let loaded = admin.load_banned(&config.banned_file)?;
        if loaded > 0 {
            tracing::info!(count = loaded, "loaded persisted ban list");
        }

        Ok(Self {
            ctx: Arc::new(ServerContext {
                config,
                store,
                storage,
                admission,
                admin,
            }),
            next_id: AtomicU64::new(1),
        })
    }

    /// Shared context handle (admission, admin surface, store)
    #[must_use]
    pub fn context(&self) -> Arc<ServerContext> {
        self.ctx.clone()
    }

    /// The in-process administrator surface
    #[must_use]
    pub fn admin(&self) -> &AdminRegistry {
        &self.ctx.admin
    }

    /// Admit and serve one already-established transport.
    ///
    /// Returns `None`, dropping the transport without a response, when the
    /// remote is at its connection cap. Used by in-process transports and
    /// the accept loop alike.
    pub fn spawn_connection<T>(
        &self,
        transport: T,
        remote: IpAddr,
    ) -> Option<tokio::task::JoinHandle<()>>
    where
        T: Transport + 'static,
    {
        if !self.ctx.admission.try_admit(remote) {
            tracing::warn!(remote = %remote, "connection limit exceeded");
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = match Connection::new(id, self.ctx.clone(), transport, remote) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(remote = %remote, kind = e.kind(), "connection setup failed");
                self.ctx.admission.release(remote);
                return None;
            }
        };
        Some(tokio::spawn(connection.run()))
    }

    /// Prepare the TLS acceptor and listening socket.
    pub async fn bind(&self) -> Result<Bound, ServerError> {
        let acceptor = transport::build_acceptor(&self.ctx.config.tls)?;
        let listener =
            TcpListener::bind(("0.0.0.0", self.ctx.config.port)).await?;
        tracing::info!(port = self.ctx.config.port, "server listening");
        Ok(Bound { listener, acceptor })
    }

    /// Accept connections until `shutdown` resolves, then persist the ban
    /// list and return.
    pub async fn run<F>(&self, bound: Bound, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Bound { listener, acceptor } = bound;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (tcp, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let remote = peer.ip();
                    if !self.ctx.admission.try_admit(remote) {
                        tracing::warn!(remote = %remote, "connection limit exceeded");
                        continue;
                    }

                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let ctx = self.ctx.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        let tls = match transport::accept_tls(&acceptor, tcp).await {
                            Ok(tls) => tls,
                            Err(e) => {
                                tracing::warn!(remote = %remote, error = %e, "tls accept failed");
                                ctx.admission.release(remote);
                                return;
                            }
                        };
                        match Connection::new(id, ctx.clone(), tls, remote) {
                            Ok(connection) => connection.run().await,
                            Err(e) => {
                                tracing::error!(remote = %remote, kind = e.kind(), "connection setup failed");
                                ctx.admission.release(remote);
                            }
                        }
                    });
                }
            }
        }

        tracing::info!("shutting down, persisting ban list");
        self.ctx.admin.save_banned(&self.ctx.config.banned_file)?;
        Ok(())
    }
}
