//! Per-connection protocol state machine.
//!
//! One connection = one task = one `Connection` value. The task is the only
//! reader and writer of its transport, so state transitions are sequential
//! and responses leave in command order. States advance strictly forward;
//! the only re-entry is `Authenticated` after a `Transferring` episode.
//!
//! ```text
//! HandshakeInit -> HandshakeResponse -> SessionKey -> Authenticated
//!                                       Authenticated <-> Transferring
//!                                       any -> Closed
//! ```

use crate::admin::LiveClient;
use crate::error::ServerError;
use crate::server::ServerContext;
use crate::transport::Transport;
use skiff_crypto::{constant_time, hash};
use skiff_proto::records::{CommandRecord, KxInit, KxResponse, Record, ResponseRecord, SessionKeyRecord};
use skiff_proto::session::{FileMeta, SessionContext};
use skiff_proto::{Command, SessionError, Status, WireError, framing};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Transport accepted, first record expected
    HandshakeInit,
    /// Key-exchange response being sent
    HandshakeResponse,
    /// Awaiting the session-key confirmation
    SessionKey,
    /// Session established; commands accepted
    Authenticated,
    /// Bulk transfer in progress
    Transferring,
    /// Torn down
    Closed,
}

/// Loop control after one command
pub(crate) enum Flow {
    Continue,
    Close,
}

/// Consecutive out-of-state records tolerated before closing
const MISUSE_LIMIT: u8 = 3;

/// One live client connection
pub struct Connection<T: Transport> {
    pub(crate) id: u64,
    pub(crate) transport: T,
    pub(crate) remote: IpAddr,
    pub(crate) fingerprint: String,
    pub(crate) ctx: Arc<ServerContext>,
    pub(crate) session: SessionContext,
    pub(crate) state: ConnState,
    pub(crate) idle: Duration,
    kick_tx: mpsc::Sender<String>,
    kick_rx: mpsc::Receiver<String>,
    registered: bool,
    gate_complete: bool,
    misuse: u8,
}

impl<T: Transport> Connection<T> {
    /// Wrap an accepted, admission-checked transport.
    ///
    /// Fails only if the CSPRNG cannot produce the ephemeral key pair.
    pub fn new(
        id: u64,
        ctx: Arc<ServerContext>,
        transport: T,
        remote: IpAddr,
    ) -> Result<Self, ServerError> {
        let fingerprint = transport.peer_fingerprint().to_owned();
        let idle = ctx.config.idle_timeout;
        let (kick_tx, kick_rx) = mpsc::channel(1);
        Ok(Self {
            id,
            transport,
            remote,
            fingerprint,
            ctx,
            session: SessionContext::new()?,
            state: ConnState::HandshakeInit,
            idle,
            kick_tx,
            kick_rx,
            registered: false,
            gate_complete: false,
            misuse: 0,
        })
    }

    /// Drive the connection to completion, then release its resources.
    pub async fn run(mut self) {
        let result = self.serve().await;
        self.set_state(ConnState::Closed);

        match &result {
            Ok(()) => {
                tracing::info!(remote = %self.remote, "connection closed");
            }
            Err(ServerError::Wire(WireError::TransportClosed)) => {
                tracing::info!(remote = %self.remote, "peer disconnected");
            }
            Err(ServerError::IdleTimeout) => {
                tracing::info!(remote = %self.remote, "connection timed out");
            }
            Err(ServerError::Banned(_)) => {
                tracing::warn!(remote = %self.remote, "banned client closed");
            }
            Err(e) => {
                tracing::warn!(
                    remote = %self.remote,
                    state = ?self.state,
                    kind = e.kind(),
                    "connection error"
                );
            }
        }

        self.ctx.admission.release(self.remote);
        if self.registered {
            self.ctx.admin.unregister(self.id);
        }
        // Session key material is zeroised when `self.session` drops.
    }

    async fn serve(&mut self) -> Result<(), ServerError> {
        self.handshake().await?;

        loop {
            let record = tokio::select! {
                read = tokio::time::timeout(
                    self.idle,
                    framing::read_record::<_, CommandRecord>(&mut self.transport),
                ) => match read {
                    Err(_) => return Err(ServerError::IdleTimeout),
                    Ok(record) => record?,
                },
                reason = self.kick_rx.recv() => {
                    let reason = reason.unwrap_or_default();
                    self.send_banned(&reason).await?;
                    return Err(ServerError::Banned(reason));
                }
            };

            match self.handle_command(record).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => return Ok(()),
                Err(e) => {
                    let (status, close) = e.disposition();
                    if let Some(status) = status {
                        self.send_status(status, 0).await?;
                    }
                    if close {
                        return Err(e);
                    }
                    tracing::debug!(
                        remote = %self.remote,
                        kind = e.kind(),
                        "command refused"
                    );
                }
            }
        }
    }

    /// Mutual key agreement, session-key confirmation, ban gate.
    async fn handshake(&mut self) -> Result<(), ServerError> {
        let init: KxInit = self.read_timed().await?;

        if let Err(e) = self.session.accept_peer(&init.public_key) {
            self.send_status(Status::InvalidKey, 0).await?;
            return Err(e.into());
        }
        self.set_state(ConnState::HandshakeResponse);

        // Sealing an empty metadata blob proves to the client that we hold
        // the same derived key.
        let empty = FileMeta {
            filename: String::new(),
            size: 0,
            recipient: None,
        };
        let metadata = self.session.seal_meta(&empty)?;
        let response = KxResponse {
            public_key: self.session.public_key(),
            tag: metadata.fname_tag,
            metadata,
        };
        framing::write_record(&mut self.transport, &response).await?;
        self.set_state(ConnState::SessionKey);

        let confirm: SessionKeyRecord = self.read_timed().await?;
        if !constant_time::verify_32(&hash::hash32(&confirm.session_key), &confirm.key_hash) {
            self.send_status(Status::AuthFailed, 0).await?;
            return Err(SessionError::AuthFailed.into());
        }

        // Ban lookup happens on the presented key, before the derivation
        // comparison, so a banned identity is refused as Banned rather than
        // AuthFailed.
        let key_hex = hex::encode(confirm.session_key);
        if let Some(entry) = self.ctx.admin.ban_entry(&key_hex) {
            self.send_banned(&entry.reason).await?;
            return Err(ServerError::Banned(entry.reason));
        }

        let derivation_ok = {
            let expected = self.session.session_key()?;
            constant_time::verify_32(&confirm.session_key, expected)
        };
        if !derivation_ok {
            self.send_status(Status::AuthFailed, 0).await?;
            return Err(SessionError::AuthFailed.into());
        }

        self.ctx.admin.register_live(
            self.id,
            LiveClient::new(
                self.fingerprint.clone(),
                self.remote,
                key_hex,
                self.kick_tx.clone(),
            ),
        );
        self.registered = true;
        self.set_state(ConnState::Authenticated);
        self.send_status(Status::Success, 0).await?;

        tracing::info!(remote = %self.remote, "session established");
        Ok(())
    }

    async fn handle_command(&mut self, record: CommandRecord) -> Result<Flow, ServerError> {
        if !self.ctx.admission.check_rate(self.remote) {
            self.send_status(Status::RateLimited, 0).await?;
            return Ok(Flow::Continue);
        }

        self.session.authenticate_command(&record)?;

        let Some(command) = Command::from_tag(record.tag) else {
            tracing::debug!(remote = %self.remote, tag = record.tag, "unknown command");
            self.send_status(Status::UnknownCommand, 0).await?;
            return Ok(Flow::Continue);
        };

        if command != Command::Connect {
            self.misuse = 0;
        }

        tracing::debug!(remote = %self.remote, command = ?command, "dispatch");

        match command {
            Command::Ping => {
                self.send_status(Status::Success, 0).await?;
                Ok(Flow::Continue)
            }
            Command::Disconnect => {
                self.send_status(Status::Success, 0).await?;
                Ok(Flow::Close)
            }
            Command::List => {
                self.handle_list().await?;
                Ok(Flow::Continue)
            }
            Command::Upload => {
                self.handle_upload(&record).await?;
                Ok(Flow::Continue)
            }
            Command::Download => {
                self.handle_download(&record).await?;
                Ok(Flow::Continue)
            }
            Command::Connect => self.handle_connect().await,
        }
    }

    /// Administrator approval gate. Parks the connection, emitting
    /// `WaitingApproval` on a fixed cadence until a decision arrives.
    async fn handle_connect(&mut self) -> Result<Flow, ServerError> {
        if self.gate_complete {
            // The gate is not re-enterable; drain with no response.
            self.misuse += 1;
            if self.misuse >= MISUSE_LIMIT {
                return Err(ServerError::Misuse);
            }
            return Ok(Flow::Continue);
        }

        let mut decision = self.ctx.admin.register_pending(&self.fingerprint);
        let poll = self.ctx.config.approval_poll;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + poll, poll);

        loop {
            tokio::select! {
                result = &mut decision => {
                    return match result {
                        Ok(true) => {
                            self.gate_complete = true;
                            self.send_status(Status::Approved, 0).await?;
                            Ok(Flow::Continue)
                        }
                        Ok(false) | Err(_) => {
                            self.send_status(Status::Rejected, 0).await?;
                            Ok(Flow::Close)
                        }
                    };
                }
                _ = ticker.tick() => {
                    self.send_status(Status::WaitingApproval, 0).await?;
                }
            }
        }
    }

    /// Read one fixed-layout record under the inactivity deadline.
    pub(crate) async fn read_timed<R: Record>(&mut self) -> Result<R, ServerError> {
        match tokio::time::timeout(self.idle, framing::read_record::<_, R>(&mut self.transport))
            .await
        {
            Err(_) => Err(ServerError::IdleTimeout),
            Ok(record) => Ok(record?),
        }
    }

    /// Send a response. Signed once the session is established, zero
    /// nonce/tag before that.
    pub(crate) async fn send_status(
        &mut self,
        status: Status,
        size: i64,
    ) -> Result<(), ServerError> {
        let mut record = ResponseRecord {
            status: status.tag(),
            size,
            nonce: [0u8; 24],
            auth_tag: [0u8; 16],
        };
        if self.session.established() {
            self.session.sign_response(&mut record)?;
        }
        framing::write_record(&mut self.transport, &record).await?;
        Ok(())
    }

    /// `Banned` response followed by the reason bytes.
    pub(crate) async fn send_banned(&mut self, reason: &str) -> Result<(), ServerError> {
        self.send_status(Status::Banned, reason.len() as i64).await?;
        framing::write_all(&mut self.transport, reason.as_bytes()).await?;
        Ok(())
    }

    pub(crate) fn set_state(&mut self, state: ConnState) {
        self.state = state;
        if self.registered {
            self.ctx.admin.set_state(self.id, state);
        }
    }
}
