//! Endpoint I/O glue: the pieces that turn the engine/session plumbing into
//! something a caller can actually `connect`/`bind`, `send`/`receive` and
//! `close` over a [`Datagram`] port.
//!
//! Grounded on `pkg/crypto/src/tls/client.rs`'s `Client::connect(reader,
//! writer, options) -> Result<ApplicationStream>` and `server.rs`'s
//! `Server::connect`, which drive a handshake to completion and hand back a
//! stream; generalized here to the datagram transport and the background
//! receive loop a connectionless socket needs instead of an owned
//! reader/writer pair. `application_stream.rs`'s read/write/flush surface is
//! the model for [`ClientEndpoint::send`]/[`ClientEndpoint::receive`].

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_std::sync::Mutex;
use async_std::task::JoinHandle;
use bytes::Bytes;

use crate::alert::{fatal_alert_for, Alert, AlertDescription};
use crate::config::{ClientConfig, ServerConfig};
use crate::context::HandshakeContext;
use crate::engine::client::ClientHandshake;
use crate::engine::pump::{HandshakePump, Ingested};
use crate::error::{Error, ErrorKind, Result};
use crate::io::{Datagram, PeerAddress};
use crate::record::{parse_datagram, serialize_records, Record, DTLS_1_2};
use crate::session::{DatagramOutcome, Session, SessionRegistry};

type DataCallback<A> = dyn Fn(A, Bytes) + Send + Sync;

enum ClientPhase {
    Handshaking(ClientHandshake),
    Established,
    Closed,
}

struct ClientState {
    ctx: HandshakeContext,
    pump: HandshakePump,
    phase: ClientPhase,
}

#[derive(Default)]
struct ClientInbox {
    queue: VecDeque<Bytes>,
    established: bool,
    closed: bool,
}

/// The initiator side of one connection: drives a single peer's handshake to
/// completion over a [`Datagram`] port, then exposes `send`/`receive` over
/// the resulting session.
pub struct ClientEndpoint<A: PeerAddress, D: Datagram<A>> {
    transport: Arc<D>,
    peer: A,
    config: Arc<ClientConfig>,
    state: Mutex<ClientState>,
    inbox: crate::sync::Condvar<ClientInbox>,
    data_callback: StdMutex<Option<Arc<DataCallback<A>>>>,
    shutdown: Arc<AtomicBool>,
    receive_task: StdMutex<Option<JoinHandle<()>>>,
}

impl<A: PeerAddress, D: Datagram<A>> ClientEndpoint<A, D> {
    /// Sends the opening flight and blocks until the handshake reaches
    /// established or `connect_timeout` elapses.
    pub async fn connect(
        transport: Arc<D>,
        peer: A,
        config: Arc<ClientConfig>,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>> {
        let mut ctx = HandshakeContext::new(DTLS_1_2);
        let mut pump = HandshakePump::new();
        let mut handshake = ClientHandshake::new(config.clone());
        let step = handshake.start(&mut ctx, &mut pump).await?;
        if !step.outbound.is_empty() {
            let raw = serialize_records(&step.outbound);
            transport.send(&peer, &raw[..]).await?;
        }

        let endpoint = Arc::new(Self {
            transport,
            peer: peer.clone(),
            config,
            state: Mutex::new(ClientState { ctx, pump, phase: ClientPhase::Handshaking(handshake) }),
            inbox: crate::sync::Condvar::new(ClientInbox::default()),
            data_callback: StdMutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            receive_task: StdMutex::new(None),
        });

        let task = async_std::task::spawn(Self::receive_loop(endpoint.clone()));
        *endpoint.receive_task.lock().unwrap() = Some(task);

        endpoint
            .inbox
            .wait_until(connect_timeout, |inbox| if inbox.established || inbox.closed { Some(()) } else { None })
            .await?;

        let failed = {
            let inbox = endpoint.inbox.lock().await;
            inbox.closed && !inbox.established
        };
        if failed {
            return Err(Error::new(ErrorKind::HandshakeFailure));
        }

        Ok(endpoint)
    }

    async fn receive_loop(this: Arc<Self>) {
        loop {
            if this.shutdown.load(Ordering::Relaxed) {
                return;
            }
            let (from, raw) = match this.transport.recv().await {
                Ok(v) => v,
                Err(e) if e.kind() == ErrorKind::Timeout => continue,
                Err(e) => {
                    log::warn!("{:?}: datagram receive failed: {}", this.peer, e);
                    continue;
                }
            };
            if from != this.peer {
                // A single-peer port should never see another source
                // address; a shared socket demultiplexing by address would
                // dispatch here directly instead of going through recv.
                continue;
            }
            let records = match parse_datagram(raw) {
                Ok(r) => r,
                Err(e) => {
                    log::debug!("{:?}: dropping malformed datagram: {}", this.peer, e);
                    continue;
                }
            };
            this.ingest(records).await;
        }
    }

    async fn ingest(&self, records: Vec<Record>) {
        let mut state = self.state.lock().await;
        for record in records {
            let events = match state.pump.ingest_datagram(vec![record]) {
                Ok(events) => events,
                Err(err) => {
                    log::warn!("{:?}: fatal record-layer error, closing connection: {}", self.peer, err);
                    let alert = fatal_alert_for(err.kind());
                    let record = state.pump.send_alert(state.ctx.version, alert);
                    self.transport.send(&self.peer, &serialize_records(&[record])[..]).await.ok();
                    state.phase = ClientPhase::Closed;
                    let mut inbox = self.inbox.lock().await;
                    inbox.closed = true;
                    inbox.notify_all();
                    return;
                }
            };
            for event in events {
                if self.handle_event(&mut state, event).await {
                    return;
                }
            }
        }
    }

    /// Returns `true` once the connection has closed.
    async fn handle_event(&self, state: &mut ClientState, event: Ingested) -> bool {
        match &state.phase {
            ClientPhase::Handshaking(_) => {
                let outcome = {
                    let ClientState { ctx, pump, phase } = &mut *state;
                    let handshake = match phase {
                        ClientPhase::Handshaking(h) => h,
                        _ => unreachable!(),
                    };
                    handshake.advance(ctx, pump, event).await
                };
                let step = match outcome {
                    Ok(step) => step,
                    Err(err) => {
                        log::warn!("{:?}: handshake error: {}", self.peer, err);
                        let alert = fatal_alert_for(err.kind());
                        let record = state.pump.send_alert(state.ctx.version, alert);
                        self.transport.send(&self.peer, &serialize_records(&[record])[..]).await.ok();
                        state.phase = ClientPhase::Closed;
                        let mut inbox = self.inbox.lock().await;
                        inbox.closed = true;
                        inbox.notify_all();
                        return true;
                    }
                };

                if !step.outbound.is_empty() {
                    let raw = serialize_records(&step.outbound);
                    self.transport.send(&self.peer, &raw[..]).await.ok();
                }
                if step.established {
                    state.phase = ClientPhase::Established;
                    let mut inbox = self.inbox.lock().await;
                    inbox.established = true;
                    inbox.notify_all();
                }
                if step.fatal_alert.is_some() {
                    state.phase = ClientPhase::Closed;
                    let mut inbox = self.inbox.lock().await;
                    inbox.closed = true;
                    inbox.notify_all();
                    return true;
                }
                false
            }
            ClientPhase::Established => match event {
                Ingested::Nothing | Ingested::FutureEpoch => false,
                Ingested::ApplicationData(data) => {
                    if let Some(cb) = self.data_callback.lock().unwrap().clone() {
                        cb(self.peer.clone(), data.clone());
                    }
                    let mut inbox = self.inbox.lock().await;
                    inbox.queue.push_back(data);
                    inbox.notify_all();
                    false
                }
                Ingested::Alert(alert) => {
                    // Any alert, warning or fatal, ends the connection.
                    if matches!(alert.description, AlertDescription::CloseNotify) {
                        let record = state
                            .pump
                            .send_alert(state.ctx.version, Alert::warning(AlertDescription::CloseNotify));
                        self.transport.send(&self.peer, &serialize_records(&[record])[..]).await.ok();
                    }
                    state.phase = ClientPhase::Closed;
                    let mut inbox = self.inbox.lock().await;
                    inbox.closed = true;
                    inbox.notify_all();
                    true
                }
                Ingested::ChangeCipherSpec | Ingested::Handshake { .. } => {
                    let record = state
                        .pump
                        .send_alert(state.ctx.version, Alert::fatal(AlertDescription::UnexpectedMessage));
                    self.transport.send(&self.peer, &serialize_records(&[record])[..]).await.ok();
                    state.phase = ClientPhase::Closed;
                    let mut inbox = self.inbox.lock().await;
                    inbox.closed = true;
                    inbox.notify_all();
                    true
                }
            },
            ClientPhase::Closed => true,
        }
    }

    /// Encrypts and transports `data` to the peer. Fails if the handshake
    /// hasn't completed yet.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        if !matches!(state.phase, ClientPhase::Established) || !state.pump.record_layer.write_cipher_active() {
            return Err(Error::new(ErrorKind::InternalError));
        }

        let version = state.ctx.version;
        let explicit_iv_len = state.pump.record_layer.write_explicit_iv_len();
        let mut explicit_iv = vec![0u8; explicit_iv_len];
        if explicit_iv_len > 0 {
            self.config.endpoint.random.fill(&mut explicit_iv).await?;
        }
        let record = state.pump.send_application_data(version, data, &explicit_iv);
        drop(state);

        let raw = serialize_records(&[record]);
        self.transport.send(&self.peer, &raw[..]).await
    }

    /// Blocks until application data is available, the connection closes, or
    /// `deadline` elapses.
    pub async fn receive(&self, deadline: Duration) -> Result<Bytes> {
        loop {
            self.inbox
                .wait_until(deadline, |inbox| if !inbox.queue.is_empty() || inbox.closed { Some(()) } else { None })
                .await?;

            let mut inbox = self.inbox.lock().await;
            if let Some(data) = inbox.queue.pop_front() {
                return Ok(data);
            }
            if inbox.closed {
                return Err(Error::new(ErrorKind::InternalError));
            }
        }
    }

    /// Registers a callback invoked with every delivered application-data
    /// payload, in addition to (not instead of) [`Self::receive`].
    pub fn set_data_callback<F>(&self, callback: F)
    where
        F: Fn(A, Bytes) + Send + Sync + 'static,
    {
        *self.data_callback.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Stops the receive loop and, if established, sends a best-effort
    /// `close_notify`.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        if matches!(state.phase, ClientPhase::Established) {
            let version = state.ctx.version;
            let record = state.pump.send_alert(version, Alert::warning(AlertDescription::CloseNotify));
            drop(state);
            let raw = serialize_records(&[record]);
            self.transport.send(&self.peer, &raw[..]).await.ok();
        }
        let mut inbox = self.inbox.lock().await;
        inbox.closed = true;
        inbox.notify_all();
    }
}

/// The responder side: accepts datagrams from any peer, runs the cookie
/// round trip and per-peer session dispatch of [`SessionRegistry`], and
/// surfaces delivered application data through a callback since a server
/// endpoint has no single caller blocked in `receive`.
pub struct ServerEndpoint<A: PeerAddress, D: Datagram<A>> {
    transport: Arc<D>,
    registry: Arc<SessionRegistry<A>>,
    data_callback: StdMutex<Option<Arc<DataCallback<A>>>>,
    watched: StdMutex<HashSet<A>>,
    shutdown: Arc<AtomicBool>,
    receive_task: StdMutex<Option<JoinHandle<()>>>,
}

impl<A: PeerAddress, D: Datagram<A>> ServerEndpoint<A, D> {
    pub fn bind(transport: Arc<D>, config: Arc<ServerConfig>) -> Arc<Self> {
        let endpoint = Arc::new(Self {
            transport,
            registry: Arc::new(SessionRegistry::new(config)),
            data_callback: StdMutex::new(None),
            watched: StdMutex::new(HashSet::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            receive_task: StdMutex::new(None),
        });
        let task = async_std::task::spawn(Self::receive_loop(endpoint.clone()));
        *endpoint.receive_task.lock().unwrap() = Some(task);
        endpoint
    }

    async fn receive_loop(this: Arc<Self>) {
        loop {
            if this.shutdown.load(Ordering::Relaxed) {
                return;
            }
            let (peer, raw) = match this.transport.recv().await {
                Ok(v) => v,
                Err(e) if e.kind() == ErrorKind::Timeout => continue,
                Err(e) => {
                    log::warn!("datagram receive failed: {}", e);
                    continue;
                }
            };
            match this.registry.handle_datagram(&peer, raw).await {
                Ok(DatagramOutcome::Stateless(records)) if !records.is_empty() => {
                    let out = serialize_records(&records);
                    this.transport.send(&peer, &out[..]).await.ok();
                }
                Ok(DatagramOutcome::Stateless(_)) | Ok(DatagramOutcome::Nothing) => {}
                Ok(DatagramOutcome::Session { session, outcome }) => {
                    if !outcome.outbound.is_empty() {
                        let out = serialize_records(&outcome.outbound);
                        this.transport.send(&peer, &out[..]).await.ok();
                    }
                    if outcome.established {
                        this.watch_session(peer, session);
                    }
                }
                Err(e) => {
                    log::debug!("{:?}: dropping malformed datagram: {}", peer, e);
                }
            }
        }
    }

    /// Spawns (once per peer) a background task that drains a newly
    /// established [`Session`]'s inbox into the data callback, since the
    /// session itself only exposes a pull-style `receive`.
    fn watch_session(self: &Arc<Self>, peer: A, session: Arc<Session<A>>) {
        if !self.watched.lock().unwrap().insert(peer.clone()) {
            return;
        }
        let this = self.clone();
        async_std::task::spawn(async move {
            loop {
                match session.receive(Duration::from_secs(3600)).await {
                    Ok(data) => {
                        if let Some(cb) = this.data_callback.lock().unwrap().clone() {
                            cb(peer.clone(), data);
                        }
                    }
                    Err(_) => {
                        this.watched.lock().unwrap().remove(&peer);
                        return;
                    }
                }
            }
        });
    }

    /// Encrypts and transports `data` to an already-established peer.
    pub async fn send(&self, peer: &A, data: &[u8]) -> Result<()> {
        let session = self.registry.get(peer).await.ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let records = session.send_application_data(data).await?;
        let raw = serialize_records(&records);
        self.transport.send(peer, &raw[..]).await
    }

    /// Registers the callback invoked with every peer's delivered
    /// application data.
    pub fn set_data_callback<F>(&self, callback: F)
    where
        F: Fn(A, Bytes) + Send + Sync + 'static,
    {
        *self.data_callback.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Stops accepting new datagrams and best-effort notifies every active
    /// session with a `close_notify`.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for session in self.registry.snapshot().await {
            let records = session.close().await;
            if !records.is_empty() {
                let raw = serialize_records(&records);
                self.transport.send(session.peer(), &raw[..]).await.ok();
            }
        }
    }
}
