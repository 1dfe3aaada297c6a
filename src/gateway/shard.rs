use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::payloads::{self, Frame, Opcode};
use super::{
    Bucket, CloseEvent, Dispatcher, EventForwarder, GatewayError, HeartbeatMonitor,
    OutboundMessage, Ratelimiter, Session,
};
use crate::manager::{FatalError, Options, ZombieAction};
use crate::Result;

type WebSocketTx = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WebSocketRx = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const GATEWAY_VERSION: u8 = 10;

// How long an identify or resume may go unanswered before the attempt is
// treated as failed.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Where a shard connection is in its lifecycle. Written only from the
/// shard's own task; read by [`Shard::send_command`] callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Identifying,
    Resuming,
    Ready,
    Reconnecting,
    Closed,
}

/// Why a connection stopped. Drives the supervision loop's decision between
/// resume, re-identify and giving up.
#[derive(Debug)]
pub enum ConnectionEnd {
    /// External shutdown request; terminal.
    Shutdown,
    /// The heartbeat monitor missed an ack.
    Zombied,
    /// The server asked us to reconnect; the session stays resumable.
    Reconnect,
    InvalidSession { resumable: bool },
    /// Identify/resume went unanswered within the deadline.
    HandshakeTimeout,
    /// Socket closed, with the close frame if the server sent one.
    Closed(Option<CloseEvent>),
    Transport(GatewayError),
}

/// One logical shard: a single websocket connection plus the state machine
/// that keeps it alive. All phase and session mutation happens on the
/// shard's own task; the only cross-task state it touches is the shared
/// ratelimiter.
pub struct Shard {
    identify: payloads::Identify,
    options: Arc<Options>,
    ratelimiter: Arc<Ratelimiter>,
    dispatcher: Dispatcher,
    forwarder: Arc<dyn EventForwarder>,
    error_tx: mpsc::Sender<FatalError>,

    phase: RwLock<Phase>,
    session: Arc<RwLock<Session>>,
    writer: RwLock<Option<mpsc::Sender<OutboundMessage>>>,
    heartbeat: parking_lot::Mutex<HeartbeatMonitor>,
    identify_cancel: parking_lot::Mutex<Option<oneshot::Sender<()>>>,

    interrupt_tx: mpsc::Sender<ConnectionEnd>,
    interrupt_rx: Mutex<mpsc::Receiver<ConnectionEnd>>,
    kill_shard_tx: mpsc::Sender<()>,
    kill_shard_rx: Mutex<mpsc::Receiver<()>>,

    connect_time: RwLock<Instant>,
    handshake_deadline: RwLock<Option<Instant>>,
    became_ready: AtomicBool,
}

impl Shard {
    pub fn new(
        identify: payloads::Identify,
        options: Arc<Options>,
        ratelimiter: Arc<Ratelimiter>,
        dispatcher: Dispatcher,
        forwarder: Arc<dyn EventForwarder>,
        error_tx: mpsc::Sender<FatalError>,
    ) -> Arc<Shard> {
        let (kill_shard_tx, kill_shard_rx) = mpsc::channel(1);
        let (interrupt_tx, interrupt_rx) = mpsc::channel(4);
        let shard_id = identify.data.shard_info.shard_id;

        Arc::new(Shard {
            identify,
            options,
            ratelimiter,
            dispatcher,
            forwarder,
            error_tx,
            phase: RwLock::new(Phase::Connecting),
            session: Arc::new(RwLock::new(Session::default())),
            writer: RwLock::new(None),
            heartbeat: parking_lot::Mutex::new(HeartbeatMonitor::new(shard_id)),
            identify_cancel: parking_lot::Mutex::new(None),
            interrupt_tx,
            interrupt_rx: Mutex::new(interrupt_rx),
            kill_shard_tx,
            kill_shard_rx: Mutex::new(kill_shard_rx),
            connect_time: RwLock::new(Instant::now()),
            handshake_deadline: RwLock::new(None),
            became_ready: AtomicBool::new(false),
        })
    }

    pub fn shard_id(&self) -> u16 {
        self.identify.data.shard_info.shard_id
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    pub fn seq(&self) -> Option<u64> {
        self.session.read().seq()
    }

    pub fn session_snapshot(&self) -> Session {
        self.session.read().clone()
    }

    /// Requests shutdown. The state machine unwinds from whatever it is
    /// waiting on and parks in `Closed`.
    pub fn kill(&self) {
        // capacity 1; a second request while one is pending changes nothing
        let _ = self.kill_shard_tx.try_send(());
    }

    /// Supervision loop: connect, classify how the connection ended, decide
    /// whether the session survives, back off, retry. Runs until shutdown,
    /// an unretryable close code, or the retry budget is spent; the latter
    /// two surface a [`FatalError`] to the manager and only stop this shard.
    pub async fn run(self: Arc<Self>) {
        let shard_id = self.shard_id();
        let mut backoff = Backoff::new(
            RECONNECT_BASE_DELAY,
            Duration::from_millis(self.options.max_reconnect_backoff_millis),
        );
        let mut attempts: u32 = 0;

        loop {
            let end = match self.connect().await {
                Ok(end) => end,
                Err(e) => {
                    warn!(shard_id, error = %e, "failed to establish connection");
                    ConnectionEnd::Transport(e)
                }
            };

            // a pass through Ready means the remote accepted us; start the
            // retry accounting over
            if self.became_ready.swap(false, Ordering::SeqCst) {
                attempts = 0;
                backoff.reset();
            }

            let mut rate_limited = false;
            match end {
                ConnectionEnd::Shutdown => {
                    self.set_phase(Phase::Closed);
                    info!(shard_id, "shard shut down");
                    return;
                }

                ConnectionEnd::Zombied => {
                    warn!(shard_id, error = %GatewayError::Zombied, "connection zombied");

                    if self.options.heartbeat_zombie_action == ZombieAction::Fatal {
                        self.report_fatal(None, GatewayError::Zombied.to_string())
                            .await;
                        self.set_phase(Phase::Closed);
                        return;
                    }
                    // session preserved so the next attempt resumes
                }

                ConnectionEnd::Reconnect => {
                    info!(shard_id, "reconnecting at the server's request");
                }

                ConnectionEnd::InvalidSession { resumable } => {
                    // non-resumable sessions were already cleared by the
                    // handler, before any new identify could run
                    let err = GatewayError::ProtocolViolation(format!(
                        "session invalidated by the server (resumable: {resumable})"
                    ));
                    info!(shard_id, error = %err, "recycling connection");
                }

                ConnectionEnd::HandshakeTimeout => {
                    warn!(shard_id, "handshake did not complete in time");
                }

                ConnectionEnd::Closed(Some(close)) => {
                    if !close.should_reconnect() {
                        self.report_fatal(Some(close.status_code), close.error).await;
                        self.set_phase(Phase::Closed);
                        return;
                    }

                    if close.is_rate_limit() {
                        let retry_after =
                            Duration::from_millis(self.options.identify_window_millis);
                        warn!(shard_id, error = %GatewayError::RateLimited(retry_after), "identify rejected");
                        rate_limited = true;
                    } else {
                        warn!(
                            shard_id,
                            code = close.status_code,
                            reason = %close.error,
                            "gateway closed the connection"
                        );
                    }

                    if !close.is_resumable() {
                        self.session.write().clear();
                    }
                }

                ConnectionEnd::Closed(None) => {
                    debug!(shard_id, "connection closed without a close frame");
                }

                ConnectionEnd::Transport(e) => {
                    warn!(shard_id, error = %e, "transport error, reconnecting");
                }
            }

            attempts += 1;
            if attempts > self.options.max_reconnect_attempts {
                self.report_fatal(
                    None,
                    format!("shard could not be revived after {} attempts", attempts - 1),
                )
                .await;
                self.set_phase(Phase::Closed);
                return;
            }

            self.set_phase(Phase::Reconnecting);

            let mut delay = backoff.next();
            if rate_limited {
                delay = delay.max(Duration::from_millis(self.options.identify_window_millis));
            }
            debug!(shard_id, ?delay, attempt = attempts, "waiting before reconnect");

            let mut kill_rx = self.kill_shard_rx.lock().await;
            tokio::select! {
                _ = kill_rx.recv() => {
                    self.set_phase(Phase::Closed);
                    info!(shard_id, "shard shut down");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// One connection attempt: dial, run the read loop, tear down. Teardown
    /// happens on every exit path; dropping the writer handle closes the
    /// socket.
    async fn connect(self: &Arc<Self>) -> Result<ConnectionEnd> {
        self.set_phase(Phase::Connecting);
        *self.handshake_deadline.write() = None;
        self.became_ready.store(false, Ordering::SeqCst);

        // interrupts from a previous connection are stale
        {
            let mut interrupt_rx = self.interrupt_rx.lock().await;
            while interrupt_rx.try_recv().is_ok() {}
        }

        let url = self.connect_url()?;
        info!(shard_id = self.shard_id(), %url, "connecting to gateway");

        let (stream, _) = connect_async(url).await?;
        let (ws_tx, ws_rx) = stream.split();
        *self.connect_time.write() = Instant::now();

        let (writer_tx, writer_rx) = mpsc::channel(16);
        tokio::spawn(async move {
            Shard::handle_writes(ws_tx, writer_rx).await;
        });
        *self.writer.write() = Some(writer_tx);

        let end = self.listen(ws_rx).await;

        self.heartbeat.lock().disarm();
        self.cancel_identify();
        *self.writer.write() = None;
        *self.handshake_deadline.write() = None;

        Ok(end)
    }

    fn connect_url(&self) -> Result<url::Url> {
        let base = {
            let session = self.session.read();
            match session.is_resumable() {
                true => session.resume_gateway_url().map(str::to_owned),
                false => None,
            }
        }
        .unwrap_or_else(|| self.options.gateway_url.clone());

        Ok(url::Url::parse(&format!(
            "{}/?v={}&encoding=json",
            base.trim_end_matches('/'),
            GATEWAY_VERSION
        ))?)
    }

    async fn handle_writes(mut ws_tx: WebSocketTx, mut rx: mpsc::Receiver<OutboundMessage>) {
        while let Some(msg) = rx.recv().await {
            let res = ws_tx.send(Message::Text(msg.message)).await;

            if msg.tx.send(res).is_err() {
                debug!("write result receiver dropped");
            }
        }
    }

    /// Read loop: frames from the socket are decoded and handled inline, in
    /// arrival order, so seq monotonicity holds. Returns when the connection
    /// is over, never on a bad frame.
    async fn listen(self: &Arc<Self>, mut ws_rx: WebSocketRx) -> ConnectionEnd {
        let shard_id = self.shard_id();
        let mut kill_rx = self.kill_shard_rx.lock().await;
        let mut interrupt_rx = self.interrupt_rx.lock().await;

        loop {
            let deadline = *self.handshake_deadline.read();

            tokio::select! {
                _ = kill_rx.recv() => {
                    info!(shard_id, "received kill message");
                    return ConnectionEnd::Shutdown;
                }

                Some(end) = interrupt_rx.recv() => return end,

                _ = deadline_sleep(deadline) => {
                    warn!(shard_id, "no response to identify/resume within deadline");
                    return ConnectionEnd::HandshakeTimeout;
                }

                msg = ws_rx.next() => match msg {
                    None => return ConnectionEnd::Closed(None),

                    Some(Err(e)) => return ConnectionEnd::Transport(e.into()),

                    Some(Ok(Message::Close(frame))) => {
                        let close = frame
                            .map(|f| CloseEvent::new(u16::from(f.code), f.reason.to_string()));
                        info!(shard_id, ?close, "got close from gateway");
                        return ConnectionEnd::Closed(close);
                    }

                    Some(Ok(Message::Text(raw))) => {
                        if let Some(end) = self.handle_raw(raw.as_bytes()).await {
                            return end;
                        }
                    }

                    Some(Ok(Message::Binary(raw))) => {
                        if let Some(end) = self.handle_raw(&raw).await {
                            return end;
                        }
                    }

                    Some(Ok(_)) => {} // ping/pong, handled by the transport
                }
            }
        }
    }

    async fn handle_raw(self: &Arc<Self>, raw: &[u8]) -> Option<ConnectionEnd> {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                // a single bad frame is dropped, the connection carries on
                warn!(shard_id = self.shard_id(), error = %e, "dropping malformed frame");
                return None;
            }
        };

        if let Err(e) = self.handle_frame(frame).await {
            if e.is_fatal_to_connection() {
                return Some(ConnectionEnd::Transport(e));
            }
            warn!(shard_id = self.shard_id(), error = %e, "error handling frame");
        }

        None
    }

    pub(crate) async fn handle_frame(self: &Arc<Self>, frame: Frame) -> Result<()> {
        self.dispatcher.dispatch(self, frame).await
    }

    /// Outward command surface: enqueue a command frame on this shard's
    /// socket. Fails with [`GatewayError::ShardUnavailable`] unless the
    /// shard is in `Ready`.
    pub async fn send_command<T: Serialize>(&self, opcode: Opcode, payload: &T) -> Result<()> {
        let phase = self.phase();
        if phase != Phase::Ready {
            return Err(GatewayError::ShardUnavailable {
                shard_id: self.shard_id(),
                phase,
            });
        }

        self.ratelimiter
            .acquire(Bucket::Commands(self.shard_id()))
            .await;

        let frame = Frame::command(opcode, payload)?;
        self.write_and_wait(&frame).await
    }

    async fn write<T: Serialize>(
        &self,
        msg: T,
        tx: oneshot::Sender<std::result::Result<(), tokio_tungstenite::tungstenite::Error>>,
    ) -> Result<()> {
        let writer = self.writer.read().clone().ok_or(GatewayError::NoWriter)?;

        OutboundMessage::new(msg, tx)?.send(writer).await?;
        Ok(())
    }

    pub(crate) async fn write_and_wait<T: Serialize>(&self, msg: T) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.write(msg, tx).await?;

        rx.await??;
        Ok(())
    }

    pub(crate) async fn write_identify(&self) -> Result<()> {
        self.write_and_wait(&self.identify).await
    }

    pub(crate) async fn acquire_identify_slot(&self) {
        self.ratelimiter.acquire(Bucket::Identify).await;
    }

    /// Waits for an identify slot and sends the identify on its own task, so
    /// the read loop keeps draining acks and a kill still tears the
    /// connection down while the budget is contended. Teardown aborts the
    /// wait via the cancel channel.
    pub(crate) fn spawn_identify(self: &Arc<Self>, interval: Duration) {
        self.cancel_identify();

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        *self.identify_cancel.lock() = Some(cancel_tx);

        let shard = Arc::clone(self);
        tokio::spawn(async move {
            let shard_id = shard.shard_id();

            tokio::select! {
                _ = &mut cancel_rx => return,
                _ = shard.acquire_identify_slot() => {}
            }

            // Waited at the budget for longer than a heartbeat interval: the
            // server has already given up on this socket, start over.
            if shard.connect_age() > interval {
                warn!(shard_id, "identify slot granted too late, reconnecting");
                shard.interrupt(ConnectionEnd::HandshakeTimeout).await;
                return;
            }

            if let Err(e) = shard.write_identify().await {
                warn!(shard_id, error = %e, "failed to write identify");
                shard.interrupt(ConnectionEnd::Transport(e)).await;
                return;
            }

            shard.start_handshake_deadline();
            info!(shard_id, "identify sent");
        });
    }

    fn cancel_identify(&self) {
        if let Some(cancel) = self.identify_cancel.lock().take() {
            let _ = cancel.send(());
        }
    }

    pub(crate) async fn interrupt(&self, end: ConnectionEnd) {
        let _ = self.interrupt_tx.send(end).await;
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        *self.phase.write() = phase;
        debug!(shard_id = self.shard_id(), ?phase, "phase transition");
    }

    pub(crate) fn mark_ready(&self) {
        *self.handshake_deadline.write() = None;
        self.became_ready.store(true, Ordering::SeqCst);
        self.set_phase(Phase::Ready);
    }

    pub(crate) fn start_handshake_deadline(&self) {
        *self.handshake_deadline.write() = Some(Instant::now() + HANDSHAKE_TIMEOUT);
    }

    pub(crate) fn connect_age(&self) -> Duration {
        self.connect_time.read().elapsed()
    }

    pub(crate) fn observe_seq(&self, seq: u64) {
        self.session.write().observe_seq(seq);
    }

    pub(crate) fn resume_pair(&self) -> Option<(String, u64)> {
        self.session.read().resume_pair()
    }

    pub(crate) fn set_session_identified(
        &self,
        session_id: String,
        resume_gateway_url: Option<String>,
    ) {
        self.session
            .write()
            .set_identified(session_id, resume_gateway_url);
    }

    pub(crate) fn clear_session(&self) {
        self.session.write().clear();
    }

    pub(crate) fn token(&self) -> &str {
        &self.identify.data.token
    }

    pub(crate) fn arm_heartbeat(&self, interval: Duration) {
        let writer = match self.writer.read().clone() {
            Some(writer) => writer,
            None => {
                warn!(shard_id = self.shard_id(), "no writer to arm heartbeat against");
                return;
            }
        };

        self.heartbeat.lock().arm(
            interval,
            writer,
            Arc::clone(&self.session),
            self.interrupt_tx.clone(),
        );
    }

    pub(crate) fn heartbeat_ack(&self) {
        self.heartbeat.lock().ack();
    }

    pub(crate) fn forwarder(&self) -> Arc<dyn EventForwarder> {
        Arc::clone(&self.forwarder)
    }

    async fn report_fatal(&self, close_code: Option<u16>, error_msg: String) {
        let fatal = FatalError::new(self.shard_id(), close_code, error_msg);

        if let Err(e) = self.error_tx.send(fatal).await {
            error!(shard_id = self.shard_id(), error = %e, "failed to report fatal shard error");
        }
    }
}

async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
