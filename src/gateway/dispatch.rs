use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::payloads::{Frame, Heartbeat, HelloData, InvalidSession, Opcode, Ready, Resume};
use super::shard::{ConnectionEnd, Phase, Shard};
use super::ForwardedEvent;
use crate::Result;

#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle(&self, shard: &Arc<Shard>, frame: Frame) -> Result<()>;
}

/// Maps decoded frames to handlers: control frames by opcode, dispatch
/// frames by event name. Exactly one handler per key (the last registration
/// wins); a key nobody registered is a silent no-op, so new server-side
/// opcodes and events never break the client.
pub struct Dispatcher {
    ops: HashMap<Opcode, Box<dyn FrameHandler>>,
    events: HashMap<String, Box<dyn FrameHandler>>,
    fallback: Box<dyn FrameHandler>,
}

impl Dispatcher {
    /// An empty table: every frame is a no-op until handlers are registered.
    pub fn new() -> Dispatcher {
        Dispatcher {
            ops: HashMap::new(),
            events: HashMap::new(),
            fallback: Box::new(NoopHandler),
        }
    }

    /// The table every shard needs: protocol control frames, session
    /// bookkeeping on READY/RESUMED, and forwarding of everything else to
    /// the shard's [`EventForwarder`](super::EventForwarder).
    pub fn with_defaults() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();

        dispatcher.register_op(Opcode::Hello, Box::new(HelloHandler));
        dispatcher.register_op(Opcode::Heartbeat, Box::new(HeartbeatRequestHandler));
        dispatcher.register_op(Opcode::HeartbeatAck, Box::new(HeartbeatAckHandler));
        dispatcher.register_op(Opcode::Reconnect, Box::new(ReconnectHandler));
        dispatcher.register_op(Opcode::InvalidSession, Box::new(InvalidSessionHandler));

        dispatcher.register_event("READY", Box::new(ReadyHandler));
        dispatcher.register_event("RESUMED", Box::new(ResumedHandler));
        dispatcher.register_fallback(Box::new(ForwardHandler));

        dispatcher
    }

    pub fn register_op(&mut self, opcode: Opcode, handler: Box<dyn FrameHandler>) {
        self.ops.insert(opcode, handler);
    }

    pub fn register_event(&mut self, event_type: impl Into<String>, handler: Box<dyn FrameHandler>) {
        self.events.insert(event_type.into(), handler);
    }

    /// Handler for dispatch frames whose event name has no dedicated entry.
    pub fn register_fallback(&mut self, handler: Box<dyn FrameHandler>) {
        self.fallback = handler;
    }

    pub async fn dispatch(&self, shard: &Arc<Shard>, frame: Frame) -> Result<()> {
        match frame.opcode() {
            Some(Opcode::Dispatch) => {
                if let Some(seq) = frame.seq {
                    shard.observe_seq(seq);
                }

                let Some(event_type) = frame.event_type.as_deref() else {
                    debug!(shard_id = shard.shard_id(), "dispatch frame without event name dropped");
                    return Ok(());
                };

                match self.events.get(event_type) {
                    Some(handler) => handler.handle(shard, frame).await,
                    None => self.fallback.handle(shard, frame).await,
                }
            }

            Some(opcode) => match self.ops.get(&opcode) {
                Some(handler) => handler.handle(shard, frame).await,
                None => Ok(()),
            },

            None => {
                debug!(shard_id = shard.shard_id(), op = frame.op, "unknown opcode ignored");
                Ok(())
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub struct NoopHandler;

#[async_trait]
impl FrameHandler for NoopHandler {
    async fn handle(&self, _shard: &Arc<Shard>, _frame: Frame) -> Result<()> {
        Ok(())
    }
}

/// First frame after socket open: arms the heartbeat, then resumes the prior
/// session if one is held, else identifies once the shared budget grants a
/// slot. The slot wait runs off the read loop so frames keep being processed
/// and a shutdown can still tear the connection down.
struct HelloHandler;

#[async_trait]
impl FrameHandler for HelloHandler {
    async fn handle(&self, shard: &Arc<Shard>, frame: Frame) -> Result<()> {
        let hello: HelloData = frame.data_as()?;
        let interval = Duration::from_millis(hello.heartbeat_interval);
        let shard_id = shard.shard_id();

        shard.arm_heartbeat(interval);

        if let Some((session_id, seq)) = shard.resume_pair() {
            shard.set_phase(Phase::Resuming);
            info!(shard_id, %session_id, seq, "attempting to resume session");

            let resume = Resume::new(shard.token().to_owned(), session_id, seq);
            shard.write_and_wait(&resume).await?;
            shard.start_handshake_deadline();
        } else {
            shard.set_phase(Phase::Identifying);
            shard.spawn_identify(interval);
        }

        Ok(())
    }
}

/// The server may request an immediate beat outside the regular schedule.
struct HeartbeatRequestHandler;

#[async_trait]
impl FrameHandler for HeartbeatRequestHandler {
    async fn handle(&self, shard: &Arc<Shard>, _frame: Frame) -> Result<()> {
        shard.write_and_wait(&Heartbeat::new(shard.seq())).await
    }
}

struct HeartbeatAckHandler;

#[async_trait]
impl FrameHandler for HeartbeatAckHandler {
    async fn handle(&self, shard: &Arc<Shard>, _frame: Frame) -> Result<()> {
        shard.heartbeat_ack();
        Ok(())
    }
}

struct ReconnectHandler;

#[async_trait]
impl FrameHandler for ReconnectHandler {
    async fn handle(&self, shard: &Arc<Shard>, _frame: Frame) -> Result<()> {
        info!(shard_id = shard.shard_id(), "server requested reconnect");
        shard.interrupt(ConnectionEnd::Reconnect).await;
        Ok(())
    }
}

struct InvalidSessionHandler;

#[async_trait]
impl FrameHandler for InvalidSessionHandler {
    async fn handle(&self, shard: &Arc<Shard>, frame: Frame) -> Result<()> {
        let resumable = frame
            .data_as::<InvalidSession>()
            .map(|invalid| invalid.0)
            .unwrap_or(false);

        info!(shard_id = shard.shard_id(), resumable, "received invalid session");

        if !resumable {
            shard.clear_session();
        }

        shard
            .interrupt(ConnectionEnd::InvalidSession { resumable })
            .await;
        Ok(())
    }
}

struct ReadyHandler;

#[async_trait]
impl FrameHandler for ReadyHandler {
    async fn handle(&self, shard: &Arc<Shard>, frame: Frame) -> Result<()> {
        let ready: Ready = frame.data_as()?;

        shard.set_session_identified(ready.session_id, ready.resume_gateway_url);
        shard.mark_ready();

        info!(shard_id = shard.shard_id(), "shard ready");
        Ok(())
    }
}

struct ResumedHandler;

#[async_trait]
impl FrameHandler for ResumedHandler {
    async fn handle(&self, shard: &Arc<Shard>, _frame: Frame) -> Result<()> {
        shard.mark_ready();

        info!(shard_id = shard.shard_id(), seq = shard.seq(), "session resumed");
        Ok(())
    }
}

/// Hands dispatch events nobody claimed to the domain-model layer. The
/// forward is fire-and-forget: dispatch never waits on the collaborator.
struct ForwardHandler;

#[async_trait]
impl FrameHandler for ForwardHandler {
    async fn handle(&self, shard: &Arc<Shard>, frame: Frame) -> Result<()> {
        let Some(event_type) = frame.event_type else {
            return Ok(());
        };

        let event = ForwardedEvent {
            shard_id: shard.shard_id(),
            event_type,
            seq: frame.seq,
            data: frame.data,
        };

        let forwarder = shard.forwarder();
        tokio::spawn(async move {
            if let Err(e) = forwarder.forward(event).await {
                warn!(error = %e, "error forwarding event");
            }
        });

        Ok(())
    }
}
