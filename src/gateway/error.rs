use std::time::Duration;

use thiserror::Error;

use crate::gateway::outbound_message::OutboundMessage;
use crate::gateway::Phase;
use crate::manager::FatalError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("error while operating on websocket: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("received malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    #[error("error while encoding payload: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("server signalled a protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("identify budget exhausted, retry after {0:?}")]
    RateLimited(Duration),

    #[error("connection zombied: heartbeat ack not received before the next tick")]
    Zombied,

    #[error("shard {shard_id} is not ready (phase {phase:?})")]
    ShardUnavailable { shard_id: u16, phase: Phase },

    #[error("frame with op {0} carried no payload data")]
    MissingEventData(u8),

    #[error("no active websocket writer")]
    NoWriter,

    #[error("invalid gateway url: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("error while reading oneshot channel: {0}")]
    RecvError(#[from] tokio::sync::oneshot::error::RecvError),

    #[error("error while sending message to writer: {0}")]
    SendMessageError(#[from] tokio::sync::mpsc::error::SendError<OutboundMessage>),

    #[error("error while sending message to error chan: {0}")]
    SendErrorError(#[from] tokio::sync::mpsc::error::SendError<FatalError>),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Whether the connection this error occurred on can keep running. A
    /// malformed frame is dropped and the socket read on; anything touching
    /// the transport or the writer plumbing forces a reconnect.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            GatewayError::WebsocketError(_)
                | GatewayError::SendMessageError(_)
                | GatewayError::RecvError(_)
                | GatewayError::NoWriter
                | GatewayError::Io(_)
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_connection_fatality() {
        assert!(GatewayError::NoWriter.is_fatal_to_connection());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(GatewayError::Io(io).is_fatal_to_connection());

        // protocol-level trouble recycles the session, not the read loop
        assert!(!GatewayError::Zombied.is_fatal_to_connection());
        assert!(
            !GatewayError::ProtocolViolation("session invalidated".to_owned())
                .is_fatal_to_connection()
        );
        assert!(!GatewayError::RateLimited(Duration::from_secs(5)).is_fatal_to_connection());
        assert!(!GatewayError::MissingEventData(0).is_fatal_to_connection());
    }
}
