use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::Opcode;
use crate::gateway::GatewayError;
use crate::Result;

/// The wire envelope. `op` stays a raw integer so that frames carrying
/// opcodes we don't know about still decode; [`Frame::opcode`] maps onto the
/// closed [`Opcode`] enum and returns `None` for those.
#[derive(Serialize, Deserialize, Debug)]
pub struct Frame {
    pub op: u8,

    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

impl Frame {
    pub fn decode(raw: &[u8]) -> Result<Frame> {
        serde_json::from_slice(raw).map_err(GatewayError::MalformedFrame)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds an outbound command frame for [`Shard::send_command`].
    ///
    /// [`Shard::send_command`]: crate::gateway::Shard::send_command
    pub fn command<T: Serialize>(opcode: Opcode, payload: &T) -> Result<Frame> {
        Ok(Frame {
            op: opcode as u8,
            seq: None,
            event_type: None,
            data: Some(serde_json::value::to_raw_value(payload)?),
        })
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.op)
    }

    pub fn data_as<'a, T: Deserialize<'a>>(&'a self) -> Result<T> {
        let data = self
            .data
            .as_ref()
            .ok_or(GatewayError::MissingEventData(self.op))?;

        serde_json::from_str(data.get()).map_err(GatewayError::MalformedFrame)
    }
}

#[cfg(test)]
mod test {
    use super::super::HelloData;
    use super::*;

    #[test]
    fn test_decode_dispatch() {
        let raw = br#"{"op":0,"s":42,"t":"MESSAGE_CREATE","d":{"id":"123"}}"#;
        let frame = Frame::decode(raw).unwrap();

        assert_eq!(frame.opcode(), Some(Opcode::Dispatch));
        assert_eq!(frame.seq, Some(42));
        assert_eq!(frame.event_type.as_deref(), Some("MESSAGE_CREATE"));
        assert!(frame.data.is_some());
    }

    #[test]
    fn test_decode_null_fields() {
        let raw = br#"{"op":11,"s":null,"t":null,"d":null}"#;
        let frame = Frame::decode(raw).unwrap();

        assert_eq!(frame.opcode(), Some(Opcode::HeartbeatAck));
        assert_eq!(frame.seq, None);
        assert_eq!(frame.event_type, None);
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let raw = br#"{"op":99,"d":{"anything":true}}"#;
        let frame = Frame::decode(raw).unwrap();

        assert_eq!(frame.op, 99);
        assert_eq!(frame.opcode(), None);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            Frame::decode(b"not json"),
            Err(GatewayError::MalformedFrame(_))
        ));
        assert!(matches!(
            Frame::decode(br#"{"s":1}"#),
            Err(GatewayError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_data_as() {
        let raw = br#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        let frame = Frame::decode(raw).unwrap();

        let hello: HelloData = frame.data_as().unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
    }

    #[test]
    fn test_command_encode() {
        let frame =
            Frame::command(Opcode::RequestGuildMembers, &serde_json::json!({"limit": 0})).unwrap();
        let encoded = frame.encode().unwrap();

        assert!(encoded.contains(r#""op":8"#));
        assert!(encoded.contains(r#""limit":0"#));
        assert!(!encoded.contains(r#""s":"#));
        assert!(!encoded.contains(r#""t":"#));
    }
}
