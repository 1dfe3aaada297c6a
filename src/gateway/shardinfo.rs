use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serialized on the wire as the two-element array `[shard_id, shard_count]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardInfo {
    pub shard_id: u16,
    pub shard_count: u16,
}

impl ShardInfo {
    pub fn new(shard_id: u16, shard_count: u16) -> ShardInfo {
        ShardInfo {
            shard_id,
            shard_count,
        }
    }
}

impl Serialize for ShardInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;

        seq.serialize_element(&self.shard_id)?;
        seq.serialize_element(&self.shard_count)?;

        seq.end()
    }
}

impl<'de> Deserialize<'de> for ShardInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seq: [u16; 2] = Deserialize::deserialize(deserializer)?;

        Ok(ShardInfo {
            shard_id: seq[0],
            shard_count: seq[1],
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let info = ShardInfo::new(3, 16);
        assert_eq!(serde_json::to_string(&info).unwrap(), "[3,16]");

        let parsed: ShardInfo = serde_json::from_str("[3,16]").unwrap();
        assert_eq!(parsed, info);
    }
}
