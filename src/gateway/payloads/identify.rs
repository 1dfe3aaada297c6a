use super::Opcode;
use crate::gateway::ShardInfo;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct Identify {
    #[serde(rename = "op")]
    opcode: Opcode,

    #[serde(rename = "d")]
    pub data: IdentifyData,
}

impl Identify {
    /// large_threshold must be between 50 and 250 inclusive, if Some
    pub fn new(
        token: String,
        large_threshold: Option<i32>,
        shard_info: ShardInfo,
        intents: u64,
    ) -> Identify {
        if let Some(large_threshold) = large_threshold {
            if !(50..=250).contains(&large_threshold) {
                panic!("large_threshold must be between 50 and 250 inclusive");
            }
        }

        Identify {
            opcode: Opcode::Identify,
            data: IdentifyData {
                token,
                properties: ConnectionProperties::new(),
                compress: None,
                large_threshold,
                shard_info,
                intents,
            },
        }
    }
}

#[derive(Serialize, Debug)]
pub struct IdentifyData {
    pub token: String,

    pub properties: ConnectionProperties,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<i32>,

    #[serde(rename = "shard")]
    pub shard_info: ShardInfo,

    pub intents: u64,
}

#[derive(Serialize, Debug)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

const LIBRARY_NAME: &str = "shardgate";

impl ConnectionProperties {
    pub fn new() -> ConnectionProperties {
        ConnectionProperties {
            os: std::env::consts::OS.to_owned(),
            browser: LIBRARY_NAME.to_owned(),
            device: LIBRARY_NAME.to_owned(),
        }
    }
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self::new()
    }
}
