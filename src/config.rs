use serde::Deserialize;

use crate::manager::{Options, ShardCount, ZombieAction};

#[derive(Deserialize, Debug)]
pub struct Config {
    // Required
    pub token: String,
    pub shard_total: u16,
    pub gateway_url: String,

    // Range of shards run by this process; defaults to all of them
    #[serde(default)]
    pub shard_lowest: u16,
    pub shard_highest: Option<u16>,

    #[serde(default)]
    pub intents: u64,
    pub large_threshold: Option<i32>,

    #[serde(default = "one")]
    pub identify_budget_per_window: u32,
    #[serde(default = "five_seconds")]
    pub identify_window_millis: u64,

    #[serde(default = "thirty_seconds")]
    pub max_reconnect_backoff_millis: u64,
    #[serde(default = "ten")]
    pub max_reconnect_attempts: u32,

    #[serde(default)]
    pub heartbeat_zombie_action: ZombieAction,
}

impl Config {
    pub fn from_envvar() -> Config {
        envy::from_env::<Config>().expect("Parsing config failed")
    }

    pub fn into_options(self) -> Options {
        let shard_count = ShardCount {
            total: self.shard_total,
            lowest: self.shard_lowest,
            highest: self.shard_highest.unwrap_or(self.shard_total),
        };

        Options {
            token: self.token,
            shard_count,
            intents: self.intents,
            large_threshold: self.large_threshold,
            gateway_url: self.gateway_url,
            identify_budget_per_window: self.identify_budget_per_window,
            identify_window_millis: self.identify_window_millis,
            max_reconnect_backoff_millis: self.max_reconnect_backoff_millis,
            max_reconnect_attempts: self.max_reconnect_attempts,
            heartbeat_zombie_action: self.heartbeat_zombie_action,
        }
    }
}

fn one() -> u32 {
    1
}

fn five_seconds() -> u64 {
    5_000
}

fn thirty_seconds() -> u64 {
    30_000
}

fn ten() -> u32 {
    10
}
