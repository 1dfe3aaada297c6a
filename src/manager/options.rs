use serde::Deserialize;

/// Static configuration shared by every shard of one manager.
#[derive(Clone, Debug)]
pub struct Options {
    pub token: String,
    pub shard_count: ShardCount,
    pub intents: u64,
    pub large_threshold: Option<i32>,
    pub gateway_url: String,

    /// How many identifies the whole manager may start per window.
    pub identify_budget_per_window: u32,
    pub identify_window_millis: u64,

    pub max_reconnect_backoff_millis: u64,
    /// Consecutive failed revival attempts before a shard is written off.
    pub max_reconnect_attempts: u32,
    pub heartbeat_zombie_action: ZombieAction,
}

/// `total` is the global shard count used in the identify handshake;
/// `lowest..highest` is the range this process runs.
#[derive(Clone, Copy, Debug)]
pub struct ShardCount {
    pub total: u16,
    pub lowest: u16,
    pub highest: u16,
}

impl ShardCount {
    pub fn ids(&self) -> impl Iterator<Item = u16> {
        self.lowest..self.highest
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZombieAction {
    /// Tear the connection down and resume over a fresh socket.
    #[default]
    ForceReconnect,
    /// Report a fatal error and stop the shard.
    Fatal,
}
