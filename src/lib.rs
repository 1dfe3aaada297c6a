pub mod gateway;
pub use gateway::*;

pub mod manager;
pub use manager::{GatewayManager, Options, ShardCount, ZombieAction};

mod config;
pub use config::Config;

mod util;
pub use util::await_shutdown;

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
