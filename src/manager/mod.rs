mod gateway_manager;
pub use gateway_manager::GatewayManager;

mod options;
pub use options::{Options, ShardCount, ZombieAction};

mod fatal_error;
pub use fatal_error::FatalError;
