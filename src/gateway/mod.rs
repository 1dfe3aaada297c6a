mod shard;
pub use shard::{ConnectionEnd, Phase, Shard};

mod error;
pub use error::GatewayError;

mod session;
pub use session::Session;

mod close_event;
pub use close_event::CloseEvent;

mod shardinfo;
pub use shardinfo::ShardInfo;

mod outbound_message;
pub use outbound_message::OutboundMessage;

mod heartbeat;
pub use heartbeat::HeartbeatMonitor;

mod ratelimiter;
pub use ratelimiter::{Bucket, Quota, Ratelimiter};

mod dispatch;
pub use dispatch::{Dispatcher, FrameHandler, NoopHandler};

mod event_forwarding;
pub use event_forwarding::{
    ChannelEventForwarder, EventForwarder, ForwardedEvent, NoopEventForwarder,
};

mod backoff;

pub mod payloads;
pub use payloads::{Frame, Identify, Opcode};
