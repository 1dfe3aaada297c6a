mod frame;
pub use frame::Frame;

mod opcode;
pub use opcode::Opcode;

mod heartbeat;
pub use heartbeat::Heartbeat;

mod identify;
pub use identify::{ConnectionProperties, Identify, IdentifyData};

mod resume;
pub use resume::Resume;

mod invalid_session;
pub use invalid_session::InvalidSession;

mod hello;
pub use hello::HelloData;

mod ready;
pub use ready::Ready;
