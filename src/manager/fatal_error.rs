use std::fmt;

/// A shard-terminal failure surfaced to the manager's error channel: either
/// an unretryable close code or an exhausted retry budget.
#[derive(Debug)]
pub struct FatalError {
    pub shard_id: u16,
    pub close_code: Option<u16>,
    pub error: String,
}

impl FatalError {
    pub fn new(shard_id: u16, close_code: Option<u16>, error: String) -> FatalError {
        FatalError {
            shard_id,
            close_code,
            error,
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.close_code {
            Some(code) => write!(f, "shard {} failed (close code {}): {}", self.shard_id, code, self.error),
            None => write!(f, "shard {} failed: {}", self.shard_id, self.error),
        }
    }
}
