#[derive(Debug)]
pub struct CloseEvent {
    pub status_code: u16,
    pub error: String,
}

impl CloseEvent {
    pub fn new(status_code: u16, error: String) -> Self {
        Self { status_code, error }
    }

    /// Authentication/configuration failures that a retry cannot fix.
    pub fn should_reconnect(&self) -> bool {
        !matches!(self.status_code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
    }

    /// 4007 = invalid seq, 4009 = session timed out. Either way the session
    /// must be discarded before the next attempt.
    pub fn is_resumable(&self) -> bool {
        !matches!(self.status_code, 4007 | 4009)
    }

    /// The server rejected an identify for exceeding the identify budget.
    pub fn is_rate_limit(&self) -> bool {
        self.status_code == 4008
    }
}
