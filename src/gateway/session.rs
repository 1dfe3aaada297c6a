/// Per-connection session continuity state. Owned by exactly one
/// [`Shard`](super::Shard) and only ever written from that shard's own task.
#[derive(Clone, Debug, Default)]
pub struct Session {
    session_id: Option<String>,
    seq: Option<u64>,
    resume_gateway_url: Option<String>,
}

impl Session {
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn resume_gateway_url(&self) -> Option<&str> {
        self.resume_gateway_url.as_deref()
    }

    pub fn is_resumable(&self) -> bool {
        self.session_id.is_some() && self.seq.is_some()
    }

    /// Both halves of a resume request, or `None` if the session can't be
    /// continued.
    pub fn resume_pair(&self) -> Option<(String, u64)> {
        Some((self.session_id.clone()?, self.seq?))
    }

    /// Records the sequence number of a dispatch frame. The counter never
    /// moves backwards for the life of a session id.
    pub fn observe_seq(&mut self, seq: u64) {
        self.seq = Some(self.seq.map_or(seq, |current| current.max(seq)));
    }

    pub fn set_identified(&mut self, session_id: String, resume_gateway_url: Option<String>) {
        self.session_id = Some(session_id);
        self.resume_gateway_url = resume_gateway_url;
    }

    pub fn clear(&mut self) {
        self.session_id = None;
        self.seq = None;
        self.resume_gateway_url = None;
    }
}
