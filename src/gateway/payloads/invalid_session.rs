use serde::Deserialize;

/// The `d` field of an InvalidSession frame: whether the server considers
/// the dropped session resumable.
#[derive(Deserialize, Debug)]
pub struct InvalidSession(pub bool);
