use serde::Deserialize;

/// The subset of the READY dispatch payload the connection manager needs;
/// everything else in it belongs to the domain-model layer.
#[derive(Deserialize, Debug)]
pub struct Ready {
    pub session_id: String,

    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}
