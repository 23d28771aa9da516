use serde::{Deserialize, Serialize};

/// One entry of an RTCPeerConnection `iceServers` list. STUN entries carry no
/// credentials; TURN entries carry the minted time-limited pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: &str) -> Self {
        IceServer {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }
}

/// Per-user ICE configuration, one list per signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceConfig {
    pub game: Vec<IceServer>,
    pub video: Vec<IceServer>,
}
