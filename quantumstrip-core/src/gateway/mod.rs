use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod ant_media;
pub use ant_media::*;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Public STUN servers used when the gateway cannot provide a configuration
pub const FALLBACK_ICE_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("media server request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("media server responded with {status}: {message}")]
    Response { status: u16, message: String },
}

/// The broadcast object the media server tracks for one published stream
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub stream_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    pub urls: String,
}

/// What a client needs to initiate a WebRTC peer connection
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapConfig {
    pub ice_servers: Vec<IceServer>,
    /// Absent in the fallback configuration
    pub signaling_endpoint: Option<String>,
}

impl BootstrapConfig {
    /// A minimal configuration with public STUN only. Signaling can still be
    /// attempted with this, so callers use it instead of failing outright.
    pub fn fallback() -> Self {
        Self {
            ice_servers: FALLBACK_ICE_SERVERS
                .iter()
                .map(|urls| IceServer {
                    urls: urls.to_string(),
                })
                .collect(),
            signaling_endpoint: None,
        }
    }
}

/// Represents the external media server that owns the actual media plane.
/// Everything this system knows about it goes through here.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Provisions a broadcast object. Fatal to the caller on failure.
    async fn create_broadcast(
        &self,
        external_id: &str,
        display_name: &str,
        is_public: bool,
    ) -> GatewayResult<Broadcast>;

    async fn start_broadcast(&self, external_id: &str) -> GatewayResult<()>;
    async fn stop_broadcast(&self, external_id: &str) -> GatewayResult<()>;
    async fn delete_broadcast(&self, external_id: &str) -> GatewayResult<()>;

    /// The ICE server list and signaling endpoint for a fresh peer
    /// connection. Always refetched, never served from a stored record.
    async fn bootstrap_config(&self) -> GatewayResult<BootstrapConfig>;

    /// Operational check, not part of any critical path
    async fn health_check(&self) -> bool;
}
