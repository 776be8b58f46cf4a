//! Video session provider seam.
//!
//! Rooms, recording egress and agent dispatch are remote operations behind
//! [`VideoProvider`]; room credentials are signed locally by
//! [`token::AccessTokenIssuer`].

pub mod livekit;
pub mod stub;
pub mod token;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use livekit::LiveKitClient;
pub use stub::StubVideoProvider;
pub use token::{AccessTokenIssuer, VideoGrant};

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("video provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to sign provider token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("unexpected provider response: {0}")]
    Decode(String),
    #[error("video provider not configured: {0}")]
    NotConfigured(&'static str),
}

#[async_trait]
pub trait VideoProvider: Send + Sync + 'static {
    async fn create_room(&self, room: &str, empty_timeout_sec: u32) -> Result<(), VideoError>;

    async fn delete_room(&self, room: &str) -> Result<(), VideoError>;

    /// Ask the provider to send the named worker into `room`. Returns the dispatch id.
    async fn dispatch_agent(
        &self,
        room: &str,
        agent_name: &str,
        metadata: &str,
    ) -> Result<String, VideoError>;

    /// Start a composite recording of `room` into `object_key`. Returns the egress id.
    async fn start_recording(&self, room: &str, object_key: &str) -> Result<String, VideoError>;

    async fn stop_recording(&self, egress_id: &str) -> Result<(), VideoError>;
}

/// JSON handed to the dispatched agent; it reads `prompt` and `openingMessage`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_message: Option<&'a str>,
}

impl AgentMetadata<'_> {
    pub fn to_json(&self) -> Result<String, VideoError> {
        serde_json::to_string(self).map_err(|err| VideoError::Decode(err.to_string()))
    }
}
