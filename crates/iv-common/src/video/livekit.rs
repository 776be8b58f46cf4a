//! Twirp/JSON client for a LiveKit-compatible server API.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use super::token::{AccessTokenIssuer, VideoGrant};
use super::{VideoError, VideoProvider};
use crate::storage::S3Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Turn a `wss://`/`ws://` client URL into the HTTP base used for server calls.
pub fn http_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EgressResponse {
    #[serde(alias = "egressId")]
    egress_id: String,
}

#[derive(Debug, Clone)]
pub struct LiveKitClient {
    http: reqwest::Client,
    base_url: String,
    issuer: AccessTokenIssuer,
    recording_target: Option<S3Config>,
}

impl LiveKitClient {
    pub fn new(
        url: &str,
        issuer: AccessTokenIssuer,
        recording_target: Option<S3Config>,
    ) -> Result<Self, VideoError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: http_base_url(url),
            issuer,
            recording_target,
        })
    }

    async fn call<B, R>(
        &self,
        service: &str,
        method: &str,
        grant: VideoGrant,
        body: &B,
    ) -> Result<R, VideoError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.issuer.service_token(grant)?;
        let url = format!("{}/twirp/livekit.{service}/{method}", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        debug!(service, method, status = %status, "video provider response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VideoError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|err| VideoError::Decode(err.to_string()))
    }
}

#[async_trait]
impl VideoProvider for LiveKitClient {
    #[instrument(skip(self))]
    async fn create_room(&self, room: &str, empty_timeout_sec: u32) -> Result<(), VideoError> {
        let _: serde_json::Value = self
            .call(
                "RoomService",
                "CreateRoom",
                VideoGrant::room_create(),
                &json!({ "name": room, "empty_timeout": empty_timeout_sec }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_room(&self, room: &str) -> Result<(), VideoError> {
        let _: serde_json::Value = self
            .call(
                "RoomService",
                "DeleteRoom",
                VideoGrant::room_create(),
                &json!({ "room": room }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, metadata))]
    async fn dispatch_agent(
        &self,
        room: &str,
        agent_name: &str,
        metadata: &str,
    ) -> Result<String, VideoError> {
        let response: DispatchResponse = self
            .call(
                "AgentDispatchService",
                "CreateDispatch",
                VideoGrant::room_admin(room),
                &json!({ "room": room, "agent_name": agent_name, "metadata": metadata }),
            )
            .await?;
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn start_recording(&self, room: &str, object_key: &str) -> Result<String, VideoError> {
        let target = self
            .recording_target
            .as_ref()
            .ok_or(VideoError::NotConfigured("recording storage"))?;

        let mut s3 = json!({
            "access_key": target.access_key_id,
            "secret": target.secret_access_key,
            "region": target.region,
            "bucket": target.bucket,
            "force_path_style": target.force_path_style,
        });
        if let Some(endpoint) = &target.endpoint {
            s3["endpoint"] = json!(endpoint);
        }

        let response: EgressResponse = self
            .call(
                "Egress",
                "StartRoomCompositeEgress",
                VideoGrant::room_record(),
                &json!({
                    "room_name": room,
                    "layout": "speaker",
                    "file_outputs": [{
                        "file_type": "MP4",
                        "filepath": object_key,
                        "s3": s3,
                    }],
                }),
            )
            .await?;
        Ok(response.egress_id)
    }

    #[instrument(skip(self))]
    async fn stop_recording(&self, egress_id: &str) -> Result<(), VideoError> {
        let _: serde_json::Value = self
            .call(
                "Egress",
                "StopEgress",
                VideoGrant::room_record(),
                &json!({ "egress_id": egress_id }),
            )
            .await?;
        Ok(())
    }
}
