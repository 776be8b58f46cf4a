use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::VideoError;

/// Permissions carried in the `video` claim of a provider token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_join: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_create: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_record: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish_data: Option<bool>,
}

impl VideoGrant {
    /// Participant grant scoped to one room.
    pub fn join(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            room_join: Some(true),
            can_publish: Some(true),
            can_subscribe: Some(true),
            can_publish_data: Some(true),
            ..Default::default()
        }
    }

    pub fn room_create() -> Self {
        Self {
            room_create: Some(true),
            ..Default::default()
        }
    }

    pub fn room_admin(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            room_admin: Some(true),
            ..Default::default()
        }
    }

    pub fn room_record() -> Self {
        Self {
            room_record: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub video: VideoGrant,
}

/// Signs HS256 provider tokens with the API key pair.
#[derive(Clone)]
pub struct AccessTokenIssuer {
    api_key: String,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for AccessTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenIssuer")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl AccessTokenIssuer {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            encoding_key: EncodingKey::from_secret(api_secret.as_bytes()),
        }
    }

    pub fn issue(
        &self,
        identity: &str,
        name: Option<&str>,
        grant: VideoGrant,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, VideoError> {
        let claims = AccessClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
            name: name.map(str::to_string),
            video: grant,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Service token used to authenticate server API calls.
    pub fn service_token(&self, grant: VideoGrant) -> Result<String, VideoError> {
        self.issue(
            &self.api_key,
            None,
            grant,
            Duration::minutes(10),
            Utc::now(),
        )
    }
}
