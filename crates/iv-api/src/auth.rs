use axum::async_trait;
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use clap::ValueEnum;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::error::ApiError;

pub const ORG_HEADER: &str = "x-org-id";
const MAX_ORG_ID_CHARS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    Jwt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum JwtAlgorithm {
    Hs256,
    Hs512,
    Rs256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtKeyKind {
    Secret,
    RsaPublicKey,
}

impl JwtAlgorithm {
    fn algorithm(self) -> Algorithm {
        match self {
            JwtAlgorithm::Hs256 => Algorithm::HS256,
            JwtAlgorithm::Hs512 => Algorithm::HS512,
            JwtAlgorithm::Rs256 => Algorithm::RS256,
        }
    }

    pub fn key_kind(self) -> JwtKeyKind {
        match self {
            JwtAlgorithm::Hs256 | JwtAlgorithm::Hs512 => JwtKeyKind::Secret,
            JwtAlgorithm::Rs256 => JwtKeyKind::RsaPublicKey,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwt_public_key: Option<String>,
    pub jwt_algorithm: JwtAlgorithm,
}

/// Authenticated admin caller scoped to one organization.
#[derive(Debug, Clone)]
pub struct OrgContext {
    pub subject: String,
    pub org_id: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    org_id: Option<String>,
    #[allow(dead_code)]
    exp: Option<usize>,
}

struct Authenticated {
    subject: String,
    org_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for OrgContext
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);

        let authenticated = match config.mode {
            AuthMode::ApiKey => authorize_api_key(parts, &config)?,
            AuthMode::Jwt => authorize_jwt(parts, &config)?,
        };

        let org_id = authenticated
            .org_id
            .map(|org| org.trim().to_string())
            .filter(|org| !org.is_empty())
            .ok_or(ApiError::BadRequest("ORG_REQUIRED"))?;

        if org_id.chars().count() > MAX_ORG_ID_CHARS {
            return Err(ApiError::BadRequest("ORG_ID_TOO_LONG"));
        }

        Ok(OrgContext {
            subject: authenticated.subject,
            org_id,
        })
    }
}

fn authorize_api_key(parts: &Parts, config: &AuthConfig) -> Result<Authenticated, ApiError> {
    let expected = config
        .api_key
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing IV_API_KEY".into()))?;

    let provided = parts
        .headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing X-API-Key header".into()))?;

    if !keys_match(provided, expected) {
        return Err(ApiError::Unauthorized("invalid API key".into()));
    }

    // Service callers name the org they act for.
    let org_id = parts
        .headers
        .get(ORG_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    Ok(Authenticated {
        subject: "api_key".to_string(),
        org_id,
    })
}

/// Constant-time in the key contents; only the length comparison may short-circuit.
fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn decoding_key(config: &AuthConfig) -> Result<DecodingKey, ApiError> {
    match config.jwt_algorithm.key_kind() {
        JwtKeyKind::Secret => config
            .jwt_secret
            .as_deref()
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()))
            .ok_or_else(|| ApiError::Unauthorized("missing JWT_SECRET".into())),
        JwtKeyKind::RsaPublicKey => {
            let pem = config
                .jwt_public_key
                .as_deref()
                .ok_or_else(|| ApiError::Unauthorized("missing JWT_PUBLIC_KEY".into()))?;
            DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|err| ApiError::Unauthorized(format!("invalid JWT_PUBLIC_KEY: {err}")))
        }
    }
}

fn authorize_jwt(parts: &Parts, config: &AuthConfig) -> Result<Authenticated, ApiError> {
    let key = decoding_key(config)?;

    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected Bearer token".into()))?;

    let validation = Validation::new(config.jwt_algorithm.algorithm());

    let data = decode::<Claims>(token, &key, &validation)
        .map_err(|err| ApiError::Unauthorized(format!("invalid token: {err}")))?;

    // The org comes from the signed claim only; headers are not trusted here.
    Ok(Authenticated {
        subject: data.claims.sub,
        org_id: data.claims.org_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        org_id: Option<&'a str>,
        exp: usize,
    }

    fn jwt_config() -> AuthConfig {
        AuthConfig {
            mode: AuthMode::Jwt,
            api_key: None,
            jwt_secret: Some("jwt-secret".into()),
            jwt_public_key: None,
            jwt_algorithm: JwtAlgorithm::Hs512,
        }
    }

    fn api_key_config() -> AuthConfig {
        AuthConfig {
            mode: AuthMode::ApiKey,
            api_key: Some("test-key".into()),
            jwt_secret: None,
            jwt_public_key: None,
            jwt_algorithm: JwtAlgorithm::Hs256,
        }
    }

    fn token(org_id: Option<&str>) -> String {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        encode(
            &Header::new(Algorithm::HS512),
            &TestClaims {
                sub: "user_1",
                org_id,
                exp,
            },
            &EncodingKey::from_secret(b"jwt-secret"),
        )
        .unwrap()
    }

    async fn extract(config: AuthConfig, request: Request<()>) -> Result<OrgContext, ApiError> {
        let (mut parts, _) = request.into_parts();
        OrgContext::from_request_parts(&mut parts, &config).await
    }

    #[tokio::test]
    async fn jwt_org_claim_is_used() {
        let request = Request::builder()
            .header(AUTHORIZATION, format!("Bearer {}", token(Some("org_1"))))
            .header(ORG_HEADER, "org_spoofed")
            .body(())
            .unwrap();

        let ctx = extract(jwt_config(), request).await.unwrap();
        assert_eq!(ctx.org_id, "org_1");
        assert_eq!(ctx.subject, "user_1");
    }

    #[tokio::test]
    async fn jwt_without_org_claim_requires_org() {
        let request = Request::builder()
            .header(AUTHORIZATION, format!("Bearer {}", token(None)))
            .body(())
            .unwrap();

        let err = extract(jwt_config(), request).await.unwrap_err();
        assert_eq!(err.code(), "ORG_REQUIRED");
    }

    #[test]
    fn api_key_comparison_requires_exact_match() {
        assert!(keys_match("test-key", "test-key"));
        assert!(!keys_match("test-kez", "test-key"));
        assert!(!keys_match("test-key-", "test-key"));
        assert!(!keys_match("", "test-key"));
        assert!(!keys_match("TEST-KEY", "test-key"));
    }

    #[tokio::test]
    async fn api_key_reads_org_header() {
        let request = Request::builder()
            .header("x-api-key", "test-key")
            .header(ORG_HEADER, " org_2 ")
            .body(())
            .unwrap();
        let ctx = extract(api_key_config(), request).await.unwrap();
        assert_eq!(ctx.org_id, "org_2");

        let request = Request::builder()
            .header("x-api-key", "wrong")
            .header(ORG_HEADER, "org_2")
            .body(())
            .unwrap();
        let err = extract(api_key_config(), request).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
