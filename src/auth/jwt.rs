//! JWT bearer authentication
//!
//! Validates `Authorization: Bearer <token>` (HS256) and exposes the claims as a [`Principal`].
//! Only the pass/fail signal and the claims are consumed by the gateway.

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{Authenticator, Principal};
use crate::config::AuthConfig;
use crate::error::{ProxyError, Result};

/// Claims carried by gateway access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayClaims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration (unix seconds)
    pub exp: i64,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Organization prefix (partition key source)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Numeric user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    /// Display username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Entity id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Preferred language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl GatewayClaims {
    /// Create claims for a subject expiring `ttl_seconds` from now
    pub fn new(sub: impl Into<String>, ttl_seconds: i64) -> Self {
        Self {
            sub: sub.into(),
            exp: chrono::Utc::now().timestamp() + ttl_seconds,
            iss: None,
            aud: None,
            org: None,
            uid: None,
            username: None,
            entity_id: None,
            lang: None,
        }
    }

    /// Set organization prefix
    #[must_use]
    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }
}

/// JWT bearer authenticator
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtAuthenticator {
    /// Create new authenticator
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(ProxyError::config("auth.jwt_secret 不能为空"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        })
    }

    /// Issue a token for the given claims (issuer/audience filled from config)
    pub fn issue(&self, claims: &GatewayClaims) -> Result<String> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss.clone_from(&self.issuer);
        }
        if claims.aud.is_none() {
            claims.aud.clone_from(&self.audience);
        }
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Validate a raw token
    pub fn validate_token(&self, token: &str) -> Result<GatewayClaims> {
        Ok(decode::<GatewayClaims>(token, &self.decoding_key, &self.validation)?.claims)
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = bearer_token(headers)?;
        match self.validate_token(token) {
            Ok(claims) => Some(Principal::new(claims)),
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                None
            }
        }
    }
}

/// Extract the bearer token from the `Authorization` header
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
