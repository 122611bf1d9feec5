use chrono::{DateTime, Utc};
use ring::hmac::{self, Key};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::family::MemberId;
use crate::util::constant_time_cmp;

pub type AuthResult<T> = core::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed session token")]
    Malformed,

    #[error("session token signature mismatch")]
    BadSignature,

    #[error(transparent)]
    Exchange(#[from] reqwest::Error),

    #[error("login provider rejected the code exchange with status {0}")]
    ExchangeRejected(u16),
}

/// Who a verified session token belongs to.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub member_id: MemberId,
    pub issued_at: i64,
}

/// Issues and verifies the bearer tokens the mobile client presents on
/// every request and inside socket connection URIs.
///
/// Token layout is `member_id.issued_at.signature` where the signature is
/// the hex HMAC-SHA256 of everything before it.
#[derive(Clone)]
pub struct TokenSigner {
    key: Key,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    pub fn issue(&self, member_id: &MemberId, issued_at: DateTime<Utc>) -> String {
        let payload = format!("{}.{}", member_id, issued_at.timestamp());
        let signature = hex::encode(hmac::sign(&self.key, payload.as_bytes()));

        format!("{payload}.{signature}")
    }

    pub fn verify(&self, token: &str) -> AuthResult<AuthClaims> {
        let (payload, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let expected = hex::encode(hmac::sign(&self.key, payload.as_bytes()));

        if !constant_time_cmp(signature, &expected) {
            return Err(AuthError::BadSignature);
        }

        let (member_id, issued_at) = payload.rsplit_once('.').ok_or(AuthError::Malformed)?;
        if member_id.is_empty() {
            return Err(AuthError::Malformed);
        }

        let issued_at = issued_at.parse().map_err(|_| AuthError::Malformed)?;

        Ok(AuthClaims {
            member_id: member_id.into(),
            issued_at,
        })
    }
}

/// Profile handed back by the login provider once the authorization code
/// checks out. Anything beyond the id is best-effort.
#[derive(Debug, Deserialize)]
pub struct ProviderProfile {
    pub id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub profile_image: String,
}

/// Trades the redirect-flow authorization code for the member's profile.
/// The provider endpoint is deployment configuration; its response is
/// treated as opaque JSON with the fields above.
#[instrument(skip(exchange_url, code))]
pub async fn exchange_code(exchange_url: &str, code: &str) -> AuthResult<ProviderProfile> {
    let client = reqwest::Client::new();
    let response = client
        .post(exchange_url)
        .json(&serde_json::json!({ "code": code }))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AuthError::ExchangeRejected(response.status().as_u16()));
    }

    Ok(response.json().await?)
}
