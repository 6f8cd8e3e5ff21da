//! Token endpoint: authorization code redemption
//!
//! One POST per callback, no retries. Provider error bodies are surfaced as
//! `Error::Provider` so callers can tell a rejected code from a dead network.

use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::authorize::AuthorityConfig;
use crate::error::{Error, Result};

/// Successful token endpoint response.
///
/// `expires_in` is a delta in seconds; `AccessToken::from_response` turns
/// it into an absolute timestamp.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth error body, e.g. `{"error":"invalid_grant","error_description":"..."}`.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Bearer credential attached to a session.
///
/// `expires_on` is a unix timestamp in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: Secret<String>,
    pub expires_on: u64,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: u64) -> Self {
        Self {
            token: Secret::new(token.into()),
            expires_on,
        }
    }

    pub fn from_response(response: TokenResponse, now_millis: u64) -> Self {
        Self::new(
            response.access_token,
            now_millis.saturating_add(response.expires_in.saturating_mul(1000)),
        )
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_on
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_millis())
    }
}

/// Current time as unix milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Redeem an authorization code at the authority's token endpoint.
///
/// `client_secret` is omitted for public clients; `code_verifier` must be the
/// verifier whose challenge went out in the authorize URL.
pub async fn exchange_code(
    client: &reqwest::Client,
    authority: &AuthorityConfig,
    client_secret: Option<&Secret<String>>,
    code: &str,
    code_verifier: Option<&str>,
) -> Result<TokenResponse> {
    let scope = authority.scope_param();
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("client_id", authority.client_id.as_str()),
        ("code", code),
        ("redirect_uri", authority.redirect_uri.as_str()),
        ("scope", scope.as_str()),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret.expose().as_str()));
    }
    if let Some(verifier) = code_verifier {
        form.push(("code_verifier", verifier));
    }

    let endpoint = authority.token_endpoint();
    debug!(endpoint, "redeeming authorization code");

    let response = client
        .post(&endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if let Ok(provider) = serde_json::from_str::<ProviderErrorBody>(&body) {
            return Err(Error::Provider {
                code: provider.error,
                description: provider.error_description,
            });
        }
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}
