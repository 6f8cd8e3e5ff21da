//! Token exchange seam
//!
//! The demo server holds an `Arc<dyn TokenExchanger>` so the callback handler
//! never knows whether it talks to the live authority or to canned values.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use tracing::{info, warn};

use crate::authorize::AuthorityConfig;
use crate::constants::{CANNED_ACCESS_TOKEN, CANNED_TOKEN_LIFETIME_SECS};
use crate::error::{Error, Result};
use crate::token::{AccessToken, exchange_code, unix_millis};

/// Redeems authorization codes for access tokens.
///
/// Uses `Pin<Box<dyn Future>>` so implementations can sit behind `Arc<dyn _>`.
pub trait TokenExchanger: Send + Sync {
    /// Short identifier for logs and health output ("authority", "canned").
    fn id(&self) -> &str;

    /// Opaque handle naming the credential that issues tokens, stored next
    /// to each token in the session.
    fn credential(&self) -> String;

    /// Redeem `code`. Called exactly once per callback.
    fn exchange<'a>(
        &'a self,
        code: &'a str,
        code_verifier: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>>;
}

/// Live exchanger posting to the configured authority's token endpoint.
pub struct AuthorityClient {
    http: reqwest::Client,
    authority: AuthorityConfig,
    client_secret: Option<Secret<String>>,
}

impl AuthorityClient {
    pub fn new(
        http: reqwest::Client,
        authority: AuthorityConfig,
        client_secret: Option<Secret<String>>,
    ) -> Self {
        Self {
            http,
            authority,
            client_secret,
        }
    }
}

impl TokenExchanger for AuthorityClient {
    fn id(&self) -> &str {
        "authority"
    }

    fn credential(&self) -> String {
        format!("{}/{}", self.authority.tenant_id, self.authority.client_id)
    }

    fn exchange<'a>(
        &'a self,
        code: &'a str,
        code_verifier: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>> {
        Box::pin(async move {
            let response = exchange_code(
                &self.http,
                &self.authority,
                self.client_secret.as_ref(),
                code,
                Some(code_verifier),
            )
            .await?;
            info!(
                credential = %self.credential(),
                expires_in = response.expires_in,
                "authorization code redeemed"
            );
            Ok(AccessToken::from_response(response, unix_millis()))
        })
    }
}

/// Offline exchanger for test mode: never touches the network.
pub struct CannedExchanger {
    lifetime: Duration,
    failure: Option<String>,
}

impl CannedExchanger {
    /// Issues `CANNED_ACCESS_TOKEN` valid for `CANNED_TOKEN_LIFETIME_SECS`.
    pub fn new() -> Self {
        Self {
            lifetime: Duration::from_secs(CANNED_TOKEN_LIFETIME_SECS),
            failure: None,
        }
    }

    /// Canned tokens with a custom lifetime. A zero lifetime yields tokens
    /// that are already expired.
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            lifetime,
            failure: None,
        }
    }

    /// Every exchange fails with `Error::TokenExchange(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            lifetime: Duration::ZERO,
            failure: Some(message.into()),
        }
    }
}

impl Default for CannedExchanger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenExchanger for CannedExchanger {
    fn id(&self) -> &str {
        "canned"
    }

    fn credential(&self) -> String {
        "canned".to_string()
    }

    fn exchange<'a>(
        &'a self,
        _code: &'a str,
        _code_verifier: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(message) = &self.failure {
                warn!(reason = %message, "canned exchanger configured to fail");
                return Err(Error::TokenExchange(message.clone()));
            }
            let expires_on = unix_millis() + self.lifetime.as_millis() as u64;
            Ok(AccessToken::new(CANNED_ACCESS_TOKEN, expires_on))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn canned_exchanger_issues_live_token() {
        let exchanger: Arc<dyn TokenExchanger> = Arc::new(CannedExchanger::new());
        let token = exchanger.exchange("XXXXXXXXX", "verifier").await.unwrap();
        assert_eq!(token.token.expose(), CANNED_ACCESS_TOKEN);
        assert!(!token.is_expired());
        assert_eq!(exchanger.id(), "canned");
    }

    #[tokio::test]
    async fn zero_lifetime_token_is_expired() {
        let token = CannedExchanger::with_lifetime(Duration::ZERO)
            .exchange("code", "verifier")
            .await
            .unwrap();
        assert!(token.is_expired());
    }

    #[tokio::test]
    async fn failing_exchanger_reports_cause() {
        let err = CannedExchanger::failing("tenant disabled")
            .exchange("code", "verifier")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "token exchange failed: tenant disabled");
    }

    #[test]
    fn authority_credential_names_tenant_and_client() {
        let client = AuthorityClient::new(
            reqwest::Client::new(),
            AuthorityConfig::new("tenant-1", "client-1", "http://localhost/cb"),
            None,
        );
        assert_eq!(client.credential(), "tenant-1/client-1");
        assert_eq!(client.id(), "authority");
    }
}
