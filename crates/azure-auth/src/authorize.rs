//! Authorize, logout and state helpers
//!
//! Builders are pure string composition. Tenant and client values are not
//! validated here: whatever the caller configured is what the provider sees.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use url::form_urlencoded;

use crate::constants::{DEFAULT_AUTHORITY_HOST, DEFAULT_SCOPE};

/// Where and as whom the application talks to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    pub authority_host: String,
    pub tenant_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl AuthorityConfig {
    /// Public-cloud authority with the default Graph scope.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{name}",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub fn authorize_endpoint(&self) -> String {
        self.endpoint("authorize")
    }

    pub fn token_endpoint(&self) -> String {
        self.endpoint("token")
    }

    pub fn logout_endpoint(&self) -> String {
        self.endpoint("logout")
    }

    /// Scopes as the space-separated string OAuth expects.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Build the authorization-code redirect target.
///
/// Always carries `client_id`, `response_type=code`, `redirect_uri`, `scope`
/// and `state`. The PKCE pair is added when a challenge is given.
pub fn build_authorize_url(
    authority: &AuthorityConfig,
    state: &str,
    code_challenge: Option<&str>,
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("client_id", &authority.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &authority.redirect_uri)
        .append_pair("response_mode", "query")
        .append_pair("scope", &authority.scope_param())
        .append_pair("state", state);
    if let Some(challenge) = code_challenge {
        query
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
    }
    format!("{}?{}", authority.authorize_endpoint(), query.finish())
}

/// Build the provider end-session URL used after a local logout.
pub fn build_logout_url(
    authority: &AuthorityConfig,
    post_logout_redirect_uri: Option<&str>,
) -> String {
    match post_logout_redirect_uri {
        Some(uri) => {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("post_logout_redirect_uri", uri)
                .finish();
            format!("{}?{query}", authority.logout_endpoint())
        }
        None => authority.logout_endpoint(),
    }
}

/// Fresh opaque `state` value: 32 random bytes, URL-safe base64.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
