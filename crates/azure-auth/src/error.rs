//! Error types for identity provider operations

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// OAuth error body (`error` / `error_description`) from the token endpoint.
    #[error("identity provider returned {code}: {description}")]
    Provider { code: String, description: String },
}

pub type Result<T> = std::result::Result<T, Error>;
