//! Session store errors

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("user {0} is already logged in")]
    AlreadyLoggedIn(String),

    #[error("user {0} is not logged in")]
    NotLoggedIn(String),

    #[error("unknown or already used state")]
    UnknownState,

    #[error("authorization state expired")]
    StateExpired,

    #[error("state was issued to a different session")]
    StateMismatch,

    #[error("no access token for this session")]
    NoToken,

    #[error("access token expired")]
    TokenExpired,

    /// Stored failure from the last token exchange.
    #[error("no usable token: {0}")]
    ExchangeFailed(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
