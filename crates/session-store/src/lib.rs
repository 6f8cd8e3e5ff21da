//! In-memory user sessions for the auth demo
//!
//! One entry per username, created on login and removed on logout. Each
//! session may carry the Azure state produced by the most recent callback.
//! Pending authorizations map an issued `state` value back to the user who
//! started the redirect. Nothing is persisted.

mod error;
mod store;

pub use error::{Result, SessionError};
pub use store::{
    AzureState, DEFAULT_STATE_TTL, MAX_PENDING_PER_USER, PendingAuthorization, SessionStore,
    UserSession,
};
