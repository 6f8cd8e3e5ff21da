//! Microsoft identity platform defaults
//!
//! Only public endpoint and scope names live here. Tenant, client id and
//! client secret always come from configuration.

/// Public-cloud authority host. Sovereign clouds override this in config.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Delegated Graph scope needed to read the signed-in user's profile.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/User.Read";

/// Protected resource called by `/me`.
pub const DEFAULT_RESOURCE_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Bearer token handed out by `CannedExchanger`.
pub const CANNED_ACCESS_TOKEN: &str = "canned-access-token";

/// Lifetime of a canned token, in seconds.
pub const CANNED_TOKEN_LIFETIME_SECS: u64 = 3600;
