//! Azure AD (Microsoft identity platform) authorization-code helpers
//!
//! Pure URL and state helpers plus the token endpoint client used by the
//! demo server. No dependency on the server binary.
//!
//! Flow:
//! 1. Server calls `generate_state()` and `pkce::generate_verifier()`
//! 2. Browser is redirected to `build_authorize_url()`
//! 3. Callback code is redeemed through a `TokenExchanger`
//! 4. The resulting `AccessToken` is attached to the user's session
//! 5. Logout sends the browser to `build_logout_url()`

pub mod authorize;
pub mod constants;
pub mod error;
pub mod exchanger;
pub mod pkce;
pub mod token;

pub use authorize::{AuthorityConfig, build_authorize_url, build_logout_url, generate_state};
pub use constants::*;
pub use error::{Error, Result};
pub use exchanger::{AuthorityClient, CannedExchanger, TokenExchanger};
pub use pkce::{compute_challenge, generate_verifier};
pub use token::{AccessToken, TokenResponse, exchange_code, unix_millis};
