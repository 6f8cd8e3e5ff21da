//! PKCE (RFC 7636) verifier and S256 challenge
//!
//! The verifier stays server-side in the pending authorization; only the
//! challenge travels in the authorize URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Random bytes behind a verifier. 64 bytes encode to 86 characters, inside
/// the 43..=128 range RFC 7636 allows.
const VERIFIER_BYTES: usize = 64;

/// Generate a random code verifier (URL-safe base64, no padding).
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
