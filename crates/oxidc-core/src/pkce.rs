//! Proof Key for Code Exchange (RFC 7636)
//!
//! Two methods are defined: `plain` (byte-exact compare) and `S256`
//! (`challenge == base64url(SHA-256(verifier))`). Verifier and challenge
//! share the same length window (43-128) and the unreserved charset.
//! Comparisons are constant-time; a code challenge is a secret-derived
//! value like any other.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{OAuthError, OAuthResult};

/// Minimum verifier/challenge length (RFC 7636 §4.1).
pub const MIN_LENGTH: usize = 43;
/// Maximum verifier/challenge length (RFC 7636 §4.1).
pub const MAX_LENGTH: usize = 128;

fn valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn check_shape(value: &str, what: &str) -> OAuthResult<()> {
    if value.len() < MIN_LENGTH || value.len() > MAX_LENGTH {
        return Err(OAuthError::invalid_request(format!(
            "The {what} must be between {MIN_LENGTH} and {MAX_LENGTH} characters long."
        )));
    }
    if !value.chars().all(valid_char) {
        return Err(OAuthError::invalid_request(format!(
            "The {what} contains characters outside the unreserved set."
        )));
    }
    Ok(())
}

/// Validate a `code_verifier` presented at the token endpoint.
pub fn validate_verifier(verifier: &str) -> OAuthResult<()> {
    check_shape(verifier, "code_verifier")
}

/// Validate a `code_challenge` presented at the authorize endpoint.
pub fn validate_challenge(challenge: &str) -> OAuthResult<()> {
    check_shape(challenge, "code_challenge")
}

/// A named challenge verification method.
pub trait CodeChallengeMethod: Send + Sync {
    /// Protocol name (`plain`, `S256`).
    fn name(&self) -> &'static str;

    /// Whether `verifier` proves possession of `challenge`.
    fn verify(&self, challenge: &str, verifier: &str) -> bool;
}

/// `plain`: the challenge is the verifier.
#[derive(Debug, Default)]
pub struct Plain;

impl CodeChallengeMethod for Plain {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn verify(&self, challenge: &str, verifier: &str) -> bool {
        constant_time_eq(challenge.as_bytes(), verifier.as_bytes())
    }
}

/// `S256`: the challenge is `base64url(SHA-256(verifier))`.
#[derive(Debug, Default)]
pub struct S256;

impl S256 {
    /// Compute the challenge for a verifier (client-side derivation,
    /// used by tests and by dynamic registration examples).
    #[must_use]
    pub fn derive(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

impl CodeChallengeMethod for S256 {
    fn name(&self) -> &'static str {
        "S256"
    }

    fn verify(&self, challenge: &str, verifier: &str) -> bool {
        constant_time_eq(challenge.as_bytes(), Self::derive(verifier).as_bytes())
    }
}

/// Constant-time equality over byte strings. Mismatched lengths still run
/// a full-width decoy comparison so timing does not reveal the length.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        let _ = a.ct_eq(a);
        return false;
    }
    a.ct_eq(b).into()
}
