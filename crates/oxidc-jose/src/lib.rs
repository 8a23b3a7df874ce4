//! # oxidc-jose - JOSE Obligations
//!
//! The cryptographic surface of the oxidc authorization server:
//!
//! - `keys` - the issuer signing key ring and its public JWKS document
//! - `jwt` - signing and verification wrappers over `jsonwebtoken`,
//!   including client assertion and request object verification against
//!   client keys
//! - `hashes` - `at_hash` / `c_hash` (left half of the algorithm-width
//!   digest, base64url)
//! - `pairwise` - deterministic pairwise subject derivation
//!
//! All failures surface as [`JoseError`]; the server maps them onto
//! protocol errors at the endpoint boundary.

pub mod hashes;
pub mod jwt;
pub mod keys;
pub mod pairwise;

#[doc(inline)]
pub use jwt::{VerificationKey, VerifyOptions};
#[doc(inline)]
pub use keys::{KeyRing, SigningKey};

/// JOSE failure classification.
#[derive(Debug, thiserror::Error)]
pub enum JoseError {
    /// Key material could not be loaded or is unusable
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// The requested algorithm is not in the supported set
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Signing failed
    #[error("signing failed: {0}")]
    Sign(String),
    /// Signature or claim verification failed
    #[error("verification failed: {0}")]
    Verify(String),
    /// Pairwise subject derivation failed
    #[error("pairwise derivation failed: {0}")]
    Pairwise(String),
}

/// Parse a JWA algorithm name into the `jsonwebtoken` enum.
pub fn algorithm(name: &str) -> Result<jsonwebtoken::Algorithm, JoseError> {
    use jsonwebtoken::Algorithm;
    match name {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "EdDSA" => Ok(Algorithm::EdDSA),
        other => Err(JoseError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Whether `name` is a symmetric (HMAC) algorithm.
#[must_use]
pub fn is_symmetric(name: &str) -> bool {
    name.starts_with("HS")
}
