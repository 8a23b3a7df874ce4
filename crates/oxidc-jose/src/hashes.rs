//! `at_hash` / `c_hash` computation (OIDC Core 3.1.3.6, 3.3.2.11)
//!
//! The hash is the left half of the digest whose width matches the ID
//! token signing algorithm (SHA-256 for `*256`, SHA-384 for `*384`,
//! SHA-512 for `*512`), base64url-encoded without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Compute the token-hash value for `value` under the given signing
/// algorithm. `None` when the algorithm does not imply a digest width.
#[must_use]
pub fn left_half_hash(alg_name: &str, value: &str) -> Option<String> {
    let digest: Vec<u8> = if alg_name.ends_with("256") {
        Sha256::digest(value.as_bytes()).to_vec()
    } else if alg_name.ends_with("384") {
        Sha384::digest(value.as_bytes()).to_vec()
    } else if alg_name.ends_with("512") {
        Sha512::digest(value.as_bytes()).to_vec()
    } else {
        return None;
    };
    Some(URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}
