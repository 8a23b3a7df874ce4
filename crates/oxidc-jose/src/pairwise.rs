//! Pairwise subject derivation (OIDC Core 8.1)
//!
//! A pairwise subject must be deterministic for a (sector, user) pair,
//! unlinkable across sectors, and opaque to relying parties. This
//! implementation keys an HMAC-SHA256 over the sector identifier, the
//! local subject, and the per-client salt with the provider secret key;
//! the relying party sees only the base64url digest.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::JoseError;

type HmacSha256 = Hmac<Sha256>;

/// Field separator inside the MAC input; 0x1f cannot occur in URLs,
/// subject identifiers, or salts, so inputs cannot collide by
/// concatenation.
const SEPARATOR: u8 = 0x1f;

/// Derive the pairwise `sub` for a user within a sector.
///
/// # Errors
/// Fails when any input is empty or the local subject exceeds
/// `max_local_subject_length`.
pub fn derive(
    secret_key: &SecretString,
    sector_identifier: &str,
    local_subject: &str,
    salt: &str,
    max_local_subject_length: usize,
) -> Result<String, JoseError> {
    if sector_identifier.is_empty() {
        return Err(JoseError::Pairwise("empty sector identifier".to_string()));
    }
    if local_subject.is_empty() {
        return Err(JoseError::Pairwise("empty local subject".to_string()));
    }
    if local_subject.len() > max_local_subject_length {
        return Err(JoseError::Pairwise(format!(
            "local subject exceeds {max_local_subject_length} bytes"
        )));
    }

    let mut mac = HmacSha256::new_from_slice(secret_key.expose_secret().as_bytes())
        .map_err(|e| JoseError::Pairwise(e.to_string()))?;
    mac.update(sector_identifier.as_bytes());
    mac.update(&[SEPARATOR]);
    mac.update(local_subject.as_bytes());
    mac.update(&[SEPARATOR]);
    mac.update(salt.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}
