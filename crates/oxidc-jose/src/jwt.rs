//! JWT signing and verification
//!
//! Thin wrappers over `jsonwebtoken` that keep algorithm pinning in one
//! place: the caller always names the algorithm it expects, and `none` is
//! unrepresentable. Claim payloads move as `serde_json::Value` so each
//! endpoint applies its own claim rules on top of signature validation.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header, encode};
use serde::Serialize;
use serde_json::Value;

use crate::keys::SigningKey;
use crate::{JoseError, algorithm};

/// Sign `claims` with the given issuer key. The header carries `kid` and
/// `typ: JWT`.
pub fn sign<T: Serialize>(key: &SigningKey, claims: &T) -> Result<String, JoseError> {
    let mut header = Header::new(key.alg());
    header.kid = Some(key.kid().to_string());
    encode(&header, claims, key.encoding()).map_err(|e| JoseError::Sign(e.to_string()))
}

/// Key material for verifying a token produced by someone else.
pub enum VerificationKey<'a> {
    /// Shared client secret (`client_secret_jwt`, HS request objects)
    Secret(&'a [u8]),
    /// Client JWK set (`private_key_jwt`, asymmetric request objects)
    Jwks(&'a JwkSet),
    /// One of our own issuer keys (`id_token_hint`)
    Issuer(&'a SigningKey),
}

/// Verification knobs beyond the signature itself.
pub struct VerifyOptions {
    /// Accepted audiences; empty disables the audience check
    pub audiences: Vec<String>,
    /// Whether `exp` is enforced (disabled for `id_token_hint`, which may
    /// legitimately be expired)
    pub validate_exp: bool,
    /// Whether `exp` must be present at all (request objects may omit it)
    pub require_exp: bool,
    /// Clock skew allowance in seconds
    pub leeway: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            audiences: Vec::new(),
            validate_exp: true,
            require_exp: true,
            leeway: 30,
        }
    }
}

/// Verify a compact JWS against `alg_name` and return its claims.
///
/// The header algorithm must equal the pinned algorithm - a token that
/// names anything else is rejected before key selection, closing the
/// algorithm-confusion hole.
pub fn verify(
    token: &str,
    alg_name: &str,
    key: &VerificationKey<'_>,
    opts: &VerifyOptions,
) -> Result<Value, JoseError> {
    let alg = algorithm(alg_name)?;
    let header = decode_header(token).map_err(|e| JoseError::Verify(format!("header: {e}")))?;
    if header.alg != alg {
        return Err(JoseError::Verify(format!(
            "token algorithm {:?} does not match expected {alg_name}",
            header.alg
        )));
    }

    let decoding = resolve_key(&header, alg, key)?;

    let mut validation = Validation::new(alg);
    validation.leeway = opts.leeway;
    validation.validate_exp = opts.validate_exp;
    validation.validate_nbf = true;
    if opts.audiences.is_empty() {
        validation.validate_aud = false;
    } else {
        validation.set_audience(&opts.audiences);
    }
    if !opts.validate_exp || !opts.require_exp {
        validation.required_spec_claims.clear();
    }

    let data = decode::<Value>(token, &decoding, &validation)
        .map_err(|e| JoseError::Verify(e.to_string()))?;
    Ok(data.claims)
}

fn resolve_key(
    header: &Header,
    alg: Algorithm,
    key: &VerificationKey<'_>,
) -> Result<DecodingKey, JoseError> {
    match key {
        VerificationKey::Secret(secret) => Ok(DecodingKey::from_secret(secret)),
        VerificationKey::Issuer(signing) => Ok(signing.decoding().clone()),
        VerificationKey::Jwks(set) => {
            // Prefer the kid named by the header, fall back to the only
            // key matching the algorithm family.
            let jwk = match &header.kid {
                Some(kid) => set.find(kid),
                None => {
                    let candidates: Vec<_> = set
                        .keys
                        .iter()
                        .filter(|k| {
                            k.common
                                .key_algorithm
                                .as_ref()
                                .is_none_or(|ka| ka.to_string() == format!("{alg:?}"))
                        })
                        .collect();
                    match candidates.as_slice() {
                        [only] => Some(*only),
                        _ => None,
                    }
                }
            };
            let jwk = jwk.ok_or_else(|| {
                JoseError::Verify("no usable key in the client JWK set".to_string())
            })?;
            DecodingKey::from_jwk(jwk).map_err(|e| JoseError::Verify(format!("client JWK: {e}")))
        }
    }
}

/// Produce an unsecured JWS (`alg: none`, empty signature part).
///
/// Only reachable for clients explicitly registered with
/// `id_token_signed_response_alg: none` on a provider that allowlists it.
pub fn sign_unsecured<T: Serialize>(claims: &T) -> Result<String, JoseError> {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = serde_json::to_vec(claims).map_err(|e| JoseError::Sign(e.to_string()))?;
    Ok(format!("{header}.{}.", URL_SAFE_NO_PAD.encode(payload)))
}

/// Decode header and claims without verifying the signature.
///
/// Only for routing decisions (assertion algorithm sniffing, request
/// object client discovery); callers must re-verify before trusting any
/// claim.
pub fn peek(token: &str) -> Result<(Header, Value), JoseError> {
    let header = decode_header(token).map_err(|e| JoseError::Verify(format!("header: {e}")))?;
    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    let data = decode::<Value>(token, &DecodingKey::from_secret(b""), &validation)
        .map_err(|e| JoseError::Verify(format!("payload: {e}")))?;
    Ok((header, data.claims))
}
