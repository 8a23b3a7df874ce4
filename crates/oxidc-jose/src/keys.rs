//! Issuer signing key ring
//!
//! The provider is configured with one key per algorithm family it
//! advertises. Asymmetric keys carry their public JWK so the `/oauth/jwks`
//! endpoint can serve them; HMAC keys are never published.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use serde_json::{Value, json};

use crate::{JoseError, algorithm, is_symmetric};

/// A single signing key with its verification half.
pub struct SigningKey {
    kid: String,
    alg_name: String,
    alg: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// Public JWK for the JWKS document; `None` for symmetric keys
    public_jwk: Option<Value>,
}

impl SigningKey {
    /// Key identifier carried in JWS headers.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWA algorithm name.
    #[must_use]
    pub fn alg_name(&self) -> &str {
        &self.alg_name
    }

    /// The `jsonwebtoken` algorithm.
    #[must_use]
    pub fn alg(&self) -> Algorithm {
        self.alg
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg_name)
            .field("public", &self.public_jwk.is_some())
            .finish_non_exhaustive()
    }
}

/// The ordered set of issuer signing keys. The first key for a requested
/// algorithm wins; the first key overall is the server default.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: Vec<SigningKey>,
}

impl KeyRing {
    /// An empty ring; add keys with the `with_*` builders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an RSA private key (PKCS#1/PKCS#8 PEM) together with its
    /// public JWK.
    ///
    /// # Errors
    /// Fails when the PEM does not parse, the algorithm is not an RSA
    /// family member, or the JWK is not usable for verification.
    pub fn with_rsa_pem(
        mut self,
        kid: impl Into<String>,
        alg_name: &str,
        private_pem: &[u8],
        public_jwk: Value,
    ) -> Result<Self, JoseError> {
        let alg = algorithm(alg_name)?;
        if !matches!(
            alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ) {
            return Err(JoseError::UnsupportedAlgorithm(format!(
                "{alg_name} is not an RSA algorithm"
            )));
        }
        let kid = kid.into();
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| JoseError::InvalidKey(format!("RSA PEM for {kid}: {e}")))?;
        let (decoding, public_jwk) = decoding_from_jwk(&kid, alg_name, public_jwk)?;
        self.keys.push(SigningKey {
            kid,
            alg_name: alg_name.to_string(),
            alg,
            encoding,
            decoding,
            public_jwk: Some(public_jwk),
        });
        Ok(self)
    }

    /// Add an EC private key (SEC1/PKCS#8 PEM) with its public JWK.
    ///
    /// # Errors
    /// Fails when the PEM does not parse or the algorithm is not ES256/384.
    pub fn with_ec_pem(
        mut self,
        kid: impl Into<String>,
        alg_name: &str,
        private_pem: &[u8],
        public_jwk: Value,
    ) -> Result<Self, JoseError> {
        let alg = algorithm(alg_name)?;
        if !matches!(alg, Algorithm::ES256 | Algorithm::ES384) {
            return Err(JoseError::UnsupportedAlgorithm(format!(
                "{alg_name} is not an EC algorithm"
            )));
        }
        let kid = kid.into();
        let encoding = EncodingKey::from_ec_pem(private_pem)
            .map_err(|e| JoseError::InvalidKey(format!("EC PEM for {kid}: {e}")))?;
        let (decoding, public_jwk) = decoding_from_jwk(&kid, alg_name, public_jwk)?;
        self.keys.push(SigningKey {
            kid,
            alg_name: alg_name.to_string(),
            alg,
            encoding,
            decoding,
            public_jwk: Some(public_jwk),
        });
        Ok(self)
    }

    /// Add a shared HMAC secret. Never published through JWKS.
    ///
    /// # Errors
    /// Fails when the algorithm is not an HS family member.
    pub fn with_secret(
        mut self,
        kid: impl Into<String>,
        alg_name: &str,
        secret: &[u8],
    ) -> Result<Self, JoseError> {
        let alg = algorithm(alg_name)?;
        if !is_symmetric(alg_name) {
            return Err(JoseError::UnsupportedAlgorithm(format!(
                "{alg_name} requires asymmetric key material"
            )));
        }
        self.keys.push(SigningKey {
            kid: kid.into(),
            alg_name: alg_name.to_string(),
            alg,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            public_jwk: None,
        });
        Ok(self)
    }

    /// Whether the ring carries no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First key registered for `alg_name`.
    #[must_use]
    pub fn select(&self, alg_name: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.alg_name == alg_name)
    }

    /// Key by identifier (verification of our own artifacts).
    #[must_use]
    pub fn by_kid(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// The server default key (first registered).
    #[must_use]
    pub fn default_key(&self) -> Option<&SigningKey> {
        self.keys.first()
    }

    /// All keys, registration order.
    #[must_use]
    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    /// Algorithm names the ring can sign with, deduplicated.
    #[must_use]
    pub fn algorithms(&self) -> Vec<String> {
        let mut algs: Vec<String> = Vec::new();
        for key in &self.keys {
            if !algs.contains(&key.alg_name) {
                algs.push(key.alg_name.clone());
            }
        }
        algs
    }

    /// The public JWKS document (`{"keys": [...]}`). HMAC keys excluded.
    #[must_use]
    pub fn public_jwks(&self) -> Value {
        let keys: Vec<Value> = self
            .keys
            .iter()
            .filter_map(|k| k.public_jwk.clone())
            .collect();
        json!({ "keys": keys })
    }
}

/// Build the verification key from a public JWK, stamping `kid`/`alg`
/// members the document may have omitted.
fn decoding_from_jwk(
    kid: &str,
    alg_name: &str,
    mut public_jwk: Value,
) -> Result<(DecodingKey, Value), JoseError> {
    if let Some(map) = public_jwk.as_object_mut() {
        map.entry("kid").or_insert_with(|| json!(kid));
        map.entry("alg").or_insert_with(|| json!(alg_name));
        map.entry("use").or_insert_with(|| json!("sig"));
    } else {
        return Err(JoseError::InvalidKey(format!(
            "public JWK for {kid} is not an object"
        )));
    }
    let jwk: jsonwebtoken::jwk::Jwk = serde_json::from_value(public_jwk.clone())
        .map_err(|e| JoseError::InvalidKey(format!("public JWK for {kid}: {e}")))?;
    let decoding = DecodingKey::from_jwk(&jwk)
        .map_err(|e| JoseError::InvalidKey(format!("public JWK for {kid}: {e}")))?;
    Ok((decoding, public_jwk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_keys_stay_out_of_jwks() {
        let ring = KeyRing::new()
            .with_secret("hs-1", "HS256", b"0123456789abcdef0123456789abcdef")
            .unwrap();
        assert_eq!(ring.algorithms(), vec!["HS256"]);
        assert_eq!(ring.public_jwks()["keys"].as_array().unwrap().len(), 0);
        assert!(ring.select("HS256").is_some());
        assert!(ring.select("RS256").is_none());
    }

    #[test]
    fn secret_with_asymmetric_alg_is_rejected() {
        let err = KeyRing::new()
            .with_secret("k", "RS256", b"secret")
            .unwrap_err();
        assert!(matches!(err, JoseError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn default_key_is_first_registered() {
        let ring = KeyRing::new()
            .with_secret("a", "HS256", b"secret-a-secret-a-secret-a-secre")
            .unwrap()
            .with_secret("b", "HS512", b"secret-b-secret-b-secret-b-secre")
            .unwrap();
        assert_eq!(ring.default_key().unwrap().kid(), "a");
        assert_eq!(ring.by_kid("b").unwrap().alg_name(), "HS512");
    }
}
