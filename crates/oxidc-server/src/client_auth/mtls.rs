//! `tls_client_auth` / `self_signed_tls_client_auth` (RFC 8705)
//!
//! The transport adapter terminates TLS and surfaces the validated peer
//! certificate on the request; the engine only matches identity.
//! `tls_client_auth` matches the registered subject DN;
//! `self_signed_tls_client_auth` matches the certificate thumbprint
//! against an `x5t#S256` member in the client's JWK set.

use async_trait::async_trait;
use serde_json::Value;

use oxidc_core::Client;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;

use super::{AuthnContext, ClientAuthenticator, check_registered_method, load_client};

fn reject() -> OAuthError {
    OAuthError::invalid_client("Mutual-TLS client authentication failed.")
}

fn detect_mtls(request: &Request) -> bool {
    request.peer_certificate.is_some() && request.form.iter().any(|(k, _)| k == "client_id")
}

/// PKI mutual-TLS: subject DN match.
#[derive(Debug, Default)]
pub struct TlsClientAuth;

#[async_trait]
impl ClientAuthenticator for TlsClientAuth {
    fn name(&self) -> &'static str {
        "tls_client_auth"
    }

    fn detect(&self, request: &Request) -> bool {
        detect_mtls(request)
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        let certificate = request.peer_certificate.as_ref().ok_or_else(reject)?;
        let client_id = request.form_params().require("client_id").map_err(|_| reject())?;
        let client = load_client(cx, client_id).await.map_err(|_| reject())?;
        check_registered_method(&client, self.name()).map_err(|_| reject())?;

        let expected = client
            .tls_client_auth_subject_dn
            .as_deref()
            .ok_or_else(reject)?;
        if certificate.subject_dn != expected {
            return Err(reject());
        }
        Ok(client)
    }
}

/// Self-signed mutual-TLS: thumbprint match against the client JWK set.
#[derive(Debug, Default)]
pub struct SelfSignedTlsClientAuth;

fn jwks_contains_thumbprint(jwks: &Value, thumbprint: &str) -> bool {
    jwks.get("keys")
        .and_then(Value::as_array)
        .is_some_and(|keys| {
            keys.iter().any(|key| {
                key.get("x5t#S256").and_then(Value::as_str) == Some(thumbprint)
            })
        })
}

#[async_trait]
impl ClientAuthenticator for SelfSignedTlsClientAuth {
    fn name(&self) -> &'static str {
        "self_signed_tls_client_auth"
    }

    fn detect(&self, request: &Request) -> bool {
        detect_mtls(request)
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        let certificate = request.peer_certificate.as_ref().ok_or_else(reject)?;
        let client_id = request.form_params().require("client_id").map_err(|_| reject())?;
        let client = load_client(cx, client_id).await.map_err(|_| reject())?;
        check_registered_method(&client, self.name()).map_err(|_| reject())?;

        let jwks = client.jwks.clone().ok_or_else(reject)?;
        if !jwks_contains_thumbprint(&jwks, &certificate.thumbprint_sha256) {
            return Err(reject());
        }
        Ok(client)
    }
}
