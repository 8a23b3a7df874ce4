//! `client_secret_jwt` / `private_key_jwt` (RFC 7523 2.2)
//!
//! The client proves itself with a JWT: `iss` and `sub` both name the
//! client, `aud` names this endpoint, `exp` bounds the assertion, and
//! `jti` is single-use within its lifetime. `client_secret_jwt` signs
//! with the shared secret (HS family); `private_key_jwt` signs with a
//! key from the client's registered JWK set.
//!
//! Both methods detect on the same `client_assertion_type`; the header
//! algorithm family decides which one claims the request, so the
//! dispatcher's exactly-one rule holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use oxidc_core::Client;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_jose::jwt::{self, VerificationKey, VerifyOptions};

use super::{AuthnContext, ClientAuthenticator, check_registered_method, load_client};

/// `client_assertion_type` value for JWT assertions.
pub const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

fn reject() -> OAuthError {
    OAuthError::invalid_client("Client assertion verification failed.")
}

/// The assertion string, when the request is assertion-shaped.
fn assertion_of(request: &Request) -> Option<&str> {
    let type_ok = request
        .form
        .iter()
        .any(|(k, v)| k == "client_assertion_type" && v == JWT_BEARER_ASSERTION);
    if !type_ok {
        return None;
    }
    request
        .form
        .iter()
        .find(|(k, _)| k == "client_assertion")
        .map(|(_, v)| v.as_str())
}

/// Unverified header algorithm name, for method routing only.
fn assertion_alg(request: &Request) -> Option<String> {
    let token = assertion_of(request)?;
    let (header, _) = jwt::peek(token).ok()?;
    Some(format!("{:?}", header.alg))
}

async fn verify_assertion(
    request: &Request,
    cx: &AuthnContext<'_>,
    method: &'static str,
    symmetric: bool,
) -> OAuthResult<Client> {
    let params = request.form_params();
    let token = params.require("client_assertion").map_err(|_| reject())?;

    // The issuer claim names the client; an explicit client_id must agree.
    let (header, unverified) = jwt::peek(token).map_err(|_| reject())?;
    let claimed_issuer = unverified["iss"].as_str().ok_or_else(reject)?.to_string();
    if let Some(explicit) = params.get("client_id")?
        && explicit != claimed_issuer
    {
        return Err(reject());
    }

    let client = load_client(cx, &claimed_issuer).await.map_err(|_| reject())?;
    check_registered_method(&client, method).map_err(|_| reject())?;

    let header_alg = format!("{:?}", header.alg);
    if header_alg.starts_with("HS") != symmetric {
        return Err(reject());
    }
    let alg_name = match &client.token_endpoint_auth_signing_alg {
        Some(registered) => {
            if *registered != header_alg {
                return Err(reject());
            }
            registered.clone()
        }
        None => header_alg,
    };

    let claims = if symmetric {
        let secret = client.client_secret.as_deref().ok_or_else(reject)?;
        if client.secret_expired(cx.now) {
            return Err(reject());
        }
        jwt::verify(
            token,
            &alg_name,
            &VerificationKey::Secret(secret.as_bytes()),
            &assertion_options(cx),
        )
    } else {
        let jwks = cx.fetcher.client_jwks(&client).await?;
        jwt::verify(
            token,
            &alg_name,
            &VerificationKey::Jwks(&jwks),
            &assertion_options(cx),
        )
    }
    .map_err(|_| reject())?;

    // iss == sub == client_id, on the verified payload this time
    let issuer = claims["iss"].as_str().ok_or_else(reject)?;
    let subject = claims["sub"].as_str().ok_or_else(reject)?;
    if issuer != subject || issuer != client.client_id {
        return Err(reject());
    }

    // jti is single-use within the assertion lifetime
    let jti = claims["jti"].as_str().ok_or_else(reject)?;
    let exp = claims["exp"].as_i64().ok_or_else(reject)?;
    let expires_at = DateTime::<Utc>::from_timestamp(exp, 0).ok_or_else(reject)?;
    let fresh = cx
        .stores
        .replay
        .register(&format!("{}:{jti}", client.client_id), expires_at, cx.now)
        .await?;
    if !fresh {
        return Err(OAuthError::invalid_client(
            "Client assertion replay detected.",
        ));
    }

    Ok(client)
}

fn assertion_options(cx: &AuthnContext<'_>) -> VerifyOptions {
    VerifyOptions {
        audiences: vec![cx.endpoint_url.clone(), cx.issuer.clone()],
        ..VerifyOptions::default()
    }
}

/// HMAC-signed client assertions.
#[derive(Debug, Default)]
pub struct ClientSecretJwt;

#[async_trait]
impl ClientAuthenticator for ClientSecretJwt {
    fn name(&self) -> &'static str {
        "client_secret_jwt"
    }

    fn detect(&self, request: &Request) -> bool {
        assertion_alg(request).is_some_and(|alg| alg.starts_with("HS"))
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        verify_assertion(request, cx, self.name(), true).await
    }
}

/// Asymmetrically signed client assertions against the client JWK set.
#[derive(Debug, Default)]
pub struct PrivateKeyJwt;

#[async_trait]
impl ClientAuthenticator for PrivateKeyJwt {
    fn name(&self) -> &'static str {
        "private_key_jwt"
    }

    fn detect(&self, request: &Request) -> bool {
        assertion_alg(request).is_some_and(|alg| !alg.starts_with("HS"))
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        verify_assertion(request, cx, self.name(), false).await
    }
}
