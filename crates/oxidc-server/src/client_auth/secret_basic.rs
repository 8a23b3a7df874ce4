//! `client_secret_basic` (RFC 6749 2.3.1)
//!
//! Credentials arrive as `Authorization: Basic base64(id:secret)` with
//! both halves form-urlencoded before concatenation. Every failure is
//! `invalid_client` with a `Basic` challenge and a deliberately uniform
//! description.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;

use oxidc_core::Client;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;

use super::{AuthnContext, ClientAuthenticator, check_registered_method, load_client, verify_secret};

/// HTTP Basic client authentication.
#[derive(Debug, Default)]
pub struct ClientSecretBasic;

fn reject() -> OAuthError {
    OAuthError::invalid_client("Client authentication failed.").with_www_authenticate("Basic")
}

fn parse_credentials(header: &str) -> OAuthResult<(String, String)> {
    let token = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))
        .ok_or_else(reject)?
        .trim();
    if token.is_empty() {
        return Err(reject());
    }
    let decoded = STANDARD.decode(token).map_err(|_| reject())?;
    let decoded = String::from_utf8(decoded).map_err(|_| reject())?;
    let (id, secret) = decoded.split_once(':').ok_or_else(reject)?;
    if id.is_empty() || secret.is_empty() {
        return Err(reject());
    }
    let id = percent_decode_str(id)
        .decode_utf8()
        .map_err(|_| reject())?
        .into_owned();
    let secret = percent_decode_str(secret)
        .decode_utf8()
        .map_err(|_| reject())?
        .into_owned();
    Ok((id, secret))
}

#[async_trait]
impl ClientAuthenticator for ClientSecretBasic {
    fn name(&self) -> &'static str {
        "client_secret_basic"
    }

    fn detect(&self, request: &Request) -> bool {
        request
            .header("authorization")
            .is_some_and(|h| h.len() >= 6 && h[..6].eq_ignore_ascii_case("basic "))
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        let header = request.header("authorization").ok_or_else(reject)?;
        let (client_id, secret) = parse_credentials(header)?;
        let client = load_client(cx, &client_id)
            .await
            .map_err(|_| reject())?;
        check_registered_method(&client, self.name()).map_err(|_| reject())?;
        verify_secret(&client, &secret, cx.now).map_err(|_| reject())?;
        Ok(client)
    }
}
