//! Client authentication
//!
//! Each method implements [`ClientAuthenticator`]: `detect` says whether
//! the request is shaped for the method, `authenticate` verifies it. The
//! dispatcher requires exactly one enabled method to detect itself -
//! zero or several is `invalid_client`, because a request carrying two
//! credential kinds is either confused or probing.
//!
//! Secret comparison is constant-time over equal-length buffers; a
//! length mismatch runs a same-width decoy comparison first so response
//! timing does not leak the registered secret's length.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::pkce::constant_time_eq;
use oxidc_core::Client;

use crate::fetch::Fetcher;
use crate::registry::Registries;
use crate::stores::Stores;

pub mod assertion;
pub mod mtls;
pub mod public;
pub mod secret_basic;
pub mod secret_post;

pub use assertion::{ClientSecretJwt, PrivateKeyJwt};
pub use mtls::{SelfSignedTlsClientAuth, TlsClientAuth};
pub use public::PublicClient;
pub use secret_basic::ClientSecretBasic;
pub use secret_post::ClientSecretPost;

/// Shared context for authentication attempts.
pub struct AuthnContext<'a> {
    pub stores: &'a Stores,
    pub fetcher: &'a Fetcher,
    /// Absolute URL of the endpoint being called (assertion audience)
    pub endpoint_url: String,
    /// Issuer identifier (also accepted as assertion audience)
    pub issuer: String,
    pub now: DateTime<Utc>,
}

/// A named client authentication method.
#[async_trait]
pub trait ClientAuthenticator: Send + Sync {
    /// Protocol name as registered in client metadata.
    fn name(&self) -> &'static str;

    /// Whether the request carries this method's credential shape.
    fn detect(&self, request: &Request) -> bool;

    /// Verify the credentials and return the authenticated client.
    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client>;
}

/// Dispatch authentication across the enabled methods.
///
/// # Errors
/// `invalid_client` when no method matches, several match, or the
/// matching method rejects the credentials.
pub async fn authenticate_client(
    request: &Request,
    registries: &Registries,
    cx: &AuthnContext<'_>,
) -> OAuthResult<Client> {
    let detected: Vec<_> = registries
        .client_auth_methods()
        .iter()
        .filter(|m| m.detect(request))
        .collect();

    match detected.as_slice() {
        [] => Err(
            OAuthError::invalid_client("No enabled client authentication method matched the request.")
                .with_www_authenticate("Basic"),
        ),
        [method] => {
            debug!(method = method.name(), "authenticating client");
            method.authenticate(request, cx).await
        }
        _ => Err(OAuthError::invalid_client(
            "The request uses more than one client authentication method.",
        )),
    }
}

/// Look up a client that must exist for authentication to proceed.
pub(crate) async fn load_client(cx: &AuthnContext<'_>, client_id: &str) -> OAuthResult<Client> {
    cx.stores
        .clients
        .get(client_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Client authentication failed."))
}

/// Reject clients registered for a different method.
pub(crate) fn check_registered_method(client: &Client, method: &str) -> OAuthResult<()> {
    if client.token_endpoint_auth_method == method {
        Ok(())
    } else {
        Err(OAuthError::invalid_client(
            "Client authentication failed.",
        ))
    }
}

/// Constant-time verification of a presented shared secret.
pub(crate) fn verify_secret(
    client: &Client,
    presented: &str,
    now: DateTime<Utc>,
) -> OAuthResult<()> {
    let Some(secret) = &client.client_secret else {
        return Err(OAuthError::invalid_client("Client authentication failed."));
    };
    if client.secret_expired(now) {
        return Err(OAuthError::invalid_client("Client authentication failed."));
    }
    if constant_time_eq(secret.as_bytes(), presented.as_bytes()) {
        Ok(())
    } else {
        Err(OAuthError::invalid_client("Client authentication failed."))
    }
}
