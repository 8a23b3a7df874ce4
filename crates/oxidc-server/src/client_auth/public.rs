//! `none` - public client identification
//!
//! The request carries only `client_id`. A client that owns a secret or
//! is registered for any other method must not slip through here: that
//! would downgrade its authentication.

use async_trait::async_trait;

use oxidc_core::Client;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;

use super::{AuthnContext, ClientAuthenticator, check_registered_method, load_client};

/// Identification without authentication (public clients).
#[derive(Debug, Default)]
pub struct PublicClient;

#[async_trait]
impl ClientAuthenticator for PublicClient {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&self, request: &Request) -> bool {
        request.form.iter().any(|(k, _)| k == "client_id")
            && !request.form.iter().any(|(k, _)| k == "client_secret")
            && !request.form.iter().any(|(k, _)| k == "client_assertion")
            && request.header("authorization").is_none()
            && request.peer_certificate.is_none()
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        let client_id = request.form_params().require("client_id")?;
        let client = load_client(cx, client_id).await?;
        check_registered_method(&client, self.name())?;
        if client.client_secret.is_some() {
            return Err(OAuthError::invalid_client(
                "Client authentication failed.",
            ));
        }
        Ok(client)
    }
}
