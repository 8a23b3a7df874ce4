//! `client_secret_post` (RFC 6749 2.3.1)
//!
//! `client_id` / `client_secret` travel in the form body. Verification
//! rules are identical to `client_secret_basic`.

use async_trait::async_trait;

use oxidc_core::Client;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;

use super::{AuthnContext, ClientAuthenticator, check_registered_method, load_client, verify_secret};

/// Form-body client authentication.
#[derive(Debug, Default)]
pub struct ClientSecretPost;

fn reject() -> OAuthError {
    OAuthError::invalid_client("Client authentication failed.")
}

#[async_trait]
impl ClientAuthenticator for ClientSecretPost {
    fn name(&self) -> &'static str {
        "client_secret_post"
    }

    fn detect(&self, request: &Request) -> bool {
        request.form.iter().any(|(k, _)| k == "client_secret")
    }

    async fn authenticate(
        &self,
        request: &Request,
        cx: &AuthnContext<'_>,
    ) -> OAuthResult<Client> {
        let params = request.form_params();
        let client_id = params.require("client_id").map_err(|_| reject())?;
        let secret = params.require("client_secret").map_err(|_| reject())?;
        if client_id.is_empty() || secret.is_empty() {
            return Err(reject());
        }
        let client = load_client(cx, client_id).await.map_err(|_| reject())?;
        check_registered_method(&client, self.name()).map_err(|_| reject())?;
        verify_secret(&client, secret, cx.now).map_err(|_| reject())?;
        Ok(client)
    }
}
