//! `authorization_code` grant (RFC 6749 4.1, RFC 7636)
//!
//! Redeems a single-use code for tokens. A code presented twice is an
//! attack signal: the second redemption fails and every credential minted
//! from the code is revoked.

use async_trait::async_trait;
use tracing::warn;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, pkce};

use crate::registry::GRANT_AUTHORIZATION_CODE;

use super::{GrantContext, GrantHandler, IssueSpec, TokenResponse, check_client_usage, issue_tokens};

/// Authorization code redemption.
pub struct AuthorizationCodeGrant {
    pkce_methods: Vec<std::sync::Arc<dyn pkce::CodeChallengeMethod>>,
}

impl AuthorizationCodeGrant {
    #[must_use]
    pub fn new(pkce_methods: Vec<std::sync::Arc<dyn pkce::CodeChallengeMethod>>) -> Self {
        Self { pkce_methods }
    }

    fn pkce_method(&self, name: &str) -> Option<&dyn pkce::CodeChallengeMethod> {
        self.pkce_methods
            .iter()
            .find(|m| m.name() == name)
            .map(AsRef::as_ref)
    }
}

#[async_trait]
impl GrantHandler for AuthorizationCodeGrant {
    fn name(&self) -> &'static str {
        GRANT_AUTHORIZATION_CODE
    }

    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse> {
        check_client_usage(client, self.name())?;
        let params = request.form_params();
        let code_value = params.require("code")?;
        let redirect_uri = params.require("redirect_uri")?;
        let verifier = params.get("code_verifier")?;

        let Some(mut code) = cx.stores.codes.get(code_value).await? else {
            return Err(OAuthError::invalid_grant(
                "The provided authorization code is invalid.",
            ));
        };

        if code.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "The provided authorization code is invalid.",
            ));
        }

        if code.revoked {
            // Single-use violation: burn everything the code produced.
            warn!(client_id = %client.client_id, "authorization code replayed");
            cx.tokens.revoke_code_descendants(&code.code).await?;
            return Err(OAuthError::invalid_grant(
                "The provided authorization code has already been redeemed.",
            ));
        }

        if cx.now < code.valid_after {
            return Err(OAuthError::invalid_grant(
                "The provided authorization code is not yet valid.",
            ));
        }
        if cx.now >= code.expires_at {
            cx.stores.codes.delete(&code.code).await?;
            return Err(OAuthError::invalid_grant(
                "The provided authorization code has expired.",
            ));
        }

        if code.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_grant(
                "The redirect_uri does not match the authorization request.",
            ));
        }

        match (&code.code_challenge, verifier) {
            (Some(challenge), Some(verifier)) => {
                pkce::validate_verifier(verifier)?;
                let method_name = code.code_challenge_method.as_deref().unwrap_or("plain");
                let method = self.pkce_method(method_name).ok_or_else(|| {
                    OAuthError::server_error(format!(
                        "code stored with unresolvable PKCE method {method_name}"
                    ))
                })?;
                if !method.verify(challenge, verifier) {
                    return Err(OAuthError::invalid_grant(
                        "PKCE verification failed.",
                    ));
                }
            }
            (Some(_), None) => {
                return Err(OAuthError::invalid_grant(
                    "Missing required parameter \"code_verifier\".",
                ));
            }
            (None, Some(_)) => {
                return Err(OAuthError::invalid_grant(
                    "The authorization request did not use PKCE.",
                ));
            }
            (None, None) => {}
        }

        // Single use: revoke before minting so a race cannot redeem twice.
        code.revoked = true;
        cx.stores.codes.update(code.clone()).await?;

        let login = cx.stores.logins.get(&code.login_id).await?;
        issue_tokens(
            cx,
            IssueSpec {
                client,
                user_id: Some(code.user_id.clone()),
                scopes: code.scopes.clone(),
                code: Some(code.code.clone()),
                chain: None,
                login: login.as_ref(),
                nonce: code.nonce.clone(),
                claims: code.claims.clone(),
                include_refresh: true,
                existing_refresh: None,
            },
        )
        .await
    }
}
