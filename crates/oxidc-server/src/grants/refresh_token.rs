//! `refresh_token` grant (RFC 6749 6)
//!
//! Exchanges a refresh token for a fresh access token, optionally
//! narrowing scope. With rotation enabled the presented token is
//! consumed and a successor minted in the same chain; presenting a
//! consumed token afterwards is replay and burns the whole chain.

use async_trait::async_trait;
use tracing::warn;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, ScopeSet};

use crate::registry::GRANT_REFRESH_TOKEN;

use super::{GrantContext, GrantHandler, IssueSpec, TokenResponse, check_client_usage, issue_tokens};

/// Refresh token exchange with optional rotation.
#[derive(Debug, Default)]
pub struct RefreshTokenGrant;

fn invalid() -> OAuthError {
    OAuthError::invalid_grant("The provided refresh token is invalid.")
}

#[async_trait]
impl GrantHandler for RefreshTokenGrant {
    fn name(&self) -> &'static str {
        GRANT_REFRESH_TOKEN
    }

    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse> {
        check_client_usage(client, self.name())?;
        let params = request.form_params();
        let presented = params.require("refresh_token")?;

        let Some(token) = cx.stores.refresh_tokens.get(presented).await? else {
            return Err(invalid());
        };
        if token.client_id != client.client_id {
            return Err(invalid());
        }

        if token.consumed_at.is_some() {
            // Rotated and presented again: replay. Burn the chain.
            warn!(client_id = %client.client_id, chain_id = %token.chain_id, "refresh token replay");
            cx.tokens.revoke_refresh_chain(&token.chain_id).await?;
            return Err(invalid());
        }
        if token.revoked || cx.now >= token.expires_at || cx.now < token.valid_after {
            return Err(invalid());
        }

        // Optional narrowing: requested scope must stay inside the token.
        let scopes = match params.get("scope")? {
            Some(raw) => {
                let requested = ScopeSet::parse(raw)?;
                if !token.scopes.contains_all(&requested) {
                    return Err(OAuthError::invalid_scope(
                        "The requested scope exceeds the scope of the refresh token.",
                    ));
                }
                requested
            }
            None => token.scopes.clone(),
        };

        let (chain, refresh_value) = if cx.options.enable_refresh_token_rotation {
            let successor = cx
                .tokens
                .rotate_refresh_token(client, &token, token.scopes.clone(), cx.now)
                .await?;
            (successor.chain_id.clone(), successor.token)
        } else {
            (token.chain_id.clone(), token.token.clone())
        };

        issue_tokens(
            cx,
            IssueSpec {
                client,
                user_id: Some(token.user_id.clone()),
                scopes,
                code: token.authorization_code.clone(),
                chain: Some(chain),
                login: None,
                nonce: None,
                claims: None,
                include_refresh: false,
                existing_refresh: Some(refresh_value),
            },
        )
        .await
    }
}
