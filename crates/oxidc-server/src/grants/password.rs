//! `password` grant (RFC 6749 4.3)
//!
//! Resource owner credentials are checked through the user service port;
//! the engine never sees how they are stored. A credential miss is a
//! plain `invalid_grant` - no hint whether the username exists.

use async_trait::async_trait;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, ScopeSet};

use crate::registry::GRANT_PASSWORD;

use super::{GrantContext, GrantHandler, IssueSpec, TokenResponse, check_client_usage, issue_tokens};

/// Resource owner password credentials exchange.
#[derive(Debug, Default)]
pub struct PasswordGrant;

#[async_trait]
impl GrantHandler for PasswordGrant {
    fn name(&self) -> &'static str {
        GRANT_PASSWORD
    }

    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse> {
        check_client_usage(client, self.name())?;
        let params = request.form_params();
        let username = params.require("username")?;
        let password = params.require("password")?;

        let Some(user) = cx.stores.users.verify_password(username, password).await? else {
            return Err(OAuthError::invalid_grant(
                "The resource owner credentials are invalid.",
            ));
        };

        let scopes = match params.get("scope")? {
            Some(raw) => ScopeSet::parse(raw)?
                .allowed_for(&client.scopes, cx.options.scope_policy)?,
            None => client.scopes.clone(),
        };

        issue_tokens(
            cx,
            IssueSpec {
                client,
                user_id: Some(user.id),
                scopes,
                code: None,
                chain: None,
                login: None,
                nonce: None,
                claims: None,
                include_refresh: true,
                existing_refresh: None,
            },
        )
        .await
    }
}
