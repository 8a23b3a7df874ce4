//! `client_credentials` grant (RFC 6749 4.4)
//!
//! Machine-to-machine tokens: confidential clients only, no user
//! binding, never a refresh token.

use async_trait::async_trait;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, ScopeSet};

use crate::registry::GRANT_CLIENT_CREDENTIALS;

use super::{GrantContext, GrantHandler, IssueSpec, TokenResponse, check_client_usage, issue_tokens};

/// Client credentials exchange.
#[derive(Debug, Default)]
pub struct ClientCredentialsGrant;

#[async_trait]
impl GrantHandler for ClientCredentialsGrant {
    fn name(&self) -> &'static str {
        GRANT_CLIENT_CREDENTIALS
    }

    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse> {
        check_client_usage(client, self.name())?;
        if client.is_public() {
            return Err(OAuthError::unauthorized_client(
                "Public clients cannot use the client_credentials grant.",
            ));
        }

        let scopes = match request.form_params().get("scope")? {
            Some(raw) => ScopeSet::parse(raw)?
                .allowed_for(&client.scopes, cx.options.scope_policy)?,
            None => client.scopes.clone(),
        };

        issue_tokens(
            cx,
            IssueSpec {
                client,
                user_id: None,
                scopes,
                code: None,
                chain: None,
                login: None,
                nonce: None,
                claims: None,
                include_refresh: false,
                existing_refresh: None,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;

    #[tokio::test]
    async fn issues_user_free_token_without_refresh() {
        let provider = TestProvider::with_defaults().await;
        let client = Client::confidential("service", "secret", vec![])
            .with_grant_types(["client_credentials", "refresh_token"])
            .with_scopes(ScopeSet::parse("api:read api:write").unwrap());
        provider.stores().clients.put(client.clone()).await.unwrap();

        let request = Request::post("/oauth/token").with_form("grant_type", "client_credentials");
        let response = ClientCredentialsGrant
            .grant(&request, &client, &provider.grant_context())
            .await
            .unwrap();
        assert_eq!(response.scope, "api:read api:write");
        assert!(response.refresh_token.is_none());
        assert!(response.id_token.is_none());

        let stored = provider
            .stores()
            .access_tokens
            .get(&response.access_token)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.user_id.is_none());
    }

    #[tokio::test]
    async fn public_client_is_refused() {
        let provider = TestProvider::with_defaults().await;
        let client = Client::public("native", vec![]).with_grant_types(["client_credentials"]);
        provider.stores().clients.put(client.clone()).await.unwrap();

        let request = Request::post("/oauth/token").with_form("grant_type", "client_credentials");
        let err = ClientCredentialsGrant
            .grant(&request, &client, &provider.grant_context())
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "unauthorized_client");
    }

    #[tokio::test]
    async fn strict_policy_rejects_foreign_scope() {
        let provider = TestProvider::with_defaults().await;
        let client = Client::confidential("service", "secret", vec![])
            .with_grant_types(["client_credentials"])
            .with_scopes(ScopeSet::parse("api:read").unwrap());
        provider.stores().clients.put(client.clone()).await.unwrap();

        let request = Request::post("/oauth/token")
            .with_form("grant_type", "client_credentials")
            .with_form("scope", "api:read api:admin");
        let err = ClientCredentialsGrant
            .grant(&request, &client, &provider.grant_context())
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "invalid_scope");
    }
}
