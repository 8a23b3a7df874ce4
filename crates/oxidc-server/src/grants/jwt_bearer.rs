//! JWT bearer authorization grant (RFC 7523 2.1)
//!
//! The assertion is verified with the same machinery as client
//! assertions - pinned algorithm, audience, `exp`, single-use `jti` -
//! but read as a grant: its `sub` names the user the tokens are issued
//! for. The client itself is authenticated by its own method before the
//! handler runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, ScopeSet};
use oxidc_jose::jwt::{self, VerificationKey, VerifyOptions};

use crate::registry::GRANT_JWT_BEARER;

use super::{GrantContext, GrantHandler, IssueSpec, TokenResponse, check_client_usage, issue_tokens};

/// Assertion-based user grant.
#[derive(Debug, Default)]
pub struct JwtBearerGrant;

fn invalid() -> OAuthError {
    OAuthError::invalid_grant("The provided assertion is invalid.")
}

#[async_trait]
impl GrantHandler for JwtBearerGrant {
    fn name(&self) -> &'static str {
        GRANT_JWT_BEARER
    }

    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse> {
        check_client_usage(client, self.name())?;
        let params = request.form_params();
        let assertion = params.require("assertion")?;

        let (header, _) = jwt::peek(assertion).map_err(|_| invalid())?;
        let alg_name = format!("{:?}", header.alg);
        let options = VerifyOptions {
            audiences: vec![
                cx.options.endpoint_url(&cx.options.paths.token),
                cx.options.issuer.clone(),
            ],
            ..VerifyOptions::default()
        };

        let claims = if alg_name.starts_with("HS") {
            let secret = client.client_secret.as_deref().ok_or_else(invalid)?;
            jwt::verify(
                assertion,
                &alg_name,
                &VerificationKey::Secret(secret.as_bytes()),
                &options,
            )
        } else {
            let jwks = cx.fetcher.client_jwks(client).await.map_err(|_| invalid())?;
            jwt::verify(assertion, &alg_name, &VerificationKey::Jwks(&jwks), &options)
        }
        .map_err(|_| invalid())?;

        let subject = claims["sub"].as_str().ok_or_else(invalid)?;
        let jti = claims["jti"].as_str().ok_or_else(invalid)?;
        let exp = claims["exp"].as_i64().ok_or_else(invalid)?;
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0).ok_or_else(invalid)?;
        let fresh = cx
            .stores
            .replay
            .register(&format!("grant:{}:{jti}", client.client_id), expires_at, cx.now)
            .await?;
        if !fresh {
            return Err(invalid());
        }

        let Some(user) = cx.stores.users.get(subject).await? else {
            return Err(invalid());
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
