//! Grant type handlers
//!
//! The token endpoint dispatches on `grant_type` to one of these
//! handlers. Each performs its parameter validation, checks the
//! authenticated client may use the grant, runs grant-specific
//! verification, and hands a token bundle back for response shaping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Request;
use oxidc_core::{Client, Expires, Login, ScopeSet};

use crate::config::ProviderOptions;
use crate::fetch::Fetcher;
use crate::stores::Stores;
use crate::tokens::{IdTokenParams, TokenService};

pub mod authorization_code;
pub mod client_credentials;
pub mod device_code;
pub mod jwt_bearer;
pub mod password;
pub mod refresh_token;

pub use authorization_code::AuthorizationCodeGrant;
pub use client_credentials::ClientCredentialsGrant;
pub use device_code::DeviceCodeGrant;
pub use jwt_bearer::JwtBearerGrant;
pub use password::PasswordGrant;
pub use refresh_token::RefreshTokenGrant;

/// Shared context for grant execution.
pub struct GrantContext<'a> {
    pub stores: &'a Stores,
    pub tokens: &'a TokenService,
    pub options: &'a ProviderOptions,
    pub fetcher: &'a Fetcher,
    pub now: DateTime<Utc>,
}

/// The token endpoint's success payload.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Whole seconds, floor of remaining lifetime
    pub expires_in: u64,
    /// Space-separated, canonical request order
    pub scope: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// The JSON body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "access_token": self.access_token,
            "token_type": self.token_type,
            "expires_in": self.expires_in,
            "scope": self.scope,
        });
        if let Some(refresh) = &self.refresh_token {
            body["refresh_token"] = json!(refresh);
        }
        if let Some(id_token) = &self.id_token {
            body["id_token"] = json!(id_token);
        }
        body
    }
}

/// A named grant type implementation.
#[async_trait]
pub trait GrantHandler: Send + Sync {
    /// `grant_type` value.
    fn name(&self) -> &'static str;

    /// Validate and execute the grant for an authenticated client.
    async fn grant(
        &self,
        request: &Request,
        client: &Client,
        cx: &GrantContext<'_>,
    ) -> OAuthResult<TokenResponse>;
}

/// `unauthorized_client` unless the grant type is in the client allowlist.
pub(crate) fn check_client_usage(client: &Client, grant_type: &str) -> OAuthResult<()> {
    if client.allows_grant_type(grant_type) {
        Ok(())
    } else {
        Err(OAuthError::unauthorized_client(format!(
            "The client is not authorized to use the \"{grant_type}\" grant type."
        )))
    }
}

/// Everything needed to mint one token bundle.
pub(crate) struct IssueSpec<'a> {
    pub client: &'a Client,
    /// Absent for client-credentials tokens
    pub user_id: Option<String>,
    pub scopes: ScopeSet,
    /// Authorization code linkage for reuse cascades
    pub code: Option<String>,
    /// Refresh chain linkage for replay cascades
    pub chain: Option<String>,
    /// Login backing the authentication, when still resolvable
    pub login: Option<&'a Login>,
    pub nonce: Option<String>,
    /// `claims` request parameter carried from the authorize call
    pub claims: Option<Value>,
    /// Mint a refresh token (`refresh_token` must be in the client grants)
    pub include_refresh: bool,
    /// Echo an existing refresh token instead of minting one
    pub existing_refresh: Option<String>,
}

/// Mint an access token, optional refresh token, and optional ID token.
pub(crate) async fn issue_tokens(
    cx: &GrantContext<'_>,
    spec: IssueSpec<'_>,
) -> OAuthResult<TokenResponse> {
    // When a refresh token accompanies the access token, both share one
    // rotation chain so chain revocation covers the sibling.
    let minting_refresh = spec.existing_refresh.is_none()
        && spec.include_refresh
        && spec.client.allows_grant_type("refresh_token")
        && spec.user_id.is_some();
    let chain = if minting_refresh {
        Some(
            spec.chain
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        )
    } else {
        spec.chain.clone()
    };

    let access = cx
        .tokens
        .issue_access_token(
            spec.client,
            spec.user_id.clone(),
            spec.scopes.clone(),
            spec.code.clone(),
            chain.clone(),
            spec.claims.clone(),
            cx.now,
        )
        .await?;

    let refresh_token = if let Some(existing) = spec.existing_refresh {
        Some(existing)
    } else if minting_refresh
        && let Some(user_id) = spec.user_id.clone()
    {
        Some(
            cx.tokens
                .issue_refresh_token(
                    spec.client,
                    user_id,
                    spec.scopes.clone(),
                    spec.code.clone(),
                    chain.clone(),
                    None,
                    cx.now,
                )
                .await?
                .token,
        )
    } else {
        None
    };

    let id_token = if spec.scopes.has_openid()
        && let Some(user_id) = spec.user_id.as_deref()
    {
        let claims_request = spec
            .claims
            .as_ref()
            .and_then(|claims| claims.get("id_token"));
        Some(
            cx.tokens
                .issue_id_token(
                    IdTokenParams {
                        client: spec.client,
                        user_id,
                        login: spec.login,
                        scopes: &spec.scopes,
                        nonce: spec.nonce.as_deref(),
                        access_token: Some(&access.token),
                        code: None,
                        claims_request,
                    },
                    cx.now,
                )
                .await?,
        )
    } else {
        None
    };

    Ok(TokenResponse {
        access_token: access.token.clone(),
        token_type: access.token_type.clone(),
        expires_in: access.remaining_seconds(cx.now),
        scope: spec.scopes.to_string(),
        refresh_token,
        id_token,
    })
}
