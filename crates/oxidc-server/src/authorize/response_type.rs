//! Response types
//!
//! A response type is an unordered set drawn from {`code`, `token`,
//! `id_token`}; hybrids are compositions, not special cases. Each part
//! contributes its response parameters and the ID token binds the others
//! with `c_hash` / `at_hash`.

use chrono::{DateTime, Utc};

use oxidc_core::error::OAuthResult;
use oxidc_core::{Client, Expires, Login, ScopeSet};

use crate::stores::Stores;
use crate::tokens::{IdTokenParams, TokenService};

use super::request::AuthorizeRequest;

/// Everything an authorization response issuance needs.
pub struct IssueContext<'a> {
    pub tokens: &'a TokenService,
    pub stores: &'a Stores,
    pub client: &'a Client,
    pub request: &'a AuthorizeRequest,
    pub login: &'a Login,
    pub user_id: &'a str,
    /// Scopes actually granted (consent-narrowed)
    pub scopes: &'a ScopeSet,
    pub now: DateTime<Utc>,
}

/// One enabled response type composition.
#[derive(Debug, Clone, Copy)]
pub struct ResponseType {
    name: &'static str,
    code: bool,
    token: bool,
    id_token: bool,
}

impl ResponseType {
    /// Build from a canonical allowlist name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let canonical = crate::registry::RESPONSE_TYPES
            .iter()
            .find(|candidate| oxidc_core::entities::same_response_type(candidate, name))?;
        let mut parts = (false, false, false);
        for part in canonical.split_whitespace() {
            match part {
                "code" => parts.0 = true,
                "token" => parts.1 = true,
                "id_token" => parts.2 = true,
                _ => return None,
            }
        }
        Some(Self {
            name: canonical,
            code: parts.0,
            token: parts.1,
            id_token: parts.2,
        })
    }

    /// Canonical protocol name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn issues_code(&self) -> bool {
        self.code
    }

    #[must_use]
    pub fn issues_token(&self) -> bool {
        self.token
    }

    #[must_use]
    pub fn issues_id_token(&self) -> bool {
        self.id_token
    }

    /// Whether response parameters default to the fragment (anything
    /// carrying a token does).
    #[must_use]
    pub fn fragment_default(&self) -> bool {
        self.token || self.id_token
    }

    /// The default response mode.
    #[must_use]
    pub fn default_mode(&self) -> &'static str {
        if self.fragment_default() {
            "fragment"
        } else {
            "query"
        }
    }

    /// Produce the authorization response parameters.
    pub async fn issue(&self, cx: &IssueContext<'_>) -> OAuthResult<Vec<(String, String)>> {
        let mut params: Vec<(String, String)> = Vec::new();

        let code = if self.code {
            let code = cx
                .tokens
                .issue_authorization_code(
                    cx.client,
                    cx.user_id.to_string(),
                    cx.login.id.clone(),
                    cx.scopes.clone(),
                    cx.request.redirect_uri.clone(),
                    cx.request.code_challenge.clone(),
                    cx.request.code_challenge_method.clone(),
                    cx.request.nonce.clone(),
                    cx.request.state.clone(),
                    cx.request.claims.clone(),
                    cx.now,
                )
                .await?;
            params.push(("code".to_string(), code.code.clone()));
            Some(code)
        } else {
            None
        };

        let access = if self.token {
            let access = cx
                .tokens
                .issue_access_token(
                    cx.client,
                    Some(cx.user_id.to_string()),
                    cx.scopes.clone(),
                    None,
                    None,
                    cx.request.claims.clone(),
                    cx.now,
                )
                .await?;
            params.push(("access_token".to_string(), access.token.clone()));
            params.push(("token_type".to_string(), access.token_type.clone()));
            params.push((
                "expires_in".to_string(),
                access.remaining_seconds(cx.now).to_string(),
            ));
            params.push(("scope".to_string(), cx.scopes.to_string()));
            Some(access)
        } else {
            None
        };

        if self.id_token {
            let id_token = cx
                .tokens
                .issue_id_token(
                    IdTokenParams {
                        client: cx.client,
                        user_id: cx.user_id,
                        login: Some(cx.login),
                        scopes: cx.scopes,
                        nonce: cx.request.nonce.as_deref(),
                        access_token: access.as_ref().map(|a| a.token.as_str()),
                        code: code.as_ref().map(|c| c.code.as_str()),
                        claims_request: cx.request.claims_for("id_token"),
                    },
                    cx.now,
                )
                .await?;
            params.push(("id_token".to_string(), id_token));
        }

        Ok(params)
    }
}
