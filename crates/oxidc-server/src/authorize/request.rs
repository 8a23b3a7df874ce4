//! Authorization request parsing and validation
//!
//! Validation runs in two stages with different error surfaces. Stage
//! one establishes the client and an exactly-registered redirect URI;
//! failures there render an error page and never redirect (an attacker
//! must not bounce users to arbitrary URLs). Everything after stage one
//! has a trustworthy redirect target, so failures travel back to the
//! client through the response mode.

use serde_json::Value;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Params;
use oxidc_core::{Client, ScopeSet, pkce};

use crate::config::ProviderOptions;
use crate::registry::Registries;

/// A validated authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scopes: ScopeSet,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Explicit `response_mode`; `None` means the response type default
    pub response_mode: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Vec<String>,
    pub display: Option<String>,
    pub max_age: Option<u64>,
    pub acr_values: Vec<String>,
    pub ui_locales: Option<String>,
    pub login_hint: Option<String>,
    pub id_token_hint: Option<String>,
    pub claims: Option<Value>,
    /// The parameters as received, frozen for grant resumption
    pub raw: Vec<(String, String)>,
}

impl AuthorizeRequest {
    #[must_use]
    pub fn has_prompt(&self, value: &str) -> bool {
        self.prompt.iter().any(|p| p == value)
    }

    /// The `claims` member for the given destination (`id_token` or
    /// `userinfo`).
    #[must_use]
    pub fn claims_for(&self, destination: &str) -> Option<&Value> {
        self.claims.as_ref().and_then(|c| c.get(destination))
    }
}

/// Stage one: locate client and redirect URI. Failures here must render
/// an error page, never redirect - the caller gets a plain message.
pub fn resolve_redirect(params: &Params<'_>, client: &Client) -> Result<String, String> {
    let redirect_uri = match params.get("redirect_uri") {
        Ok(Some(uri)) => uri,
        Ok(None) => return Err("Missing required parameter \"redirect_uri\".".to_string()),
        Err(_) => return Err("Parameter \"redirect_uri\" must not be repeated.".to_string()),
    };
    if !client.redirect_uri_registered(redirect_uri) {
        return Err(format!(
            "The redirect_uri \"{redirect_uri}\" is not registered for client \"{}\".",
            client.client_id
        ));
    }
    Ok(redirect_uri.to_string())
}

/// Stage two: full parameter validation against client and registries.
/// Errors carry the request `state` and are rendered via the response
/// mode.
pub fn validate(
    merged: &[(String, String)],
    client: &Client,
    redirect_uri: String,
    registries: &Registries,
    options: &ProviderOptions,
) -> OAuthResult<AuthorizeRequest> {
    let params = Params::over(vec![merged]);
    let state = params.get("state")?.map(ToString::to_string);
    let with_state = |err: OAuthError| err.with_state(state.clone());

    let response_type = params
        .require("response_type")
        .map_err(&with_state)?
        .to_string();
    let response_type_def = registries.response_type(&response_type).ok_or_else(|| {
        with_state(OAuthError::unsupported_response_type(format!(
            "The response type \"{response_type}\" is not supported."
        )))
    })?;
    if !client.allows_response_type(&response_type) {
        return Err(with_state(OAuthError::unauthorized_client(format!(
            "The client may not use the \"{response_type}\" response type."
        ))));
    }

    let scopes = match params.get("scope").map_err(&with_state)? {
        Some(raw) => ScopeSet::parse(raw)
            .and_then(|s| s.allowed_for(&client.scopes, options.scope_policy))
            .map_err(&with_state)?,
        None => ScopeSet::default(),
    };
    if response_type_def.issues_id_token() && !scopes.has_openid() {
        return Err(with_state(OAuthError::invalid_request(
            "The \"openid\" scope is required for ID token response types.",
        )));
    }

    let nonce = params.get("nonce").map_err(&with_state)?.map(ToString::to_string);
    if response_type_def.issues_id_token() && nonce.is_none() {
        return Err(with_state(OAuthError::invalid_request(
            "Missing required parameter \"nonce\" for implicit and hybrid flows.",
        )));
    }

    let response_mode = params
        .get("response_mode")
        .map_err(&with_state)?
        .map(ToString::to_string);
    if let Some(mode) = &response_mode {
        if registries.response_mode(mode).is_none() {
            return Err(with_state(OAuthError::invalid_request(format!(
                "The response mode \"{mode}\" is not supported."
            ))));
        }
        // Token-bearing responses must never land in a query string.
        if mode == "query" && response_type_def.fragment_default() {
            return Err(with_state(OAuthError::invalid_request(
                "The \"query\" response mode cannot carry this response type.",
            )));
        }
    }

    let prompt: Vec<String> = params
        .get("prompt")
        .map_err(&with_state)?
        .map(|raw| raw.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default();
    for value in &prompt {
        if !registries.supports_prompt(value) {
            return Err(with_state(OAuthError::invalid_request(format!(
                "The prompt value \"{value}\" is not supported."
            ))));
        }
    }
    if prompt.iter().any(|p| p == "none") && prompt.len() > 1 {
        return Err(with_state(OAuthError::invalid_request(
            "The prompt value \"none\" cannot be combined with other values.",
        )));
    }

    let display = params
        .get("display")
        .map_err(&with_state)?
        .map(ToString::to_string);
    if let Some(value) = &display
        && !registries.supports_display(value)
    {
        return Err(with_state(OAuthError::invalid_request(format!(
            "The display value \"{value}\" is not supported."
        ))));
    }

    let max_age = match params.get("max_age").map_err(&with_state)? {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            with_state(OAuthError::invalid_request(
                "The parameter \"max_age\" must be a non-negative integer.",
            ))
        })?),
        None => None,
    };

    let code_challenge = params
        .get("code_challenge")
        .map_err(&with_state)?
        .map(ToString::to_string);
    let mut code_challenge_method = params
        .get("code_challenge_method")
        .map_err(&with_state)?
        .map(ToString::to_string);

    if response_type_def.issues_code() {
        if (client.is_public() || client.require_pkce) && code_challenge.is_none() {
            return Err(with_state(OAuthError::invalid_request(
                "A code_challenge is required for this client.",
            )));
        }
        if let Some(challenge) = &code_challenge {
            pkce::validate_challenge(challenge).map_err(&with_state)?;
            match &code_challenge_method {
                Some(method) => {
                    if registries.pkce_method(method).is_none() {
                        return Err(with_state(OAuthError::invalid_request(format!(
                            "The code challenge method \"{method}\" is not supported."
                        ))));
                    }
                }
                None => {
                    // "plain" is the default only when it is explicitly
                    // enabled; otherwise the method must be named.
                    if registries.pkce_method("plain").is_some() {
                        code_challenge_method = Some("plain".to_string());
                    } else {
                        return Err(with_state(OAuthError::invalid_request(
                            "Missing required parameter \"code_challenge_method\".",
                        )));
                    }
                }
            }
        }
    } else if code_challenge.is_some() {
        return Err(with_state(OAuthError::invalid_request(
            "PKCE parameters require a response type that issues a code.",
        )));
    }

    let claims = match params.get("claims").map_err(&with_state)? {
        Some(raw) => Some(serde_json::from_str::<Value>(raw).map_err(|_| {
            with_state(OAuthError::invalid_request(
                "The parameter \"claims\" is not valid JSON.",
            ))
        })?),
        None => None,
    };

    let acr_values: Vec<String> = params
        .get("acr_values")
        .map_err(&with_state)?
        .map(|raw| raw.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default();

    Ok(AuthorizeRequest {
        client_id: client.client_id.clone(),
        redirect_uri,
        response_type,
        scopes,
        state,
        nonce,
        response_mode,
        code_challenge,
        code_challenge_method,
        prompt,
        display,
        max_age,
        acr_values,
        ui_locales: params.get("ui_locales")?.map(ToString::to_string),
        login_hint: params.get("login_hint")?.map(ToString::to_string),
        id_token_hint: params.get("id_token_hint")?.map(ToString::to_string),
        claims,
        raw: merged.to_vec(),
    })
}
