//! The login interaction
//!
//! The UI authenticates the end user however it likes and reports the
//! outcome. An accepted login becomes a `Login` on the session's stack;
//! an ACR outside the client's accepted set voids the grant with
//! `unmet_authentication_requirements`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use oxidc_core::error::{ErrorCode, OAuthError, OAuthResult};
use oxidc_core::http::Params;
use oxidc_core::{InteractionKind, Login};

use crate::tokens::TokenService;

use super::{
    InteractionContext, InteractionHandler, commit_grant, deny_grant, error_redirect,
    grant_by_challenge, resume_url,
};

/// `login` context/decision handler.
#[derive(Debug, Default)]
pub struct LoginInteraction;

#[async_trait]
impl InteractionHandler for LoginInteraction {
    fn kind(&self) -> &'static str {
        "login"
    }

    fn challenge_param(&self) -> &'static str {
        "login_challenge"
    }

    async fn context(&self, cx: &InteractionContext<'_>, challenge: &str) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, false).await?;
        let client = cx.engine.stores.clients.get(&grant.client_id).await?;
        let session = cx.engine.stores.sessions.get(&grant.session_id).await?;
        let param = |name: &str| {
            grant
                .parameters
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        Ok(json!({
            "challenge": challenge,
            "client": {
                "client_id": grant.client_id,
                "client_name": client.and_then(|c| c.client_name),
            },
            "requested_scope": param("scope"),
            "login_hint": param("login_hint"),
            "ui_locales": param("ui_locales"),
            "display": param("display"),
            "acr_values": param("acr_values"),
            "session": {
                "has_active_login": session
                    .as_ref()
                    .is_some_and(|s| s.active_login.is_some()),
                "login_count": session.map_or(0, |s| s.logins.len()),
            },
        }))
    }

    async fn decide(
        &self,
        cx: &InteractionContext<'_>,
        challenge: &str,
        decision: &Params<'_>,
    ) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, false).await?;

        match decision.require("action")? {
            "accept" => {}
            "deny" => {
                let code = decision.get("error")?.unwrap_or("access_denied");
                let description = decision
                    .get("error_description")?
                    .unwrap_or("The end user denied the authentication request.");
                let err = OAuthError::new(parse_error_code(code), description);
                return deny_grant(cx, &grant, &err).await;
            }
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "Unknown decision action \"{other}\"."
                )));
            }
        }

        let user_id = decision.require("user_id")?;
        let Some(user) = cx.engine.stores.users.get(user_id).await? else {
            return Err(OAuthError::invalid_request(format!(
                "Unknown user \"{user_id}\"."
            )));
        };

        let acr = decision.get("acr")?.map(ToString::to_string);
        let client = cx.engine.stores.clients.get(&grant.client_id).await?;
        if let (Some(acr), Some(client)) = (&acr, &client)
            && !client.acr_values.is_empty()
            && !client.acr_values.iter().any(|a| a == acr)
        {
            // The login is real but does not satisfy the client's
            // authentication requirements: void the authorization.
            let err = OAuthError::new(
                ErrorCode::UnmetAuthenticationRequirements,
                "The performed authentication does not satisfy the requested ACR.",
            );
            cx.engine.stores.grants.delete(&grant.id).await?;
            return Ok(error_redirect(cx.engine, &err));
        }

        let amr: Vec<String> = decision
            .get("amr")?
            .map(|raw| raw.split_whitespace().map(ToString::to_string).collect())
            .unwrap_or_default();
        let login = Login {
            id: TokenService::opaque_token(),
            user_id: user.id.clone(),
            created_at: Utc::now(),
            expires_at: Utc::now() + cx.engine.options.ttls.login,
            amr,
            acr,
        };
        cx.engine.stores.logins.put(login.clone()).await?;

        let Some(mut session) = cx.engine.stores.sessions.get(&grant.session_id).await? else {
            return Err(OAuthError::invalid_request(
                "The session backing this grant no longer exists.",
            ));
        };
        session.push_login(login.id.clone());
        cx.engine.stores.sessions.put(session).await?;

        let expected = grant.version;
        let mut updated = grant;
        updated.record_interaction(InteractionKind::Login);
        commit_grant(cx, updated.clone(), expected).await?;

        info!(grant_id = %updated.id, user_id = %user.id, "login accepted");
        Ok(json!({ "redirect_to": resume_url(cx.engine, &updated) }))
    }
}

/// Map a UI-supplied error string onto the closed code set.
pub(crate) fn parse_error_code(code: &str) -> ErrorCode {
    match code {
        "login_required" => ErrorCode::LoginRequired,
        "consent_required" => ErrorCode::ConsentRequired,
        "interaction_required" => ErrorCode::InteractionRequired,
        "account_selection_required" => ErrorCode::AccountSelectionRequired,
        "unmet_authentication_requirements" => ErrorCode::UnmetAuthenticationRequirements,
        "temporarily_unavailable" => ErrorCode::TemporarilyUnavailable,
        "server_error" => ErrorCode::ServerError,
        _ => ErrorCode::AccessDenied,
    }
}
