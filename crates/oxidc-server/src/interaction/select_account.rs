//! The select-account interaction
//!
//! Lets the user switch between logins already stacked on the session.
//! The chosen login must be on the stack; nothing new is authenticated
//! here.

use async_trait::async_trait;
use serde_json::{Value, json};

use oxidc_core::InteractionKind;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Params;

use super::{InteractionContext, InteractionHandler, commit_grant, grant_by_challenge, resume_url};

/// `select_account` context/decision handler.
#[derive(Debug, Default)]
pub struct SelectAccountInteraction;

#[async_trait]
impl InteractionHandler for SelectAccountInteraction {
    fn kind(&self) -> &'static str {
        "select_account"
    }

    fn challenge_param(&self) -> &'static str {
        "login_challenge"
    }

    async fn context(&self, cx: &InteractionContext<'_>, challenge: &str) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, false).await?;
        let Some(session) = cx.engine.stores.sessions.get(&grant.session_id).await? else {
            return Err(OAuthError::invalid_request(
                "The session backing this grant no longer exists.",
            ));
        };
        let mut accounts = Vec::new();
        for login_id in &session.logins {
            if let Some(login) = cx.engine.stores.logins.get(login_id).await? {
                let user = cx.engine.stores.users.get(&login.user_id).await?;
                accounts.push(json!({
                    "login_id": login.id,
                    "user_id": login.user_id,
                    "username": user.and_then(|u| u.username),
                    "active": session.active_login.as_deref() == Some(login_id.as_str()),
                }));
            }
        }
        Ok(json!({
            "challenge": challenge,
            "client": { "client_id": grant.client_id },
            "accounts": accounts,
        }))
    }

    async fn decide(
        &self,
        cx: &InteractionContext<'_>,
        challenge: &str,
        decision: &Params<'_>,
    ) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, false).await?;
        let login_id = decision.require("login_id")?;

        let Some(mut session) = cx.engine.stores.sessions.get(&grant.session_id).await? else {
            return Err(OAuthError::invalid_request(
                "The session backing this grant no longer exists.",
            ));
        };
        if !session.activate_login(login_id) {
            return Err(OAuthError::invalid_request(
                "The selected login is not part of this session.",
            ));
        }
        cx.engine.stores.sessions.put(session).await?;

        let expected = grant.version;
        let mut updated = grant;
        updated.record_interaction(InteractionKind::SelectAccount);
        commit_grant(cx, updated.clone(), expected).await?;

        Ok(json!({ "redirect_to": resume_url(cx.engine, &updated) }))
    }
}
