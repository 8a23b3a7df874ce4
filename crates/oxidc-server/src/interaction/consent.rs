//! The consent interaction
//!
//! The UI presents the requested scopes and reports which of them the
//! user granted. Granted scopes must be a subset of the requested ones;
//! the recorded consent outlives the grant and short-circuits future
//! authorizations that it covers.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Params;
use oxidc_core::{Consent, InteractionKind, ScopeSet};

use super::login::parse_error_code;
use super::{
    InteractionContext, InteractionHandler, commit_grant, deny_grant, grant_by_challenge,
    resume_url,
};

/// `consent` context/decision handler.
#[derive(Debug, Default)]
pub struct ConsentInteraction;

#[async_trait]
impl InteractionHandler for ConsentInteraction {
    fn kind(&self) -> &'static str {
        "consent"
    }

    fn challenge_param(&self) -> &'static str {
        "consent_challenge"
    }

    async fn context(&self, cx: &InteractionContext<'_>, challenge: &str) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, true).await?;
        let client = cx.engine.stores.clients.get(&grant.client_id).await?;
        let session = cx.engine.stores.sessions.get(&grant.session_id).await?;
        let user_id = match session.and_then(|s| s.active_login) {
            Some(login_id) => cx
                .engine
                .stores
                .logins
                .get(&login_id)
                .await?
                .map(|l| l.user_id),
            None => None,
        };
        let requested = grant
            .parameters
            .iter()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        Ok(json!({
            "challenge": challenge,
            "client": {
                "client_id": grant.client_id,
                "client_name": client.and_then(|c| c.client_name),
            },
            "requested_scope": requested,
            "user_id": user_id,
        }))
    }

    async fn decide(
        &self,
        cx: &InteractionContext<'_>,
        challenge: &str,
        decision: &Params<'_>,
    ) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, true).await?;

        match decision.require("action")? {
            "accept" => {}
            "deny" => {
                let code = decision.get("error")?.unwrap_or("access_denied");
                let description = decision
                    .get("error_description")?
                    .unwrap_or("The end user denied the consent request.");
                let err = OAuthError::new(parse_error_code(code), description);
                return deny_grant(cx, &grant, &err).await;
            }
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "Unknown decision action \"{other}\"."
                )));
            }
        }

        let requested = grant
            .parameters
            .iter()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| ScopeSet::parse(v))
            .transpose()?
            .unwrap_or_default();
        let granted = match decision.get("granted_scope")? {
            Some(raw) => ScopeSet::parse(raw)?,
            None => requested.clone(),
        };
        if !requested.contains_all(&granted) {
            return Err(OAuthError::invalid_request(
                "Granted scopes exceed the requested scopes.",
            ));
        }

        let Some(session) = cx.engine.stores.sessions.get(&grant.session_id).await? else {
            return Err(OAuthError::invalid_request(
                "The session backing this grant no longer exists.",
            ));
        };
        let Some(login_id) = session.active_login else {
            return Err(OAuthError::invalid_request(
                "Consent requires an authenticated session.",
            ));
        };
        let Some(login) = cx.engine.stores.logins.get(&login_id).await? else {
            return Err(OAuthError::invalid_request(
                "The login backing this session no longer exists.",
            ));
        };

        let consent = Consent {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: grant.client_id.clone(),
            user_id: login.user_id.clone(),
            scopes: granted,
            created_at: Utc::now(),
            expires_at: Utc::now() + cx.engine.options.ttls.consent,
        };
        cx.engine.stores.consents.put(consent.clone()).await?;

        let expected = grant.version;
        let mut updated = grant;
        updated.consent_id = Some(consent.id.clone());
        updated.record_interaction(InteractionKind::Consent);
        commit_grant(cx, updated.clone(), expected).await?;

        info!(
            grant_id = %updated.id,
            user_id = %login.user_id,
            granted = %consent.scopes,
            "consent accepted"
        );
        Ok(json!({ "redirect_to": resume_url(cx.engine, &updated) }))
    }
}
