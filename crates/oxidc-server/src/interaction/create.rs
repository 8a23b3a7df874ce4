//! The create interaction
//!
//! Allocates a brand-new user through the user service, logs the new
//! account in, and resumes the authorization. What "creating a user"
//! means (verification, profile capture) is the UI's business.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::Params;
use oxidc_core::{InteractionKind, Login};

use crate::tokens::TokenService;

use super::login::parse_error_code;
use super::{
    InteractionContext, InteractionHandler, commit_grant, deny_grant, grant_by_challenge,
    resume_url,
};

/// `create` context/decision handler.
#[derive(Debug, Default)]
pub struct CreateInteraction;

#[async_trait]
impl InteractionHandler for CreateInteraction {
    fn kind(&self) -> &'static str {
        "create"
    }

    fn challenge_param(&self) -> &'static str {
        "login_challenge"
    }

    async fn context(&self, cx: &InteractionContext<'_>, challenge: &str) -> OAuthResult<Value> {
        let grant = grant_by_challenge(cx, challenge, false).await?;
        let client = cx.engine.stores.clients.get(&grant.client_id).await?;
        Ok(json!({
            "challenge": challenge,
            "client": {
                "client_id": grant.client_id,
                "client_name": client.and_then(|c| c.client_name),
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
                    .unwrap_or("The end user abandoned account creation.");
                let err = OAuthError::new(parse_error_code(code), description);
                return deny_grant(cx, &grant, &err).await;
            }
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "Unknown decision action \"{other}\"."
                )));
            }
        }

        let user = cx.engine.stores.users.create().await?;
        let login = Login {
            id: TokenService::opaque_token(),
            user_id: user.id.clone(),
            created_at: Utc::now(),
            expires_at: Utc::now() + cx.engine.options.ttls.login,
            amr: vec!["pwd".into()],
            acr: None,
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
        updated.record_interaction(InteractionKind::Create);
        updated.record_interaction(InteractionKind::Login);
        commit_grant(cx, updated.clone(), expected).await?;

        info!(grant_id = %updated.id, user_id = %user.id, "account created");
        Ok(json!({
            "redirect_to": resume_url(cx.engine, &updated),
            "user_id": user.id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RequestScope;
    use crate::interaction::tests_support::{decision, grant_fixture};
    use crate::testing::TestProvider;

    #[tokio::test]
    async fn creates_user_and_logs_in() {
        let provider = TestProvider::with_defaults().await;
        let engine = provider.into_engine();
        let grant = grant_fixture(&engine, "web-app").await;
        let scope = RequestScope::new();
        let cx = InteractionContext { engine: &engine, scope: &scope };

        let params = decision(&[
            ("login_challenge", grant.login_challenge.as_str()),
            ("action", "accept"),
        ]);
        let result = CreateInteraction
            .decide(&cx, &grant.login_challenge, &params.view())
            .await
            .unwrap();

        let user_id = result["user_id"].as_str().unwrap();
        assert!(engine.stores.users.get(user_id).await.unwrap().is_some());

        let session = engine
            .stores
            .sessions
            .get(&grant.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(session.active_login.is_some());

        let stored = engine.stores.grants.get(&grant.id).await.unwrap().unwrap();
        assert!(stored.has_interaction(InteractionKind::Create));
        assert!(stored.has_interaction(InteractionKind::Login));
    }
}
