//! The logout interaction
//!
//! RP-initiated logout is a two-step dance: the logout endpoint creates
//! a ticket and sends the browser to the logout UI; the UI confirms
//! through this handler, which ends the session in the store and bounces
//! the browser back to the logout endpoint with a verifier so the
//! engine can clear its cookies and honor the post-logout redirect.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use oxidc_core::Expires;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::{Params, encode_component};

use super::{InteractionContext, InteractionHandler, error_redirect};

/// `logout` context/decision handler.
#[derive(Debug, Default)]
pub struct LogoutInteraction;

#[async_trait]
impl InteractionHandler for LogoutInteraction {
    fn kind(&self) -> &'static str {
        "logout"
    }

    fn challenge_param(&self) -> &'static str {
        "logout_challenge"
    }

    async fn context(&self, cx: &InteractionContext<'_>, challenge: &str) -> OAuthResult<Value> {
        let Some(ticket) = cx.engine.stores.logout_tickets.by_challenge(challenge).await? else {
            return Err(OAuthError::invalid_request(
                "The provided challenge is unknown.",
            ));
        };
        if ticket.is_expired(cx.scope.now) {
            cx.engine.stores.logout_tickets.delete(&ticket.id).await?;
            return Err(OAuthError::access_denied("Expired logout request."));
        }
        let session = cx.engine.stores.sessions.get(&ticket.session_id).await?;
        Ok(json!({
            "challenge": challenge,
            "client_id": ticket.client_id,
            "session_active": session.is_some_and(|s| s.active_login.is_some()),
        }))
    }

    async fn decide(
        &self,
        cx: &InteractionContext<'_>,
        challenge: &str,
        decision: &Params<'_>,
    ) -> OAuthResult<Value> {
        let Some(ticket) = cx.engine.stores.logout_tickets.by_challenge(challenge).await? else {
            return Err(OAuthError::invalid_request(
                "The provided challenge is unknown.",
            ));
        };
        if ticket.is_expired(cx.scope.now) {
            cx.engine.stores.logout_tickets.delete(&ticket.id).await?;
            return Err(OAuthError::access_denied("Expired logout request."));
        }

        match decision.require("action")? {
            "accept" => {
                // End the session now; the verifier round-trip clears the
                // browser cookies.
                let _ = cx.engine.stores.sessions.delete(&ticket.session_id).await;
                info!(session_id = %ticket.session_id, "session ended by logout");
                let target = format!(
                    "{}?logout_verifier={}",
                    cx.engine
                        .options
                        .endpoint_url(&cx.engine.options.paths.logout),
                    encode_component(&ticket.logout_challenge)
                );
                Ok(json!({ "redirect_to": target }))
            }
            "deny" => {
                cx.engine.stores.logout_tickets.delete(&ticket.id).await?;
                let err = OAuthError::access_denied("The end user declined to log out.");
                Ok(error_redirect(cx.engine, &err))
            }
            other => Err(OAuthError::invalid_request(format!(
                "Unknown decision action \"{other}\"."
            ))),
        }
    }
}
