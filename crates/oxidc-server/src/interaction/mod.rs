//! Interaction engine
//!
//! Each interaction kind exposes two operations to the first-party UI:
//! a read-only **context** (`GET`, keyed by the challenge) describing
//! what to render, and a **decision** (`POST`) recording the outcome.
//! Possession of the unguessable challenge authorizes the callback.
//!
//! Decisions on the same grant are serialized through the grant store's
//! compare-and-set: of two racing decisions exactly one wins, the loser
//! receives `invalid_request`.
//!
//! Every decision response carries a `redirect_to` URL sending the user
//! agent back to `/oauth/authorize` with the original frozen parameters
//! so the state machine re-enters with the new interaction recorded.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::{Method, Params, Request, Response, encode_params};
use oxidc_core::{Expires, Grant};

use crate::container::{Engine, RequestScope};

pub mod consent;
pub mod create;
pub mod login;
pub mod logout;
pub mod select_account;

pub use consent::ConsentInteraction;
pub use create::CreateInteraction;
pub use login::LoginInteraction;
pub use logout::LogoutInteraction;
pub use select_account::SelectAccountInteraction;

/// Shared state for interaction operations.
pub struct InteractionContext<'a> {
    pub engine: &'a Engine,
    pub scope: &'a RequestScope,
}

/// One interaction kind (login, consent, select_account, create,
/// logout).
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// Path segment under the interaction prefix.
    fn kind(&self) -> &'static str;

    /// Name of the challenge parameter this kind is keyed by.
    fn challenge_param(&self) -> &'static str;

    /// Read-only snapshot for the UI.
    async fn context(&self, cx: &InteractionContext<'_>, challenge: &str) -> OAuthResult<Value>;

    /// Record the UI's decision; returns JSON with `redirect_to`.
    async fn decide(
        &self,
        cx: &InteractionContext<'_>,
        challenge: &str,
        decision: &Params<'_>,
    ) -> OAuthResult<Value>;
}

/// Dispatch an interaction request by its path segment.
pub async fn handle(engine: &Engine, scope: &RequestScope, kind: &str, request: &Request) -> Response {
    let handlers: [&dyn InteractionHandler; 5] = [
        &LoginInteraction,
        &ConsentInteraction,
        &SelectAccountInteraction,
        &CreateInteraction,
        &LogoutInteraction,
    ];
    let Some(handler) = handlers.iter().find(|h| h.kind() == kind) else {
        return Response::from_error(&OAuthError::invalid_request(format!(
            "Unknown interaction \"{kind}\"."
        )));
    };

    let cx = InteractionContext { engine, scope };
    let result = match request.method {
        Method::Get => {
            let params = request.merged_params();
            match params.get(handler.challenge_param()) {
                Ok(Some(challenge)) => handler.context(&cx, challenge).await,
                Ok(None) => Err(OAuthError::invalid_request(format!(
                    "Missing required parameter \"{}\".",
                    handler.challenge_param()
                ))),
                Err(err) => Err(err),
            }
        }
        Method::Post => {
            let params = request.form_params();
            match params.get(handler.challenge_param()) {
                Ok(Some(challenge)) => handler.decide(&cx, challenge, &params).await,
                Ok(None) => Err(OAuthError::invalid_request(format!(
                    "Missing required parameter \"{}\".",
                    handler.challenge_param()
                ))),
                Err(err) => Err(err),
            }
        }
        _ => Err(OAuthError::invalid_request(
            "Interactions accept GET and POST only.",
        )),
    };

    match result {
        Ok(body) => Response::json(200, body).no_store(),
        Err(err) => Response::from_error(&err),
    }
}

/// Load a live grant by challenge; an expired grant is removed and the
/// authorization is denied.
pub(crate) async fn grant_by_challenge(
    cx: &InteractionContext<'_>,
    challenge: &str,
    consent_side: bool,
) -> OAuthResult<Grant> {
    let grants = &cx.engine.stores.grants;
    let found = if consent_side {
        grants.by_consent_challenge(challenge).await?
    } else {
        grants.by_login_challenge(challenge).await?
    };
    let Some(grant) = found else {
        return Err(OAuthError::invalid_request(
            "The provided challenge is unknown.",
        ));
    };
    if grant.is_expired(cx.scope.now) {
        grants.delete(&grant.id).await?;
        return Err(OAuthError::access_denied("Expired Grant."));
    }
    Ok(grant)
}

/// Commit a grant mutation through compare-and-set. A lost race is
/// `invalid_request` per the serialization contract.
pub(crate) async fn commit_grant(
    cx: &InteractionContext<'_>,
    grant: Grant,
    expected_version: u64,
) -> OAuthResult<()> {
    let won = cx
        .engine
        .stores
        .grants
        .update_if_version(grant, expected_version)
        .await?;
    if won {
        Ok(())
    } else {
        Err(OAuthError::invalid_request(
            "The interaction raced with another decision on the same grant.",
        ))
    }
}

/// The URL resuming the frozen authorization request.
pub(crate) fn resume_url(engine: &Engine, grant: &Grant) -> String {
    format!(
        "{}?{}",
        engine.options.endpoint_url(&engine.options.paths.authorize),
        encode_params(&grant.parameters)
    )
}

/// A decision response bouncing the browser to the error URL.
pub(crate) fn error_redirect(engine: &Engine, err: &OAuthError) -> Value {
    let target = format!(
        "{}?{}",
        engine.options.interaction.error_url,
        encode_params(&err.to_params())
    );
    json!({ "redirect_to": target })
}

/// Remove a grant and answer with an error redirect (denials).
pub(crate) async fn deny_grant(
    cx: &InteractionContext<'_>,
    grant: &Grant,
    err: &OAuthError,
) -> OAuthResult<Value> {
    cx.engine.stores.grants.delete(&grant.id).await?;
    info!(grant_id = %grant.id, error = err.code.as_str(), "interaction denied");
    Ok(error_redirect(cx.engine, err))
}

#[cfg(test)]
pub(crate) mod tests_support {
    use chrono::Utc;

    use oxidc_core::http::Params;
    use oxidc_core::{Grant, Session};

    use crate::container::Engine;
    use crate::tokens::TokenService;

    pub(crate) struct DecisionParams {
        pairs: Vec<(String, String)>,
    }

    impl DecisionParams {
        pub(crate) fn view(&self) -> Params<'_> {
            Params::over(vec![self.pairs.as_slice()])
        }
    }

    pub(crate) fn decision(pairs: &[(&str, &str)]) -> DecisionParams {
        DecisionParams {
            pairs: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// A pending grant with its backing session, as the authorize
    /// endpoint would have created it.
    pub(crate) async fn grant_fixture(engine: &Engine, client_id: &str) -> Grant {
        let now = Utc::now();
        let session = Session::new(
            TokenService::opaque_token(),
            now,
            engine.options.ttls.session,
        );
        engine.stores.sessions.put(session.clone()).await.unwrap();

        let grant = Grant {
            id: TokenService::opaque_token(),
            login_challenge: TokenService::opaque_token(),
            consent_challenge: TokenService::opaque_token(),
            parameters: vec![
                ("response_type".into(), "code".into()),
                ("client_id".into(), client_id.into()),
                ("redirect_uri".into(), "https://rp.example.com/cb".into()),
                ("scope".into(), "openid".into()),
                ("state".into(), "s-123".into()),
            ],
            interactions: Vec::new(),
            created_at: now,
            expires_at: now + engine.options.ttls.grant,
            client_id: client_id.to_string(),
            session_id: session.id,
            consent_id: None,
            version: 0,
        };
        engine.stores.grants.put(grant.clone()).await.unwrap();
        grant
    }
}
