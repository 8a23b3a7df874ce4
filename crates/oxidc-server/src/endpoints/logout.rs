//! RP-initiated logout (OIDC RP-Initiated Logout 1.0)
//!
//! Two passes through the same endpoint. First pass: validate
//! `id_token_hint` / `post_logout_redirect_uri`, mint a logout ticket,
//! and send the browser to the logout UI. Second pass (with
//! `logout_verifier`, set by the accepted logout interaction): clear the
//! engine cookies and honor the post-logout redirect.

use tracing::{info, warn};

use oxidc_core::error::OAuthError;
use oxidc_core::http::{Request, Response, encode_component, encode_params};
use oxidc_core::{Expires, LogoutTicket};
use oxidc_jose::jwt::{self, VerificationKey, VerifyOptions};

use crate::container::{Engine, RequestScope};
use crate::cookies;
use crate::tokens::TokenService;

fn error_page(description: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html><html><head><title>Logout error</title></head>\
         <body><h1>Logout request error</h1><p>{}</p></body></html>",
        description.replace('<', "&lt;").replace('>', "&gt;")
    );
    Response::html(400, body).no_store()
}

fn signed_out_page() -> Response {
    Response::html(
        200,
        "<!DOCTYPE html><html><head><title>Signed out</title></head>\
         <body><h1>You have been signed out.</h1></body></html>"
            .to_string(),
    )
    .no_store()
}

/// Handle `GET`/`POST /oauth/logout`.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let params = request.merged_params();

    // Second pass: the interaction accepted and bounced back with a
    // verifier.
    match params.get("logout_verifier") {
        Ok(Some(verifier)) => return complete(engine, verifier).await,
        Ok(None) => {}
        Err(err) => return error_page(&err.description),
    }

    // First pass: establish who is logging out and where they may land.
    let client_id_hint = match params.get("client_id") {
        Ok(value) => value.map(ToString::to_string),
        Err(err) => return error_page(&err.description),
    };
    let id_token_hint = match params.get("id_token_hint") {
        Ok(value) => value,
        Err(err) => return error_page(&err.description),
    };

    let mut client_id = client_id_hint;
    if let Some(hint) = id_token_hint {
        match verify_id_token_hint(engine, hint) {
            Ok(aud) => {
                if let Some(expected) = &client_id
                    && *expected != aud
                {
                    return error_page("The id_token_hint does not belong to the given client.");
                }
                client_id = Some(aud);
            }
            Err(err) => {
                warn!(error = %err, "invalid id_token_hint");
                return error_page("The id_token_hint could not be verified.");
            }
        }
    }

    let client = match &client_id {
        Some(client_id) => match engine.stores.clients.get(client_id).await {
            Ok(found) => found,
            Err(err) => return Response::from_error(&OAuthError::from(err)),
        },
        None => None,
    };

    let post_logout_redirect_uri = match params.get("post_logout_redirect_uri") {
        Ok(value) => value.map(ToString::to_string),
        Err(err) => return error_page(&err.description),
    };
    if let Some(target) = &post_logout_redirect_uri {
        let allowed = client
            .as_ref()
            .is_some_and(|c| c.post_logout_redirect_registered(target));
        if !allowed {
            return error_page("The post_logout_redirect_uri is not registered for this client.");
        }
    }
    let state = match params.get("state") {
        Ok(value) => value.map(ToString::to_string),
        Err(err) => return error_page(&err.description),
    };

    // Nothing to end without a session: complete immediately.
    let Some(session_id) = request.cookie(cookies::SESSION_COOKIE) else {
        return finished_response(post_logout_redirect_uri.as_deref(), state.as_deref());
    };

    let ticket = LogoutTicket {
        id: TokenService::opaque_token(),
        logout_challenge: TokenService::opaque_token(),
        session_id: session_id.to_string(),
        client_id,
        post_logout_redirect_uri,
        state,
        created_at: scope.now,
        expires_at: scope.now + engine.options.ttls.grant,
    };
    if let Err(err) = engine.stores.logout_tickets.put(ticket.clone()).await {
        return Response::from_error(&OAuthError::from(err));
    }
    info!(session_id = %ticket.session_id, "logout requested");

    Response::redirect(format!(
        "{}{}logout_challenge={}",
        engine.options.interaction.logout_url,
        if engine.options.interaction.logout_url.contains('?') {
            '&'
        } else {
            '?'
        },
        encode_component(&ticket.logout_challenge)
    ))
}

/// Verify an `id_token_hint` against our own signing keys. Expiry is not
/// enforced; the audience is the hint's client. Returns the audience.
fn verify_id_token_hint(engine: &Engine, hint: &str) -> Result<String, OAuthError> {
    let (header, _) = jwt::peek(hint)
        .map_err(|e| OAuthError::invalid_request(format!("id_token_hint: {e}")))?;
    let alg = format!("{:?}", header.alg);
    let key = match header.kid.as_deref().and_then(|kid| engine.keys.by_kid(kid)) {
        Some(key) => key,
        None => engine
            .keys
            .select(&alg)
            .ok_or_else(|| OAuthError::invalid_request("id_token_hint: unknown signing key"))?,
    };
    let claims = jwt::verify(
        hint,
        &alg,
        &VerificationKey::Issuer(key),
        &VerifyOptions {
            validate_exp: false,
            require_exp: false,
            ..VerifyOptions::default()
        },
    )
    .map_err(|e| OAuthError::invalid_request(format!("id_token_hint: {e}")))?;

    if claims.get("iss").and_then(serde_json::Value::as_str) != Some(engine.options.issuer.as_str())
    {
        return Err(OAuthError::invalid_request(
            "id_token_hint: issuer mismatch",
        ));
    }
    claims
        .get("aud")
        .and_then(|aud| match aud {
            serde_json::Value::String(aud) => Some(aud.clone()),
            serde_json::Value::Array(entries) => entries
                .first()
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string),
            _ => None,
        })
        .ok_or_else(|| OAuthError::invalid_request("id_token_hint: missing audience"))
}

/// Second pass: remove the ticket, clear cookies, honor the redirect.
async fn complete(engine: &Engine, verifier: &str) -> Response {
    let ticket = match engine.stores.logout_tickets.by_challenge(verifier).await {
        Ok(Some(ticket)) => ticket,
        Ok(None) => return error_page("Unknown logout verifier."),
        Err(err) => return Response::from_error(&OAuthError::from(err)),
    };
    if let Err(err) = engine.stores.logout_tickets.delete(&ticket.id).await {
        return Response::from_error(&OAuthError::from(err));
    }
    if ticket.is_expired(chrono::Utc::now()) {
        return error_page("The logout request expired.");
    }
    finished_response(
        ticket.post_logout_redirect_uri.as_deref(),
        ticket.state.as_deref(),
    )
}

fn finished_response(redirect: Option<&str>, state: Option<&str>) -> Response {
    let response = match redirect {
        Some(target) => {
            let mut params = Vec::new();
            if let Some(state) = state {
                params.push(("state".to_string(), state.to_string()));
            }
            if params.is_empty() {
                Response::redirect(target.to_string())
            } else {
                let separator = if target.contains('?') { '&' } else { '?' };
                Response::redirect(format!("{target}{separator}{}", encode_params(&params)))
            }
        }
        None => signed_out_page(),
    };
    response
        .with_cookie(cookies::clear_session_cookie())
        .with_cookie(cookies::clear_grant_cookie())
}
