//! The userinfo endpoint (OIDC Core 5.3)
//!
//! Bearer-authenticated. The claim set is implied by the granted scopes
//! plus the `claims` request parameter carried from the authorization,
//! filtered to what the user service exposes. `sub` always uses the same
//! derivation as the ID token, so pairwise clients see consistent
//! subjects.

use serde_json::{Map, Value, json};

use oxidc_core::error::OAuthError;
use oxidc_core::http::{Request, Response};

use crate::container::{Engine, RequestScope};

fn bearer_error(err: OAuthError) -> Response {
    Response::from_error(&err.with_www_authenticate("Bearer"))
}

/// Handle `GET /oauth/userinfo`.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let Some(bearer) = request.bearer_token() else {
        return bearer_error(OAuthError::invalid_token(
            "The request lacks a bearer access token.",
        ));
    };

    let token = match engine.stores.access_tokens.get(bearer).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            return bearer_error(OAuthError::invalid_token("The access token is unknown."));
        }
        Err(err) => return Response::from_error(&err.into()),
    };
    if !token.is_active(scope.now) {
        return bearer_error(OAuthError::invalid_token(
            "The access token is expired or revoked.",
        ));
    }
    if !token.scopes.has_openid() {
        return bearer_error(OAuthError::insufficient_scope(
            "The access token lacks the \"openid\" scope.",
        ));
    }
    let Some(user_id) = token.user_id.clone() else {
        return bearer_error(OAuthError::invalid_token(
            "The access token is not bound to an end user.",
        ));
    };

    let client = match engine.stores.clients.get(&token.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return bearer_error(OAuthError::invalid_token(
                "The client behind the access token no longer exists.",
            ));
        }
        Err(err) => return Response::from_error(&err.into()),
    };

    let sub = match engine.tokens.subject_for(&client, &user_id).await {
        Ok(sub) => sub,
        Err(err) => return Response::from_error(&err),
    };
    let claims_request = token.claims.as_ref().and_then(|c| c.get("userinfo"));
    let user_claims = match engine
        .stores
        .users
        .claims(&user_id, &token.scopes, claims_request)
        .await
    {
        Ok(claims) => claims,
        Err(err) => return Response::from_error(&err.into()),
    };

    let mut payload = Map::new();
    payload.insert("sub".into(), json!(sub));
    for (name, value) in user_claims {
        payload.entry(name).or_insert(value);
    }

    // Signed userinfo when the client registered an algorithm for it.
    if let Some(alg) = &client.userinfo_signed_response_alg {
        payload.insert("iss".into(), json!(engine.options.issuer));
        payload.insert("aud".into(), json!(client.client_id));
        let Some(key) = engine.keys.select(alg) else {
            return Response::from_error(&OAuthError::server_error(format!(
                "no signing key for userinfo alg {alg}"
            )));
        };
        return match oxidc_jose::jwt::sign(key, &payload) {
            Ok(token) => Response {
                status: 200,
                headers: vec![("Content-Type".into(), "application/jwt".into())],
                cookies: Vec::new(),
                body: oxidc_core::http::Body::Text(token),
            }
            .no_store(),
            Err(err) => Response::from_error(&OAuthError::server_error(err.to_string())),
        };
    }

    Response::json(200, Value::Object(payload)).no_store()
}
