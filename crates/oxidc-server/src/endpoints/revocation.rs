//! Token revocation (RFC 7009)
//!
//! Always answers `200` with an empty body whether or not the token
//! existed - revocation must not become a token oracle. The one
//! exception is a token provably issued to a different client, which is
//! `unauthorized_client`.

use tracing::info;

use oxidc_core::error::OAuthError;
use oxidc_core::http::{Request, Response};

use crate::client_auth::authenticate_client;
use crate::container::{Engine, RequestScope};

/// Handle `POST /oauth/revoke`.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let authn = engine.authn_context(&engine.options.paths.revocation, scope.now);
    let client = match authenticate_client(request, &engine.registries, &authn).await {
        Ok(client) => client,
        Err(err) => return Response::from_error(&err),
    };
    let params = request.form_params();
    let token = match params.require("token") {
        Ok(token) => token,
        Err(err) => return Response::from_error(&err),
    };
    let hint = match params.get("token_type_hint") {
        Ok(hint) => hint,
        Err(err) => return Response::from_error(&err),
    };

    // The hint only orders the search; both stores are consulted.
    let try_refresh_first = hint == Some("refresh_token");

    if !try_refresh_first
        && let Ok(Some(access)) = engine.stores.access_tokens.get(token).await
    {
        return revoke_access(engine, &client.client_id, access).await;
    }
    if let Ok(Some(refresh)) = engine.stores.refresh_tokens.get(token).await {
        return revoke_refresh(engine, &client.client_id, refresh).await;
    }
    if try_refresh_first
        && let Ok(Some(access)) = engine.stores.access_tokens.get(token).await
    {
        return revoke_access(engine, &client.client_id, access).await;
    }

    // Unknown token: still a success.
    Response::empty(200).no_store()
}

async fn revoke_access(
    engine: &Engine,
    client_id: &str,
    mut token: oxidc_core::AccessToken,
) -> Response {
    if token.client_id != client_id {
        return Response::from_error(&OAuthError::unauthorized_client(
            "The token was not issued to this client.",
        ));
    }
    token.revoked = true;
    if let Err(err) = engine.stores.access_tokens.update(token).await {
        return Response::from_error(&err.into());
    }
    info!(client_id, "access token revoked");
    Response::empty(200).no_store()
}

async fn revoke_refresh(
    engine: &Engine,
    client_id: &str,
    token: oxidc_core::RefreshToken,
) -> Response {
    if token.client_id != client_id {
        return Response::from_error(&OAuthError::unauthorized_client(
            "The token was not issued to this client.",
        ));
    }
    // Revoking a refresh token burns its rotation chain; dependent
    // access tokens follow when access-token revocation is enabled.
    if let Err(err) = engine.tokens.revoke_refresh_chain(&token.chain_id).await {
        return Response::from_error(&err);
    }
    info!(client_id, "refresh token chain revoked");
    Response::empty(200).no_store()
}
