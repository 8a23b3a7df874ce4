//! Token introspection (RFC 7662)
//!
//! Returns `{"active": false}` for anything that is unknown, revoked,
//! outside its validity window, or foreign to the authenticated client -
//! all four cases are indistinguishable on the wire. Refresh-token
//! introspection is gated by configuration.

use serde::Serialize;
use serde_json::json;

use oxidc_core::http::{Request, Response};
use oxidc_core::{AccessToken, RefreshToken};

use crate::client_auth::authenticate_client;
use crate::container::{Engine, RequestScope};

/// Introspection response per RFC 7662 Section 2.2.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active (REQUIRED)
    pub active: bool,

    /// Scope(s) associated with the token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Username (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Token type (Bearer, refresh_token)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Expiration timestamp (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at timestamp (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before timestamp (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectionResponse {
    fn inactive() -> Self {
        Self::default()
    }
}

/// Handle `POST /oauth/introspect`.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let authn = engine.authn_context(&engine.options.paths.introspection, scope.now);
    let client = match authenticate_client(request, &engine.registries, &authn).await {
        Ok(client) => client,
        Err(err) => return Response::from_error(&err),
    };
    let params = request.form_params();
    let token = match params.require("token") {
        Ok(token) => token,
        Err(err) => return Response::from_error(&err),
    };

    let payload = match introspect(engine, scope, &client.client_id, token).await {
        Ok(payload) => payload,
        Err(err) => return Response::from_error(&err),
    };
    match serde_json::to_value(&payload) {
        Ok(body) => Response::json(200, body).no_store(),
        Err(_) => Response::json(200, json!({ "active": false })).no_store(),
    }
}

async fn introspect(
    engine: &Engine,
    scope: &RequestScope,
    client_id: &str,
    token: &str,
) -> Result<IntrospectionResponse, oxidc_core::OAuthError> {
    if let Some(access) = engine.stores.access_tokens.get(token).await? {
        return access_response(engine, scope, client_id, access).await;
    }
    if engine.options.enable_refresh_token_introspection
        && let Some(refresh) = engine.stores.refresh_tokens.get(token).await?
    {
        return refresh_response(engine, scope, client_id, refresh).await;
    }
    Ok(IntrospectionResponse::inactive())
}

async fn access_response(
    engine: &Engine,
    scope: &RequestScope,
    client_id: &str,
    token: AccessToken,
) -> Result<IntrospectionResponse, oxidc_core::OAuthError> {
    if token.client_id != client_id || !token.is_active(scope.now) {
        return Ok(IntrospectionResponse::inactive());
    }
    let client = engine.stores.clients.get(&token.client_id).await?;
    let (sub, username) = match (&token.user_id, &client) {
        (Some(user_id), Some(client)) => {
            let sub = engine.tokens.subject_for(client, user_id).await?;
            let username = engine
                .stores
                .users
                .get(user_id)
                .await?
                .and_then(|u| u.username);
            (Some(sub), username)
        }
        _ => (None, None),
    };
    Ok(IntrospectionResponse {
        active: true,
        scope: Some(token.scopes.to_string()),
        client_id: Some(token.client_id.clone()),
        username,
        token_type: Some(token.token_type.clone()),
        exp: Some(token.expires_at.timestamp()),
        iat: Some(token.issued_at.timestamp()),
        nbf: Some(token.valid_after.timestamp()),
        sub,
        aud: Some(token.client_id),
        iss: Some(engine.options.issuer.clone()),
    })
}

async fn refresh_response(
    engine: &Engine,
    scope: &RequestScope,
    client_id: &str,
    token: RefreshToken,
) -> Result<IntrospectionResponse, oxidc_core::OAuthError> {
    if token.client_id != client_id || !token.is_active(scope.now) {
        return Ok(IntrospectionResponse::inactive());
    }
    let client = engine.stores.clients.get(&token.client_id).await?;
    let sub = match &client {
        Some(client) => Some(engine.tokens.subject_for(client, &token.user_id).await?),
        None => None,
    };
    Ok(IntrospectionResponse {
        active: true,
        scope: Some(token.scopes.to_string()),
        client_id: Some(token.client_id.clone()),
        username: engine
            .stores
            .users
            .get(&token.user_id)
            .await?
            .and_then(|u| u.username),
        token_type: Some("refresh_token".to_string()),
        exp: Some(token.expires_at.timestamp()),
        iat: Some(token.issued_at.timestamp()),
        nbf: Some(token.valid_after.timestamp()),
        sub,
        aud: Some(token.client_id),
        iss: Some(engine.options.issuer.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use oxidc_core::http::Body;

    fn auth(id: &str, secret: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
    }

    fn introspect_request(token: &str, auth_header: &str) -> Request {
        Request::post("/oauth/introspect")
            .with_header("authorization", auth_header)
            .with_form("token", token)
    }

    async fn seed_access(provider: &TestProvider) -> oxidc_core::AccessToken {
        let client = provider.client("web-app").await;
        provider
            .tokens
            .issue_access_token(
                &client,
                Some("user-1".into()),
                oxidc_core::ScopeSet::parse("openid profile").unwrap(),
                None,
                None,
                None,
                chrono::Utc::now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn live_token_returns_claims() {
        let provider = TestProvider::with_defaults().await;
        let token = seed_access(&provider).await;
        let engine = provider.into_engine();

        let response = handle(
            &engine,
            &RequestScope::new(),
            &introspect_request(&token.token, &auth("web-app", "correct-horse-battery-staple")),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["active"], true);
        assert_eq!(body["scope"], "openid profile");
        assert_eq!(body["client_id"], "web-app");
        assert_eq!(body["username"], "alice");
        assert_eq!(body["sub"], "user-1");
        assert_eq!(body["iss"], "https://id.example.com");
        assert_eq!(body["token_type"], "Bearer");
    }

    #[tokio::test]
    async fn revoked_and_foreign_tokens_are_inactive() {
        let provider = TestProvider::with_defaults().await;
        let mut token = seed_access(&provider).await;
        provider
            .stores()
            .clients
            .put(oxidc_core::Client::confidential("rival", "rival-secret", vec![]))
            .await
            .unwrap();
        let engine = provider.into_engine();

        // foreign client sees inactive, not an error
        let response = handle(
            &engine,
            &RequestScope::new(),
            &introspect_request(&token.token, &auth("rival", "rival-secret")),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["active"], false);
        assert!(body.get("scope").is_none());

        // revoked token is inactive for its owner too
        token.revoked = true;
        engine.stores.access_tokens.update(token.clone()).await.unwrap();
        let response = handle(
            &engine,
            &RequestScope::new(),
            &introspect_request(&token.token, &auth("web-app", "correct-horse-battery-staple")),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["active"], false);
    }

    #[tokio::test]
    async fn refresh_introspection_is_gated() {
        let provider = TestProvider::with_defaults().await;
        let client = provider.client("web-app").await;
        let refresh = provider.seed_refresh(&client, "openid").await;
        let engine = provider.into_engine();

        // default: disabled, refresh tokens read as inactive
        let response = handle(
            &engine,
            &RequestScope::new(),
            &introspect_request(&refresh.token, &auth("web-app", "correct-horse-battery-staple")),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["active"], false);

        // enabled: full claims
        let mut options = TestProvider::default_options();
        options.enable_refresh_token_introspection = true;
        let provider = TestProvider::with_options(options).await;
        let client = provider.client("web-app").await;
        let refresh = provider.seed_refresh(&client, "openid").await;
        let engine = provider.into_engine();
        let response = handle(
            &engine,
            &RequestScope::new(),
            &introspect_request(&refresh.token, &auth("web-app", "correct-horse-battery-staple")),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["active"], true);
        assert_eq!(body["token_type"], "refresh_token");
    }
}
