//! Device authorization endpoint (RFC 8628 3.1-3.2)
//!
//! Issues the device/user code pair. The user-facing half - approving or
//! denying a user code after authenticating in a browser - is exposed as
//! operations for the verification UI.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;
use tracing::info;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::{Request, Response, encode_component};
use oxidc_core::{DeviceAuthorization, DeviceStatus, Expires, ScopeSet};

use crate::client_auth::authenticate_client;
use crate::container::{Engine, RequestScope};
use crate::registry::GRANT_DEVICE_CODE;
use crate::tokens::TokenService;

/// Characters used in user codes: unambiguous consonants, per the
/// RFC 8628 usability guidance.
const USER_CODE_CHARSET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Default minimum polling interval in seconds.
const DEFAULT_INTERVAL: u64 = 5;

fn generate_user_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(9);
    for position in 0..8 {
        if position == 4 {
            code.push('-');
        }
        let index = rng.random_range(0..USER_CODE_CHARSET.len());
        code.push(USER_CODE_CHARSET[index] as char);
    }
    code
}

/// Handle `POST /oauth/device_authorization`.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let authn = engine.authn_context(&engine.options.paths.device_authorization, scope.now);
    let client = match authenticate_client(request, &engine.registries, &authn).await {
        Ok(client) => client,
        Err(err) => return Response::from_error(&err),
    };
    if !client.allows_grant_type(GRANT_DEVICE_CODE) {
        return Response::from_error(&OAuthError::unauthorized_client(
            "The client is not authorized to use the device authorization grant.",
        ));
    }

    let scopes = match request.form_params().get("scope") {
        Ok(Some(raw)) => match ScopeSet::parse(raw)
            .and_then(|s| s.allowed_for(&client.scopes, engine.options.scope_policy))
        {
            Ok(scopes) => scopes,
            Err(err) => return Response::from_error(&err),
        },
        Ok(None) => client.scopes.clone(),
        Err(err) => return Response::from_error(&err),
    };

    let authorization = DeviceAuthorization {
        device_code: TokenService::opaque_token(),
        user_code: generate_user_code(),
        client_id: client.client_id.clone(),
        scopes,
        interval: DEFAULT_INTERVAL,
        created_at: scope.now,
        expires_at: scope.now + engine.options.ttls.device_code,
        last_polled_at: None,
        status: DeviceStatus::Pending,
    };
    if let Err(err) = engine.stores.device_codes.put(authorization.clone()).await {
        return Response::from_error(&err.into());
    }
    info!(client_id = %client.client_id, user_code = %authorization.user_code, "device authorization issued");

    let verification_uri = engine.options.interaction.device_verification_url.clone();
    let verification_uri_complete = format!(
        "{verification_uri}{}user_code={}",
        if verification_uri.contains('?') { '&' } else { '?' },
        encode_component(&authorization.user_code)
    );
    Response::json(
        200,
        json!({
            "device_code": authorization.device_code,
            "user_code": authorization.user_code,
            "verification_uri": verification_uri,
            "verification_uri_complete": verification_uri_complete,
            "expires_in": authorization.remaining_seconds(scope.now),
            "interval": authorization.interval,
        }),
    )
    .no_store()
}

/// Approve a pending user code for a user (verification UI callback).
pub async fn approve(
    engine: &Engine,
    user_code: &str,
    user_id: &str,
    login_id: Option<&str>,
    now: DateTime<Utc>,
) -> OAuthResult<()> {
    let mut authorization = pending(engine, user_code, now).await?;
    authorization.status = DeviceStatus::Authorized {
        user_id: user_id.to_string(),
        login_id: login_id.map(ToString::to_string),
    };
    engine.stores.device_codes.update(authorization).await?;
    info!(user_code, user_id, "device authorization approved");
    Ok(())
}

/// Deny a pending user code (verification UI callback).
pub async fn deny(engine: &Engine, user_code: &str, now: DateTime<Utc>) -> OAuthResult<()> {
    let mut authorization = pending(engine, user_code, now).await?;
    authorization.status = DeviceStatus::Denied;
    engine.stores.device_codes.update(authorization).await?;
    info!(user_code, "device authorization denied");
    Ok(())
}

async fn pending(
    engine: &Engine,
    user_code: &str,
    now: DateTime<Utc>,
) -> OAuthResult<DeviceAuthorization> {
    let Some(authorization) = engine.stores.device_codes.by_user_code(user_code).await? else {
        return Err(OAuthError::invalid_request("Unknown user code."));
    };
    if authorization.is_expired(now) {
        return Err(OAuthError::expired_token("The user code has expired."));
    }
    if authorization.status != DeviceStatus::Pending {
        return Err(OAuthError::invalid_request(
            "The user code has already been decided.",
        ));
    }
    Ok(authorization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use base64::Engine as _;
    use oxidc_core::Client;
    use oxidc_core::http::Body;

    async fn engine_with_device_client() -> Engine {
        let mut options = TestProvider::default_options();
        options.enable_device_authorization_grant = true;
        options.client_auth_methods = vec!["client_secret_basic".into(), "none".into()];
        let provider = TestProvider::with_options(options).await;
        let client = Client::public("tv-app", vec![])
            .with_grant_types([GRANT_DEVICE_CODE])
            .with_scopes(ScopeSet::parse("openid").unwrap());
        provider.stores().clients.put(client).await.unwrap();
        provider.into_engine()
    }

    fn device_request() -> Request {
        Request::post("/oauth/device_authorization")
            .with_form("client_id", "tv-app")
            .with_form("scope", "openid")
    }

    #[tokio::test]
    async fn issues_code_pair_with_verification_uris() {
        let engine = engine_with_device_client().await;
        let response = handle(&engine, &RequestScope::new(), &device_request()).await;
        assert_eq!(response.status, 200);
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        let user_code = body["user_code"].as_str().unwrap();
        assert_eq!(user_code.len(), 9);
        assert_eq!(&user_code[4..5], "-");
        assert_eq!(body["interval"], 5);
        assert_eq!(body["verification_uri"], "https://id.example.com/ui/device");
        assert!(
            body["verification_uri_complete"]
                .as_str()
                .unwrap()
                .contains("user_code=")
        );
        assert_eq!(body["expires_in"], 600);
    }

    #[tokio::test]
    async fn approval_flow_transitions_status() {
        let engine = engine_with_device_client().await;
        let response = handle(&engine, &RequestScope::new(), &device_request()).await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        let user_code = body["user_code"].as_str().unwrap();

        approve(&engine, user_code, "user-1", None, Utc::now())
            .await
            .unwrap();
        let stored = engine
            .stores
            .device_codes
            .by_user_code(user_code)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(stored.status, DeviceStatus::Authorized { .. }));

        // double-deciding is refused
        assert!(deny(&engine, user_code, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn approving_an_expired_user_code_fails() {
        let engine = engine_with_device_client().await;
        let response = handle(&engine, &RequestScope::new(), &device_request()).await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        let user_code = body["user_code"].as_str().unwrap();
        let expires_in = body["expires_in"].as_u64().unwrap();

        // advance past the code lifetime; no wall-clock sleeping needed
        let later = Utc::now() + chrono::Duration::seconds(expires_in as i64 + 1);
        let err = approve(&engine, user_code, "user-1", None, later)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "expired_token");

        let stored = engine
            .stores
            .device_codes
            .by_user_code(user_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DeviceStatus::Pending, "no decision was recorded");
    }

    #[tokio::test]
    async fn client_without_device_grant_is_refused() {
        let engine = engine_with_device_client().await;
        let request = Request::post("/oauth/device_authorization")
            .with_header(
                "authorization",
                format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD
                        .encode("web-app:correct-horse-battery-staple")
                ),
            );
        let response = handle(&engine, &RequestScope::new(), &request).await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "unauthorized_client");
    }
}
