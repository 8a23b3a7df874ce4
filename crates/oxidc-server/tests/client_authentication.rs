//! Client authentication scenarios at the token endpoint
//!
//! The dispatcher's exactly-one rule, the `client_secret_basic` failure
//! surface, public client identification, and JWT client assertions.

mod common;

use common::{CLIENT_ID, CLIENT_SECRET, basic_auth, harness, json_body};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use oxidc_server::Client;
use oxidc_server::core::ScopeSet;
use oxidc_server::core::http::Request;
use oxidc_server::jose::{KeyRing, jwt};
use serde_json::json;

#[tokio::test]
async fn wrong_basic_secret_is_401_with_challenge() {
    let harness = harness().await;
    let request = Request::post("/oauth/token")
        .with_header("authorization", basic_auth(CLIENT_ID, "wrong"))
        .with_form("grant_type", "client_credentials");
    let response = harness.provider.handle(&request).await;

    assert_eq!(response.status, 401);
    assert_eq!(json_body(&response)["error"], "invalid_client");
    assert!(
        response
            .headers
            .iter()
            .any(|(name, value)| name == "WWW-Authenticate" && value.starts_with("Basic"))
    );
}

#[tokio::test]
async fn two_authentication_methods_at_once_are_rejected() {
    let harness = harness_with_post_client().await;
    let request = Request::post("/oauth/token")
        .with_header("authorization", basic_auth(CLIENT_ID, CLIENT_SECRET))
        .with_form("client_id", "post-app")
        .with_form("client_secret", "post-secret")
        .with_form("grant_type", "client_credentials");
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 401);
    assert_eq!(json_body(&response)["error"], "invalid_client");
}

async fn harness_with_post_client() -> common::Harness {
    let harness = common::harness_with(|options| {
        options.client_auth_methods = vec![
            "client_secret_basic".into(),
            "client_secret_post".into(),
            "none".into(),
            "client_secret_jwt".into(),
        ];
    })
    .await;
    let mut client = Client::confidential("post-app", "post-secret", vec![])
        .with_grant_types(["client_credentials"])
        .with_scopes(ScopeSet::parse("api:read").unwrap());
    client.token_endpoint_auth_method = "client_secret_post".into();
    harness.put_client(client).await;
    harness
}

#[tokio::test]
async fn client_secret_post_works_when_enabled() {
    let harness = harness_with_post_client().await;
    let request = Request::post("/oauth/token")
        .with_form("client_id", "post-app")
        .with_form("client_secret", "post-secret")
        .with_form("grant_type", "client_credentials");
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 200);
    assert_eq!(json_body(&response)["scope"], "api:read");
}

#[tokio::test]
async fn public_client_cannot_present_a_secret() {
    let harness = common::harness_with(|options| {
        options.client_auth_methods = vec!["client_secret_basic".into(), "none".into()];
    })
    .await;
    let mut client = Client::public("native-app", vec!["com.example:/cb".into()])
        .with_grant_types(["authorization_code"]);
    client.scopes = ScopeSet::parse("openid").unwrap();
    harness.put_client(client).await;

    // bare client_id identifies the public client
    let request = Request::post("/oauth/token")
        .with_form("client_id", "native-app")
        .with_form("grant_type", "authorization_code")
        .with_form("code", "missing")
        .with_form("redirect_uri", "com.example:/cb");
    let response = harness.provider.handle(&request).await;
    // authentication succeeded; the grant fails on the bogus code
    assert_eq!(json_body(&response)["error"], "invalid_grant");

    // a Basic header from a secretless client cannot authenticate
    let request = Request::post("/oauth/token")
        .with_header(
            "authorization",
            format!("Basic {}", STANDARD.encode("native-app:whatever")),
        )
        .with_form("grant_type", "authorization_code");
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn client_secret_jwt_assertion_round_trip() {
    let harness = harness_with_post_client().await;
    let secret = b"assertion-secret-assertion-secre";
    let mut client = Client::confidential(
        "jwt-app",
        std::str::from_utf8(secret).unwrap(),
        vec![],
    )
    .with_grant_types(["client_credentials"])
    .with_scopes(ScopeSet::parse("api:read").unwrap());
    client.token_endpoint_auth_method = "client_secret_jwt".into();
    client.token_endpoint_auth_signing_alg = Some("HS256".into());
    harness.put_client(client).await;

    let ring = KeyRing::new().with_secret("c", "HS256", secret).unwrap();
    let assertion = jwt::sign(
        ring.default_key().unwrap(),
        &json!({
            "iss": "jwt-app",
            "sub": "jwt-app",
            "aud": "https://id.example.com/oauth/token",
            "exp": (chrono::Utc::now() + chrono::Duration::minutes(5)).timestamp(),
            "jti": "jti-integration-1",
        }),
    )
    .unwrap();

    let request = Request::post("/oauth/token")
        .with_form(
            "client_assertion_type",
            "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
        )
        .with_form("client_assertion", &assertion)
        .with_form("grant_type", "client_credentials");
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 200);

    // replaying the same jti fails
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 401);
    assert_eq!(json_body(&response)["error"], "invalid_client");
}

#[tokio::test]
async fn unknown_and_method_mismatched_clients_fail_uniformly() {
    let harness = harness().await;
    for auth_header in [
        basic_auth("ghost", "whatever"),
        basic_auth("", ""),
        "Basic not-base64!".to_string(),
    ] {
        let request = Request::post("/oauth/token")
            .with_header("authorization", auth_header.clone())
            .with_form("grant_type", "client_credentials");
        let response = harness.provider.handle(&request).await;
        assert_eq!(response.status, 401, "header {auth_header:?}");
        assert_eq!(json_body(&response)["error"], "invalid_client");
    }
}
