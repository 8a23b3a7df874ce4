//! End-to-end authorization code + PKCE flow
//!
//! Covers the canonical happy path - authorize with an interactive login
//! and consent, redeem the code with `client_secret_basic` and a PKCE
//! verifier - plus the single-use and expiry properties of codes.

mod common;

use common::{
    CLIENT_ID, REDIRECT_URI, VERIFIER, basic_auth, harness, json_body, query_param,
};
use oxidc_server::core::http::Request;

#[tokio::test]
async fn code_flow_with_pkce_issues_tokens() {
    let harness = harness().await;
    let (code, _) = harness.obtain_code().await;

    let response = harness.exchange_code(&code).await;
    assert_eq!(response.status, 200);
    let body = json_body(&response);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], "openid");
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string(), "client has refresh_token grant");

    let id_token = body["id_token"].as_str().expect("openid scope implies an ID token");
    let (_, claims) = oxidc_server::jose::jwt::peek(id_token).unwrap();
    assert_eq!(claims["iss"], "https://id.example.com");
    assert_eq!(claims["aud"], CLIENT_ID);
    assert_eq!(claims["sub"], "user-1");
    assert!(claims["at_hash"].is_string());
    assert!(claims["auth_time"].is_number());
}

#[tokio::test]
async fn returning_session_skips_interaction() {
    let harness = harness().await;
    let (_, cookies) = harness.obtain_code().await;

    // Second authorization with the session cookie: no login, no consent.
    let mut request = harness.authorize_request();
    request.cookies = cookies;
    let response = harness.provider.handle(&request).await;
    let location = response.location().expect("expected a redirect").to_string();
    assert!(
        location.starts_with(REDIRECT_URI),
        "expected immediate completion, got {location}"
    );
    assert!(query_param(&location, "code").is_some());
    assert_eq!(query_param(&location, "state").as_deref(), Some("s-123"));
}

#[tokio::test]
async fn code_is_single_use_and_reuse_burns_tokens() {
    let harness = harness().await;
    let (code, _) = harness.obtain_code().await;

    let first = harness.exchange_code(&code).await;
    assert_eq!(first.status, 200);
    let access_token = json_body(&first)["access_token"].as_str().unwrap().to_string();
    let refresh_token = json_body(&first)["refresh_token"].as_str().unwrap().to_string();

    let second = harness.exchange_code(&code).await;
    assert_eq!(second.status, 400);
    assert_eq!(json_body(&second)["error"], "invalid_grant");

    let stores = &harness.provider.engine().stores;
    assert!(stores.access_tokens.get(&access_token).await.unwrap().unwrap().revoked);
    assert!(stores.refresh_tokens.get(&refresh_token).await.unwrap().unwrap().revoked);
}

#[tokio::test]
async fn wrong_verifier_is_rejected() {
    let harness = harness().await;
    let (code, _) = harness.obtain_code().await;

    let request = Request::post("/oauth/token")
        .with_header("authorization", basic_auth(CLIENT_ID, common::CLIENT_SECRET))
        .with_form("grant_type", "authorization_code")
        .with_form("code", &code)
        .with_form("redirect_uri", REDIRECT_URI)
        .with_form("code_verifier", &"a".repeat(50));
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 400);
    assert_eq!(json_body(&response)["error"], "invalid_grant");
}

#[tokio::test]
async fn expired_code_is_invalid_grant_and_removed() {
    let harness = harness().await;
    let (code, _) = harness.obtain_code().await;

    // Age the code past its lifetime.
    let stores = &harness.provider.engine().stores;
    let mut stored = stores.codes.get(&code).await.unwrap().unwrap();
    stored.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    stores.codes.update(stored).await.unwrap();

    let response = harness.exchange_code(&code).await;
    assert_eq!(json_body(&response)["error"], "invalid_grant");
    assert!(stores.codes.get(&code).await.unwrap().is_none());
}

#[tokio::test]
async fn redirect_uri_must_match_byte_for_byte() {
    let harness = harness().await;
    let (code, _) = harness.obtain_code().await;

    let request = Request::post("/oauth/token")
        .with_header("authorization", basic_auth(CLIENT_ID, common::CLIENT_SECRET))
        .with_form("grant_type", "authorization_code")
        .with_form("code", &code)
        .with_form("redirect_uri", "https://rp.example.com/cb/")
        .with_form("code_verifier", VERIFIER);
    let response = harness.provider.handle(&request).await;
    assert_eq!(json_body(&response)["error"], "invalid_grant");
}
