//! RFC 7662 introspection and RFC 7009 revocation scenarios

mod common;

use common::{CLIENT_ID, CLIENT_SECRET, basic_auth, harness, harness_with, json_body};
use oxidc_server::core::http::{Body, Request};

async fn issued_access_token(harness: &common::Harness) -> String {
    let (code, _) = harness.obtain_code().await;
    let exchange = harness.exchange_code(&code).await;
    json_body(&exchange)["access_token"].as_str().unwrap().to_string()
}

fn introspect(token: &str, auth: &str) -> Request {
    Request::post("/oauth/introspect")
        .with_header("authorization", auth.to_string())
        .with_form("token", token)
}

fn revoke(token: &str, auth: &str) -> Request {
    Request::post("/oauth/revoke")
        .with_header("authorization", auth.to_string())
        .with_form("token", token)
}

#[tokio::test]
async fn live_token_introspects_active_with_claims() {
    let harness = harness().await;
    let token = issued_access_token(&harness).await;

    let response = harness
        .provider
        .handle(&introspect(&token, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    let body = json_body(&response);
    assert_eq!(body["active"], true);
    assert_eq!(body["client_id"], CLIENT_ID);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["sub"], "user-1");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["iss"], "https://id.example.com");
    assert!(body["exp"].is_number());
}

#[tokio::test]
async fn foreign_client_revocation_is_noop_200() {
    let harness = harness().await;
    let token = issued_access_token(&harness).await;
    harness
        .put_client(oxidc_server::Client::confidential("rival", "rival-secret", vec![]))
        .await;

    // Client B revokes A's token: 400 unauthorized_client, token stays live.
    let response = harness
        .provider
        .handle(&revoke(&token, &basic_auth("rival", "rival-secret")))
        .await;
    assert_eq!(json_body(&response)["error"], "unauthorized_client");

    let check = harness
        .provider
        .handle(&introspect(&token, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    assert_eq!(json_body(&check)["active"], true, "token must remain valid");
}

#[tokio::test]
async fn revoked_token_introspects_inactive() {
    let harness = harness().await;
    let token = issued_access_token(&harness).await;

    let response = harness
        .provider
        .handle(&revoke(&token, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    assert_eq!(response.status, 200);
    assert!(matches!(response.body, Body::Empty));

    let check = harness
        .provider
        .handle(&introspect(&token, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    let body = json_body(&check);
    assert_eq!(body["active"], false);
    assert!(body.get("client_id").is_none(), "inactive responses carry no claims");
}

#[tokio::test]
async fn unknown_token_revocation_succeeds_silently() {
    let harness = harness().await;
    let response = harness
        .provider
        .handle(&revoke("never-issued", &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn expired_token_is_inactive() {
    let harness = harness().await;
    let token = issued_access_token(&harness).await;

    let stores = &harness.provider.engine().stores;
    let mut stored = stores.access_tokens.get(&token).await.unwrap().unwrap();
    stored.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    stores.access_tokens.update(stored).await.unwrap();

    let check = harness
        .provider
        .handle(&introspect(&token, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    assert_eq!(json_body(&check)["active"], false);
}

#[tokio::test]
async fn refresh_revocation_cascade_respects_the_flag() {
    // cascade on (default)
    let harness = harness().await;
    let (code, _) = harness.obtain_code().await;
    let exchange = harness.exchange_code(&code).await;
    let refresh = json_body(&exchange)["refresh_token"].as_str().unwrap().to_string();

    let response = harness
        .provider
        .handle(&revoke(&refresh, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    assert_eq!(response.status, 200);
    let stores = &harness.provider.engine().stores;
    assert!(stores.refresh_tokens.get(&refresh).await.unwrap().unwrap().revoked);

    // cascade off
    let harness = harness_with(|options| {
        options.enable_access_token_revocation = false;
        options.enable_refresh_token_introspection = true;
    })
    .await;
    let (code, _) = harness.obtain_code().await;
    let exchange = harness.exchange_code(&code).await;
    let body = json_body(&exchange);
    let refresh = body["refresh_token"].as_str().unwrap().to_string();
    let access = body["access_token"].as_str().unwrap().to_string();

    harness
        .provider
        .handle(&revoke(&refresh, &basic_auth(CLIENT_ID, CLIENT_SECRET)))
        .await;
    let stores = &harness.provider.engine().stores;
    assert!(stores.refresh_tokens.get(&refresh).await.unwrap().unwrap().revoked);
    assert!(
        !stores.access_tokens.get(&access).await.unwrap().unwrap().revoked,
        "cascade disabled: access token survives"
    );
}

#[tokio::test]
async fn unauthenticated_introspection_is_refused() {
    let harness = harness().await;
    let request = Request::post("/oauth/introspect").with_form("token", "whatever");
    let response = harness.provider.handle(&request).await;
    assert_eq!(response.status, 401);
    assert_eq!(json_body(&response)["error"], "invalid_client");
}
