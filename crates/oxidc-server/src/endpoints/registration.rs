//! Dynamic client registration (RFC 7591) and management (RFC 7592)
//!
//! `POST` registers a client after validating the metadata against the
//! same allowlists the registries were built from. The response carries
//! a registration access token authorizing later `GET`/`PUT`/`DELETE` on
//! the per-client management resource.
//!
//! Registration errors use the RFC 7591 codes (`invalid_redirect_uri`,
//! `invalid_client_metadata`), which are scoped to this endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use oxidc_core::error::OAuthError;
use oxidc_core::http::{Method, Request, Response};
use oxidc_core::pkce::constant_time_eq;
use oxidc_core::{ApplicationType, Client, ScopeSet, SubjectType};

use crate::container::{Engine, RequestScope};
use crate::registry::GRANT_AUTHORIZATION_CODE;
use crate::tokens::TokenService;

/// Client metadata document (RFC 7591 Section 2), request and response
/// shape alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Redirect URIs (REQUIRED for the authorization code grant)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,
    /// Response types the client will use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
    /// Grant types the client will use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    /// Token endpoint authentication method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    /// Pinned client assertion algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_signing_alg: Option<String>,
    /// Application type (web, native)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_type: Option<ApplicationType>,
    /// Human-readable client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Space-delimited scope allowlist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Subject identifier type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<SubjectType>,
    /// Sector identifier document (pairwise clients)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_identifier_uri: Option<String>,
    /// ID token signing algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<String>,
    /// Signed userinfo algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<String>,
    /// Request object algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_signing_alg: Option<String>,
    /// Inline JWK set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Value>,
    /// JWK set URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// Post-logout redirect allowlist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uris: Option<Vec<String>>,
}

impl ClientMetadata {
    /// Echo form of a stored client.
    fn from_client(client: &Client) -> Self {
        Self {
            redirect_uris: Some(client.redirect_uris.clone()),
            response_types: Some(client.response_types.clone()),
            grant_types: Some(client.grant_types.clone()),
            token_endpoint_auth_method: Some(client.token_endpoint_auth_method.clone()),
            token_endpoint_auth_signing_alg: client.token_endpoint_auth_signing_alg.clone(),
            application_type: Some(client.application_type),
            client_name: client.client_name.clone(),
            scope: Some(client.scopes.to_string()),
            subject_type: Some(client.subject_type),
            sector_identifier_uri: client.sector_identifier_uri.clone(),
            id_token_signed_response_alg: client.id_token_signed_response_alg.clone(),
            userinfo_signed_response_alg: client.userinfo_signed_response_alg.clone(),
            request_object_signing_alg: client.request_object_signing_alg.clone(),
            jwks: client.jwks.clone(),
            jwks_uri: client.jwks_uri.clone(),
            post_logout_redirect_uris: Some(client.post_logout_redirect_uris.clone()),
        }
    }
}

/// RFC 7591 registration error body.
fn metadata_error(code: &str, description: &str) -> Response {
    Response::json(
        400,
        json!({ "error": code, "error_description": description }),
    )
    .no_store()
}

/// Handle `POST` to the registration endpoint.
pub async fn register(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let Some(body) = &request.json_body else {
        return metadata_error("invalid_client_metadata", "The request body is not JSON.");
    };
    let metadata: ClientMetadata = match serde_json::from_value(body.clone()) {
        Ok(metadata) => metadata,
        Err(e) => {
            return metadata_error("invalid_client_metadata", &format!("Unusable metadata: {e}"));
        }
    };

    let mut client = match validate(engine, &metadata, None).await {
        Ok(client) => client,
        Err(response) => return response,
    };

    client.client_id = uuid::Uuid::new_v4().to_string();
    if secret_bearing_method(&client.token_endpoint_auth_method) {
        client.client_secret = Some(TokenService::opaque_token());
    }
    client.registration_access_token = Some(TokenService::opaque_token());

    if let Err(err) = engine.stores.clients.put(client.clone()).await {
        return Response::from_error(&OAuthError::from(err));
    }
    info!(client_id = %client.client_id, "client registered");

    Response::json(201, registration_body(engine, &client, scope)).no_store()
}

fn registration_body(engine: &Engine, client: &Client, scope: &RequestScope) -> Value {
    let mut body = serde_json::to_value(ClientMetadata::from_client(client)).unwrap_or_default();
    body["client_id"] = json!(client.client_id);
    if let Some(secret) = &client.client_secret {
        body["client_secret"] = json!(secret);
        body["client_secret_expires_at"] = json!(0);
    }
    body["client_id_issued_at"] = json!(scope.now.timestamp());
    if let Some(token) = &client.registration_access_token {
        body["registration_access_token"] = json!(token);
    }
    body["registration_client_uri"] = json!(format!(
        "{}/{}",
        engine.options.endpoint_url(&engine.options.paths.registration),
        client.client_id
    ));
    body
}

fn secret_bearing_method(method: &str) -> bool {
    matches!(
        method,
        "client_secret_basic" | "client_secret_post" | "client_secret_jwt"
    )
}

/// Validate a metadata document into a client record. `existing`
/// preserves identity on updates.
async fn validate(
    engine: &Engine,
    metadata: &ClientMetadata,
    existing: Option<&Client>,
) -> Result<Client, Response> {
    let registries = &engine.registries;

    let grant_types = metadata
        .grant_types
        .clone()
        .unwrap_or_else(|| vec![GRANT_AUTHORIZATION_CODE.to_string()]);
    for grant in &grant_types {
        if registries.grant(grant).is_none() {
            return Err(metadata_error(
                "invalid_client_metadata",
                &format!("The grant type \"{grant}\" is not supported."),
            ));
        }
    }

    let response_types = metadata
        .response_types
        .clone()
        .unwrap_or_else(|| vec!["code".to_string()]);
    for response_type in &response_types {
        if registries.response_type(response_type).is_none() {
            return Err(metadata_error(
                "invalid_client_metadata",
                &format!("The response type \"{response_type}\" is not supported."),
            ));
        }
    }

    let redirect_uris = metadata.redirect_uris.clone().unwrap_or_default();
    if grant_types.iter().any(|g| g == GRANT_AUTHORIZATION_CODE) && redirect_uris.is_empty() {
        return Err(metadata_error(
            "invalid_redirect_uri",
            "redirect_uris is required for the authorization code grant.",
        ));
    }
    let application_type = metadata.application_type.unwrap_or_default();
    for uri in &redirect_uris {
        let Ok(parsed) = Url::parse(uri) else {
            return Err(metadata_error(
                "invalid_redirect_uri",
                &format!("\"{uri}\" is not a valid URI."),
            ));
        };
        if parsed.fragment().is_some() {
            return Err(metadata_error(
                "invalid_redirect_uri",
                "Redirect URIs must not contain a fragment.",
            ));
        }
        if application_type == ApplicationType::Web
            && parsed.scheme() != "https"
            && parsed.host_str() != Some("localhost")
        {
            return Err(metadata_error(
                "invalid_redirect_uri",
                "Web clients must use https redirect URIs.",
            ));
        }
    }

    let auth_method = metadata
        .token_endpoint_auth_method
        .clone()
        .unwrap_or_else(|| "client_secret_basic".to_string());
    if registries.client_auth_method(&auth_method).is_none() {
        return Err(metadata_error(
            "invalid_client_metadata",
            &format!("The token endpoint auth method \"{auth_method}\" is not enabled."),
        ));
    }

    let scopes = match &metadata.scope {
        Some(raw) => match ScopeSet::parse(raw) {
            Ok(scopes) => scopes,
            Err(err) => {
                return Err(metadata_error("invalid_client_metadata", &err.description));
            }
        },
        None => engine.options.scopes.clone(),
    };
    if !engine.options.scopes.contains_all(&scopes) {
        return Err(metadata_error(
            "invalid_client_metadata",
            "The requested scopes exceed what this server supports.",
        ));
    }

    if let Some(alg) = &metadata.id_token_signed_response_alg
        && !engine
            .options
            .id_token_signature_algorithms
            .iter()
            .any(|a| a == alg)
    {
        // `none` lands here too unless the server explicitly offers it.
        return Err(metadata_error(
            "invalid_client_metadata",
            &format!("The id_token signing algorithm \"{alg}\" is not supported."),
        ));
    }

    let subject_type = metadata.subject_type.unwrap_or_default();
    if let Some(uri) = &metadata.sector_identifier_uri {
        let Ok(parsed) = Url::parse(uri) else {
            return Err(metadata_error(
                "invalid_client_metadata",
                "sector_identifier_uri is not a valid URI.",
            ));
        };
        if parsed.scheme() != "https" {
            return Err(metadata_error(
                "invalid_client_metadata",
                "sector_identifier_uri must use https.",
            ));
        }
    }

    let mut client = Client {
        client_id: existing.map(|c| c.client_id.clone()).unwrap_or_default(),
        client_secret: existing.and_then(|c| c.client_secret.clone()),
        secret_expires_at: None,
        redirect_uris,
        token_endpoint_auth_method: auth_method,
        token_endpoint_auth_signing_alg: metadata.token_endpoint_auth_signing_alg.clone(),
        grant_types,
        response_types,
        scopes,
        subject_type,
        sector_identifier_uri: metadata.sector_identifier_uri.clone(),
        pairwise_salt: existing.and_then(|c| c.pairwise_salt.clone()),
        id_token_signed_response_alg: metadata.id_token_signed_response_alg.clone(),
        userinfo_signed_response_alg: metadata.userinfo_signed_response_alg.clone(),
        request_object_signing_alg: metadata.request_object_signing_alg.clone(),
        jwks: metadata.jwks.clone(),
        jwks_uri: metadata.jwks_uri.clone(),
        application_type,
        require_pkce: application_type == ApplicationType::Native,
        require_consent: true,
        post_logout_redirect_uris: metadata.post_logout_redirect_uris.clone().unwrap_or_default(),
        acr_values: Vec::new(),
        client_name: metadata.client_name.clone(),
        registration_access_token: existing.and_then(|c| c.registration_access_token.clone()),
        tls_client_auth_subject_dn: existing.and_then(|c| c.tls_client_auth_subject_dn.clone()),
    };
    if subject_type == SubjectType::Pairwise && client.pairwise_salt.is_none() {
        client.pairwise_salt = Some(TokenService::opaque_token());
    }

    // A pairwise sector document must list every registered redirect URI.
    if subject_type == SubjectType::Pairwise
        && client.sector_identifier_uri.is_some()
        && let Err(err) = engine.tokens.validate_sector_document(&client).await
    {
        return Err(metadata_error("invalid_client_metadata", &err.description));
    }

    Ok(client)
}

/// Handle `GET`/`PUT`/`DELETE` on the per-client management resource.
pub async fn manage(
    engine: &Engine,
    scope: &RequestScope,
    request: &Request,
    client_id: &str,
) -> Response {
    let Ok(Some(client)) = engine.stores.clients.get(client_id).await else {
        return Response::from_error(
            &OAuthError::invalid_token("Unknown client.").with_www_authenticate("Bearer"),
        );
    };
    let authorized = request.bearer_token().is_some_and(|bearer| {
        client
            .registration_access_token
            .as_deref()
            .is_some_and(|token| constant_time_eq(token.as_bytes(), bearer.as_bytes()))
    });
    if !authorized {
        return Response::from_error(
            &OAuthError::invalid_token("The registration access token is invalid.")
                .with_www_authenticate("Bearer"),
        );
    }

    match request.method {
        Method::Get => Response::json(200, registration_body(engine, &client, scope)).no_store(),
        Method::Put => {
            let Some(body) = &request.json_body else {
                return metadata_error("invalid_client_metadata", "The request body is not JSON.");
            };
            let metadata: ClientMetadata = match serde_json::from_value(body.clone()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    return metadata_error(
                        "invalid_client_metadata",
                        &format!("Unusable metadata: {e}"),
                    );
                }
            };
            let updated = match validate(engine, &metadata, Some(&client)).await {
                Ok(updated) => updated,
                Err(response) => return response,
            };
            if let Err(err) = engine.stores.clients.put(updated.clone()).await {
                return Response::from_error(&OAuthError::from(err));
            }
            info!(client_id = %updated.client_id, "client metadata updated");
            Response::json(200, registration_body(engine, &updated, scope)).no_store()
        }
        Method::Delete => {
            if let Err(err) = engine.stores.clients.delete(client_id).await {
                return Response::from_error(&OAuthError::from(err));
            }
            info!(client_id, "client deregistered");
            Response::empty(204).no_store()
        }
        Method::Post => Response::from_error(&OAuthError::invalid_request(
            "The management resource accepts GET, PUT, and DELETE.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use oxidc_core::http::Body;

    async fn engine() -> Engine {
        let mut options = TestProvider::default_options();
        options.enable_registration_endpoint = true;
        options.client_auth_methods = vec!["client_secret_basic".into(), "none".into()];
        TestProvider::with_options(options).await.into_engine()
    }

    fn valid_metadata() -> Value {
        json!({
            "redirect_uris": ["https://newrp.example.com/cb"],
            "client_name": "Fresh RP",
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "scope": "openid profile",
            "token_endpoint_auth_method": "client_secret_basic",
        })
    }

    #[tokio::test]
    async fn registers_confidential_client() {
        let engine = engine().await;
        let request = Request::post("/oauth/register").with_json(valid_metadata());
        let response = register(&engine, &RequestScope::new(), &request).await;
        assert_eq!(response.status, 201);
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        let client_id = body["client_id"].as_str().unwrap();
        assert!(body["client_secret"].is_string());
        assert_eq!(body["client_secret_expires_at"], 0);
        assert!(body["registration_access_token"].is_string());
        assert!(
            body["registration_client_uri"]
                .as_str()
                .unwrap()
                .ends_with(client_id)
        );

        let stored = engine.stores.clients.get(client_id).await.unwrap().unwrap();
        assert_eq!(stored.scopes.to_string(), "openid profile");
        assert!(!stored.is_public());
    }

    #[tokio::test]
    async fn public_clients_get_no_secret_and_require_pkce() {
        let engine = engine().await;
        let mut metadata = valid_metadata();
        metadata["token_endpoint_auth_method"] = json!("none");
        metadata["application_type"] = json!("native");
        metadata["redirect_uris"] = json!(["com.example.app:/cb"]);
        let request = Request::post("/oauth/register").with_json(metadata);
        let response = register(&engine, &RequestScope::new(), &request).await;
        assert_eq!(response.status, 201);
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert!(body.get("client_secret").is_none());

        let client_id = body["client_id"].as_str().unwrap();
        let stored = engine.stores.clients.get(client_id).await.unwrap().unwrap();
        assert!(stored.require_pkce);
    }

    #[tokio::test]
    async fn rejects_bad_redirects_and_unknown_names() {
        let engine = engine().await;

        let mut metadata = valid_metadata();
        metadata["redirect_uris"] = json!(["http://insecure.example.com/cb"]);
        let response = register(
            &engine,
            &RequestScope::new(),
            &Request::post("/oauth/register").with_json(metadata),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "invalid_redirect_uri");

        let mut metadata = valid_metadata();
        metadata["grant_types"] = json!(["implicit_legacy"]);
        let response = register(
            &engine,
            &RequestScope::new(),
            &Request::post("/oauth/register").with_json(metadata),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "invalid_client_metadata");

        let mut metadata = valid_metadata();
        metadata["scope"] = json!("openid payments");
        let response = register(
            &engine,
            &RequestScope::new(),
            &Request::post("/oauth/register").with_json(metadata),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "invalid_client_metadata");
    }

    #[tokio::test]
    async fn id_token_alg_none_requires_server_allowlist() {
        let engine = engine().await;
        let mut metadata = valid_metadata();
        metadata["id_token_signed_response_alg"] = json!("none");
        let response = register(
            &engine,
            &RequestScope::new(),
            &Request::post("/oauth/register").with_json(metadata),
        )
        .await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "invalid_client_metadata");
    }

    #[tokio::test]
    async fn management_round_trip() {
        let engine = engine().await;
        let request = Request::post("/oauth/register").with_json(valid_metadata());
        let response = register(&engine, &RequestScope::new(), &request).await;
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        let client_id = body["client_id"].as_str().unwrap().to_string();
        let access = body["registration_access_token"].as_str().unwrap().to_string();

        // read back
        let read = Request::get("/oauth/register")
            .with_header("authorization", format!("Bearer {access}"));
        let response = manage(&engine, &RequestScope::new(), &read, &client_id).await;
        assert_eq!(response.status, 200);

        // wrong bearer
        let read = Request::get("/oauth/register")
            .with_header("authorization", "Bearer wrong-token");
        let response = manage(&engine, &RequestScope::new(), &read, &client_id).await;
        assert_eq!(response.status, 401);

        // update
        let mut metadata = valid_metadata();
        metadata["client_name"] = json!("Renamed RP");
        let update = Request::new(Method::Put, "/oauth/register")
            .with_header("authorization", format!("Bearer {access}"))
            .with_json(metadata);
        let response = manage(&engine, &RequestScope::new(), &update, &client_id).await;
        assert_eq!(response.status, 200);
        let stored = engine.stores.clients.get(&client_id).await.unwrap().unwrap();
        assert_eq!(stored.client_name.as_deref(), Some("Renamed RP"));

        // delete
        let delete = Request::new(Method::Delete, "/oauth/register")
            .with_header("authorization", format!("Bearer {access}"));
        let response = manage(&engine, &RequestScope::new(), &delete, &client_id).await;
        assert_eq!(response.status, 204);
        assert!(engine.stores.clients.get(&client_id).await.unwrap().is_none());
    }
}
