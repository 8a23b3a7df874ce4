//! The token endpoint
//!
//! Authenticates the client, dispatches on `grant_type`, and shapes the
//! JSON response. Token responses always carry `Cache-Control: no-store`
//! and `Pragma: no-cache`.

use tracing::{info, warn};

use oxidc_core::error::OAuthError;
use oxidc_core::http::{Request, Response};

use crate::client_auth::authenticate_client;
use crate::container::{Engine, RequestScope};

/// Handle `POST /oauth/token`.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let authn = engine.authn_context(&engine.options.paths.token, scope.now);
    let client = match authenticate_client(request, &engine.registries, &authn).await {
        Ok(client) => client,
        Err(err) => {
            warn!(error = err.code.as_str(), "token endpoint client authentication failed");
            return Response::from_error(&err);
        }
    };

    let grant_type = match request.form_params().require("grant_type") {
        Ok(value) => value,
        Err(err) => return Response::from_error(&err),
    };
    let Some(handler) = engine.registries.grant(grant_type) else {
        return Response::from_error(&OAuthError::unsupported_grant_type(format!(
            "The grant type \"{grant_type}\" is not supported."
        )));
    };

    match handler
        .grant(request, &client, &engine.grant_context(scope.now))
        .await
    {
        Ok(tokens) => {
            info!(client_id = %client.client_id, grant_type, "token issued");
            Response::json(200, tokens.to_json()).no_store()
        }
        Err(err) => {
            warn!(
                client_id = %client.client_id,
                grant_type,
                error = err.code.as_str(),
                "token request failed"
            );
            Response::from_error(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use oxidc_core::http::Body;
    use oxidc_core::pkce::S256;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    fn basic_auth() -> String {
        format!(
            "Basic {}",
            STANDARD.encode("web-app:correct-horse-battery-staple")
        )
    }

    #[tokio::test]
    async fn full_code_exchange_over_the_endpoint() {
        let provider = TestProvider::with_defaults().await;
        let client = provider.client("web-app").await;
        let code = provider
            .seed_code(&client, "user-1", Some(S256::derive(VERIFIER)), Some("S256"))
            .await;
        let engine = provider.into_engine();

        let request = Request::post("/oauth/token")
            .with_header("authorization", &basic_auth())
            .with_form("grant_type", "authorization_code")
            .with_form("code", &code.code)
            .with_form("redirect_uri", "https://rp.example.com/cb")
            .with_form("code_verifier", VERIFIER);
        let response = handle(&engine, &RequestScope::new(), &request).await;

        assert_eq!(response.status, 200);
        assert!(
            response
                .headers
                .iter()
                .any(|(name, value)| name == "Cache-Control" && value == "no-store")
        );
        assert!(
            response
                .headers
                .iter()
                .any(|(name, value)| name == "Pragma" && value == "no-cache")
        );
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 3600);
        assert_eq!(body["scope"], "openid");
        assert!(body["id_token"].is_string());
    }

    #[tokio::test]
    async fn wrong_basic_secret_is_401_invalid_client() {
        let provider = TestProvider::with_defaults().await;
        let engine = provider.into_engine();
        let request = Request::post("/oauth/token")
            .with_header(
                "authorization",
                format!("Basic {}", STANDARD.encode("web-app:wrong")),
            )
            .with_form("grant_type", "client_credentials");
        let response = handle(&engine, &RequestScope::new(), &request).await;
        assert_eq!(response.status, 401);
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "invalid_client");
        assert!(
            response
                .headers
                .iter()
                .any(|(name, value)| name == "WWW-Authenticate" && value.starts_with("Basic"))
        );
    }

    #[tokio::test]
    async fn unsupported_grant_type() {
        let provider = TestProvider::with_defaults().await;
        let engine = provider.into_engine();
        let request = Request::post("/oauth/token")
            .with_header("authorization", &basic_auth())
            .with_form("grant_type", "urn:ietf:params:oauth:grant-type:saml2-bearer");
        let response = handle(&engine, &RequestScope::new(), &request).await;
        assert_eq!(response.status, 400);
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "unsupported_grant_type");
    }
}
