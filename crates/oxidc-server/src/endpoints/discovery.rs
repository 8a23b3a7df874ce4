//! Server metadata (OIDC Discovery 1.0, RFC 8414)
//!
//! The document is derived from the live configuration and registries,
//! so whatever it advertises is exactly what the closed allowlists
//! accept.

use serde_json::{Value, json};

use oxidc_core::http::Response;

use crate::container::Engine;

/// Build the `openid-configuration` document.
#[must_use]
pub fn document(engine: &Engine) -> Value {
    let options = &engine.options;
    let registries = &engine.registries;
    let url = |path: &str| options.endpoint_url(path);

    let mut doc = json!({
        "issuer": options.issuer,
        "jwks_uri": url(&options.paths.jwks),
        "scopes_supported": options.scopes.iter().collect::<Vec<_>>(),
        "response_types_supported": registries.response_type_names(),
        "response_modes_supported": registries.response_mode_names(),
        "grant_types_supported": registries.grant_type_names(),
        "token_endpoint_auth_methods_supported": registries.client_auth_method_names(),
        "code_challenge_methods_supported": registries.pkce_method_names(),
        "id_token_signing_alg_values_supported": options.id_token_signature_algorithms,
        "subject_types_supported": ["public", "pairwise"],
        "display_values_supported": registries.displays(),
        "prompt_values_supported": registries.prompts(),
        "claims_parameter_supported": true,
        "request_parameter_supported": true,
        "request_uri_parameter_supported": false,
        "end_session_endpoint": url(&options.paths.logout),
        "userinfo_endpoint": url(&options.paths.userinfo),
    });

    if options.authorize_endpoint_enabled() {
        doc["authorization_endpoint"] = json!(url(&options.paths.authorize));
    }
    if options.token_endpoint_enabled() {
        doc["token_endpoint"] = json!(url(&options.paths.token));
    }
    if options.enable_revocation_endpoint {
        doc["revocation_endpoint"] = json!(url(&options.paths.revocation));
    }
    if options.enable_introspection_endpoint {
        doc["introspection_endpoint"] = json!(url(&options.paths.introspection));
    }
    if options.enable_device_authorization_grant {
        doc["device_authorization_endpoint"] = json!(url(&options.paths.device_authorization));
    }
    if options.enable_registration_endpoint {
        doc["registration_endpoint"] = json!(url(&options.paths.registration));
    }
    if !registries.acr_values().is_empty() {
        doc["acr_values_supported"] = json!(registries.acr_values());
    }
    doc
}

/// Handle `GET /.well-known/openid-configuration`.
#[must_use]
pub fn handle(engine: &Engine) -> Response {
    Response::json(200, document(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn document_reflects_configuration() {
        let mut options = TestProvider::default_options();
        options.enable_device_authorization_grant = true;
        options.enable_registration_endpoint = true;
        options.acr_values = vec!["urn:example:gold".into()];
        let engine = TestProvider::with_options(options).await.into_engine();

        let doc = document(&engine);
        assert_eq!(doc["issuer"], "https://id.example.com");
        assert_eq!(
            doc["authorization_endpoint"],
            "https://id.example.com/oauth/authorize"
        );
        assert_eq!(doc["token_endpoint"], "https://id.example.com/oauth/token");
        assert_eq!(
            doc["device_authorization_endpoint"],
            "https://id.example.com/oauth/device_authorization"
        );
        assert_eq!(
            doc["registration_endpoint"],
            "https://id.example.com/oauth/register"
        );
        assert!(
            doc["grant_types_supported"]
                .as_array()
                .unwrap()
                .contains(&json!("urn:ietf:params:oauth:grant-type:device_code"))
        );
        assert_eq!(doc["code_challenge_methods_supported"], json!(["S256"]));
        assert_eq!(doc["request_uri_parameter_supported"], false);
        assert_eq!(doc["acr_values_supported"], json!(["urn:example:gold"]));
    }

    #[tokio::test]
    async fn disabled_endpoints_are_absent() {
        let mut options = TestProvider::default_options();
        options.enable_revocation_endpoint = false;
        options.enable_introspection_endpoint = false;
        let engine = TestProvider::with_options(options).await.into_engine();

        let doc = document(&engine);
        assert!(doc.get("revocation_endpoint").is_none());
        assert!(doc.get("introspection_endpoint").is_none());
        assert!(doc.get("device_authorization_endpoint").is_none());
    }
}
