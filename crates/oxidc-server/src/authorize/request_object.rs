//! Request objects (JAR)
//!
//! A signed JWT in the `request` parameter carries authorize parameters;
//! values inside the object take precedence over bare query parameters.
//! `request_uri` is not fetched and encrypted objects are not accepted -
//! the request either verifies against the client's registered algorithm
//! and keys or the authorization fails.

use serde_json::Value;

use oxidc_core::Client;
use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_jose::jwt::{self, VerificationKey, VerifyOptions};

use crate::fetch::Fetcher;

fn invalid(description: &str) -> OAuthError {
    OAuthError::invalid_request(description)
}

/// Merge a request object, when present, into the parameter list.
///
/// Returns the effective parameters: the inbound list minus
/// `request`/`request_uri`, overridden by the object's members.
pub async fn merge(
    params: Vec<(String, String)>,
    client: &Client,
    issuer: &str,
    fetcher: &Fetcher,
) -> OAuthResult<Vec<(String, String)>> {
    if params.iter().any(|(k, _)| k == "request_uri") {
        return Err(invalid("The \"request_uri\" parameter is not supported."));
    }
    let Some(object) = params
        .iter()
        .find(|(k, _)| k == "request")
        .map(|(_, v)| v.clone())
    else {
        return Ok(params);
    };

    // Five-part compact serializations are JWE; out of stack.
    if object.matches('.').count() == 4 {
        return Err(invalid("Encrypted request objects are not supported."));
    }

    let (header, _) = jwt::peek(&object)
        .map_err(|_| invalid("The request object could not be parsed."))?;
    let header_alg = format!("{:?}", header.alg);
    let alg = match &client.request_object_signing_alg {
        Some(registered) => {
            if *registered != header_alg {
                return Err(invalid(
                    "The request object is not signed with the registered algorithm.",
                ));
            }
            registered.clone()
        }
        None => header_alg,
    };

    let options = VerifyOptions {
        audiences: Vec::new(), // aud checked manually below; it is optional
        validate_exp: true,
        require_exp: false,
        leeway: 30,
    };
    let claims = if alg.starts_with("HS") {
        let secret = client
            .client_secret
            .as_deref()
            .ok_or_else(|| invalid("The client cannot use symmetric request objects."))?;
        jwt::verify(
            &object,
            &alg,
            &VerificationKey::Secret(secret.as_bytes()),
            &options,
        )
    } else {
        let jwks = fetcher.client_jwks(client).await?;
        jwt::verify(&object, &alg, &VerificationKey::Jwks(&jwks), &options)
    }
    .map_err(|_| invalid("The request object signature is invalid."))?;

    // iss names the client; aud, when present, names this server.
    if let Some(iss) = claims.get("iss").and_then(Value::as_str)
        && iss != client.client_id
    {
        return Err(invalid("The request object issuer is not the client."));
    }
    if let Some(aud) = claims.get("aud") {
        let matches = match aud {
            Value::String(aud) => aud == issuer,
            Value::Array(entries) => entries.iter().any(|a| a.as_str() == Some(issuer)),
            _ => false,
        };
        if !matches {
            return Err(invalid("The request object audience is not this server."));
        }
    }

    let object_members = claims
        .as_object()
        .ok_or_else(|| invalid("The request object payload is not a JSON object."))?;

    // client_id and response_type must agree between the outer request
    // and the object when both carry them.
    for pinned in ["client_id", "response_type"] {
        let outer = params.iter().find(|(k, _)| k == pinned).map(|(_, v)| v);
        let inner = object_members.get(pinned).and_then(Value::as_str);
        if let (Some(outer), Some(inner)) = (outer, inner)
            && outer != inner
        {
            return Err(invalid(
                "The request object conflicts with the bare request parameters.",
            ));
        }
    }

    let mut merged: Vec<(String, String)> = params
        .into_iter()
        .filter(|(k, _)| k != "request" && !object_members.contains_key(k))
        .collect();
    for (name, value) in object_members {
        if matches!(name.as_str(), "iss" | "aud" | "exp" | "nbf" | "iat" | "jti") {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => serde_json::to_string(other)
                .map_err(|_| invalid("The request object contains an unusable member."))?,
        };
        merged.push((name.clone(), rendered));
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TEST_HS_SECRET, TestProvider};
    use oxidc_jose::KeyRing;
    use serde_json::json;

    fn signed_object(claims: &Value) -> String {
        let ring = KeyRing::new()
            .with_secret("c", "HS256", TEST_HS_SECRET)
            .unwrap();
        jwt::sign(ring.default_key().unwrap(), claims).unwrap()
    }

    async fn jar_client(provider: &TestProvider) -> Client {
        let mut client = provider.client("web-app").await;
        client.client_secret = Some(String::from_utf8(TEST_HS_SECRET.to_vec()).unwrap());
        client.request_object_signing_alg = Some("HS256".into());
        provider.stores().clients.put(client.clone()).await.unwrap();
        client
    }

    fn outer() -> Vec<(String, String)> {
        vec![
            ("client_id".to_string(), "web-app".to_string()),
            ("response_type".to_string(), "code".to_string()),
            ("scope".to_string(), "openid".to_string()),
            ("request".to_string(), String::new()),
        ]
    }

    #[tokio::test]
    async fn object_members_override_bare_parameters() {
        let provider = TestProvider::with_defaults().await;
        let client = jar_client(&provider).await;
        let object = signed_object(&json!({
            "iss": "web-app",
            "aud": "https://id.example.com",
            "response_type": "code",
            "scope": "openid profile",
            "state": "from-object",
            "max_age": 600,
        }));
        let mut params = outer();
        params.last_mut().unwrap().1 = object;

        let merged = merge(params, &client, "https://id.example.com", &provider.fetcher)
            .await
            .unwrap();
        let get = |name: &str| merged.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
        assert_eq!(get("scope"), Some("openid profile"));
        assert_eq!(get("state"), Some("from-object"));
        assert_eq!(get("max_age"), Some("600"));
        assert!(get("request").is_none());
    }

    #[tokio::test]
    async fn request_uri_is_refused() {
        let provider = TestProvider::with_defaults().await;
        let client = jar_client(&provider).await;
        let params = vec![("request_uri".to_string(), "https://rp/jar".to_string())];
        let err = merge(params, &client, "https://id.example.com", &provider.fetcher)
            .await
            .unwrap_err();
        assert!(err.description.contains("request_uri"));
    }

    #[tokio::test]
    async fn wrong_signature_or_alg_is_rejected() {
        let provider = TestProvider::with_defaults().await;
        let mut client = jar_client(&provider).await;

        // wrong key
        let ring = KeyRing::new()
            .with_secret("other", "HS256", b"another-secret-another-secret-xx")
            .unwrap();
        let object = jwt::sign(ring.default_key().unwrap(), &json!({ "iss": "web-app" })).unwrap();
        let mut params = outer();
        params.last_mut().unwrap().1 = object;
        assert!(
            merge(params, &client, "https://id.example.com", &provider.fetcher)
                .await
                .is_err()
        );

        // wrong registered algorithm
        client.request_object_signing_alg = Some("HS512".into());
        let object = signed_object(&json!({ "iss": "web-app" }));
        let mut params = outer();
        params.last_mut().unwrap().1 = object;
        assert!(
            merge(params, &client, "https://id.example.com", &provider.fetcher)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn conflicting_pinned_members_are_rejected() {
        let provider = TestProvider::with_defaults().await;
        let client = jar_client(&provider).await;
        let object = signed_object(&json!({
            "iss": "web-app",
            "response_type": "token",
        }));
        let mut params = outer();
        params.last_mut().unwrap().1 = object;
        let err = merge(params, &client, "https://id.example.com", &provider.fetcher)
            .await
            .unwrap_err();
        assert!(err.description.contains("conflicts"));
    }

    #[tokio::test]
    async fn requests_without_object_pass_through() {
        let provider = TestProvider::with_defaults().await;
        let client = provider.client("web-app").await;
        let params = vec![("client_id".to_string(), "web-app".to_string())];
        let merged = merge(
            params.clone(),
            &client,
            "https://id.example.com",
            &provider.fetcher,
        )
        .await
        .unwrap();
        assert_eq!(merged, params);
    }
}
