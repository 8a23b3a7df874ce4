//! Shared fixtures for the integration suites.
//!
//! `Harness` assembles a provider on the in-memory stores with one
//! confidential client (`web-app`), one user (`alice`), and an HS256
//! issuer key, then drives the browser dance (authorize → login →
//! consent → code) through the public API exactly as an adapter would.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use oxidc_server::config::{InteractionUrls, ProviderOptions};
use oxidc_server::core::ScopeSet;
use oxidc_server::core::http::{Body, Request, Response};
use oxidc_server::jose::KeyRing;
use oxidc_server::stores::memory::{self, MemoryUserService};
use oxidc_server::{Client, Provider};
use secrecy::SecretString;

pub const ISSUER: &str = "https://id.example.com";
pub const CLIENT_ID: &str = "web-app";
pub const CLIENT_SECRET: &str = "correct-horse-battery-staple";
pub const REDIRECT_URI: &str = "https://rp.example.com/cb";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
pub const HS_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

pub struct Harness {
    pub provider: Provider,
    pub users: Arc<MemoryUserService>,
}

pub fn default_options() -> ProviderOptions {
    let mut options = ProviderOptions::new(
        ISSUER,
        InteractionUrls::rooted_at("https://id.example.com/ui"),
        SecretString::new("integration-secret-key".to_string()),
    );
    options.scopes = ScopeSet::parse("openid profile email api:read").unwrap();
    options.grant_types = vec![
        "authorization_code".into(),
        "refresh_token".into(),
        "client_credentials".into(),
        "password".into(),
    ];
    options.id_token_signature_algorithms = vec!["HS256".into()];
    options
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

pub async fn harness_with(tweak: impl FnOnce(&mut ProviderOptions)) -> Harness {
    let mut options = default_options();
    tweak(&mut options);

    let users = Arc::new(MemoryUserService::new());
    let mut claims = serde_json::Map::new();
    claims.insert("name".into(), json!("Alice Liddell"));
    claims.insert("email".into(), json!("alice@example.com"));
    users.add_user("user-1", Some("alice"), Some("wonderland"), claims);
    let stores = memory::stores_with_users(users.clone());

    let keys = KeyRing::new().with_secret("it-hs", "HS256", HS_SECRET).unwrap();
    let provider = Provider::with_stores(options, stores, keys).unwrap();

    let mut client = Client::confidential(
        CLIENT_ID,
        CLIENT_SECRET,
        vec![REDIRECT_URI.to_string()],
    )
    .with_scopes(ScopeSet::parse("openid profile email").unwrap());
    client.id_token_signed_response_alg = Some("HS256".into());
    provider.engine().stores.clients.put(client).await.unwrap();

    Harness { provider, users }
}

impl Harness {
    pub async fn put_client(&self, client: Client) {
        self.provider.engine().stores.clients.put(client).await.unwrap();
    }

    /// The standard code + PKCE authorize request.
    pub fn authorize_request(&self) -> Request {
        Request::get("/oauth/authorize")
            .with_query("response_type", "code")
            .with_query("client_id", CLIENT_ID)
            .with_query("redirect_uri", REDIRECT_URI)
            .with_query("scope", "openid")
            .with_query("state", "s-123")
            .with_query("code_challenge", CHALLENGE)
            .with_query("code_challenge_method", "S256")
    }

    /// Run the full browser dance for `request`, returning the final
    /// authorize response and the browser cookie jar.
    pub async fn browser_authorize(&self, request: Request) -> (Response, HashMap<String, String>) {
        let mut cookies: HashMap<String, String> = request.cookies.clone();
        let mut current = request.clone();
        for _ in 0..6 {
            current.cookies = cookies.clone();
            let response = self.provider.handle(&current).await;
            for cookie in &response.cookies {
                if cookie.max_age == Some(0) {
                    cookies.remove(&cookie.name);
                } else {
                    cookies.insert(cookie.name.clone(), cookie.value.clone());
                }
            }
            let Some(location) = response.location().map(ToString::to_string) else {
                return (response, cookies);
            };

            if let Some(challenge) = query_param(&location, "login_challenge") {
                if location.contains("/ui/login") {
                    let decision = Request::post("/oauth/interaction/login")
                        .with_form("login_challenge", &challenge)
                        .with_form("action", "accept")
                        .with_form("user_id", "user-1")
                        .with_form("amr", "pwd");
                    let decided = self.provider.handle(&decision).await;
                    assert_eq!(decided.status, 200, "login decision failed");
                    continue;
                }
                panic!("unexpected login_challenge redirect: {location}");
            }
            if let Some(challenge) = query_param(&location, "consent_challenge") {
                let decision = Request::post("/oauth/interaction/consent")
                    .with_form("consent_challenge", &challenge)
                    .with_form("action", "accept");
                let decided = self.provider.handle(&decision).await;
                assert_eq!(decided.status, 200, "consent decision failed");
                continue;
            }
            // A redirect without a challenge is the terminal response.
            return (response, cookies);
        }
        panic!("browser dance did not terminate");
    }

    /// Complete the dance and return the authorization code plus the
    /// cookie jar (with the live session).
    pub async fn obtain_code(&self) -> (String, HashMap<String, String>) {
        let (response, cookies) = self.browser_authorize(self.authorize_request()).await;
        let location = response.location().expect("expected a redirect").to_string();
        assert!(
            location.starts_with(REDIRECT_URI),
            "expected redirect to the client, got {location}"
        );
        let code = query_param(&location, "code").expect("no code in redirect");
        (code, cookies)
    }

    /// Exchange a code at the token endpoint with Basic authentication.
    pub async fn exchange_code(&self, code: &str) -> Response {
        let request = Request::post("/oauth/token")
            .with_header("authorization", basic_auth(CLIENT_ID, CLIENT_SECRET))
            .with_form("grant_type", "authorization_code")
            .with_form("code", code)
            .with_form("redirect_uri", REDIRECT_URI)
            .with_form("code_verifier", VERIFIER);
        self.provider.handle(&request).await
    }
}

pub fn basic_auth(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{secret}")))
}

/// Extract a query (or fragment) parameter from a redirect location.
pub fn query_param(location: &str, name: &str) -> Option<String> {
    let tail = location
        .split_once('?')
        .map(|(_, tail)| tail)
        .or_else(|| location.split_once('#').map(|(_, tail)| tail))?;
    for pair in tail.split('&') {
        let (key, value) = pair.split_once('=')?;
        if key == name {
            return percent_encoding::percent_decode_str(value)
                .decode_utf8()
                .ok()
                .map(|decoded| decoded.into_owned());
        }
    }
    None
}

/// Pull the JSON body out of a response.
pub fn json_body(response: &Response) -> &serde_json::Value {
    match &response.body {
        Body::Json(value) => value,
        other => panic!("expected JSON body, got {other:?}"),
    }
}
