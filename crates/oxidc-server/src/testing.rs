//! Shared fixtures for unit tests.
//!
//! A `TestProvider` wires memory stores, an HS256 key ring, and a token
//! service around default options, pre-seeded with one confidential
//! client (`web-app`), one user (`user-1` / alice), and one login.

use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde_json::json;

use oxidc_core::pkce::{CodeChallengeMethod, Plain, S256};
use oxidc_core::{AuthorizationCode, Client, Consent, Login, RefreshToken, ScopeSet, Session};
use oxidc_jose::KeyRing;

use crate::config::{InteractionUrls, ProviderOptions};
use crate::fetch::Fetcher;
use crate::grants::GrantContext;
use crate::stores::memory::{self, MemoryUserService};
use crate::stores::Stores;
use crate::tokens::TokenService;

pub(crate) const TEST_HS_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

pub(crate) struct TestProvider {
    pub stores: Stores,
    pub users: Arc<MemoryUserService>,
    pub options: Arc<ProviderOptions>,
    pub keys: Arc<KeyRing>,
    pub fetcher: Arc<Fetcher>,
    pub tokens: TokenService,
}

impl TestProvider {
    pub fn default_options() -> ProviderOptions {
        let mut options = ProviderOptions::new(
            "https://id.example.com",
            InteractionUrls::rooted_at("https://id.example.com/ui"),
            SecretString::new("unit-test-provider-secret".to_string()),
        );
        options.scopes = ScopeSet::parse("openid profile email").unwrap();
        options.grant_types = vec![
            "authorization_code".into(),
            "refresh_token".into(),
            "client_credentials".into(),
            "password".into(),
        ];
        options.id_token_signature_algorithms = vec!["HS256".into()];
        options
    }

    pub async fn with_defaults() -> Self {
        Self::with_options(Self::default_options()).await
    }

    pub async fn with_options(options: ProviderOptions) -> Self {
        let users = Arc::new(MemoryUserService::new());
        let mut claims = serde_json::Map::new();
        claims.insert("name".into(), json!("Alice Liddell"));
        claims.insert("email".into(), json!("alice@example.com"));
        claims.insert("email_verified".into(), json!(true));
        users.add_user("user-1", Some("alice"), Some("wonderland"), claims);

        let stores = memory::stores_with_users(users.clone());
        let options = Arc::new(options);
        let keys = Arc::new(
            KeyRing::new()
                .with_secret("unit-hs", "HS256", TEST_HS_SECRET)
                .unwrap(),
        );
        let fetcher = Arc::new(Fetcher::new(
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(60),
        ));
        let tokens = TokenService::new(stores.clone(), keys.clone(), options.clone(), fetcher.clone());

        let provider = Self {
            stores,
            users,
            options,
            keys,
            fetcher,
            tokens,
        };

        let mut client = Client::confidential(
            "web-app",
            "correct-horse-battery-staple",
            vec!["https://rp.example.com/cb".into()],
        )
        .with_scopes(ScopeSet::parse("openid profile email").unwrap());
        client.id_token_signed_response_alg = Some("HS256".into());
        provider.stores.clients.put(client).await.unwrap();

        provider
            .stores
            .logins
            .put(Login {
                id: "login-1".into(),
                user_id: "user-1".into(),
                created_at: Utc::now(),
                expires_at: Utc::now() + Duration::days(14),
                amr: vec!["pwd".into()],
                acr: None,
            })
            .await
            .unwrap();

        provider
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Promote the fixture into a fully assembled engine.
    pub fn into_engine(self) -> crate::container::Engine {
        let registries = Arc::new(crate::container::build_registries(&self.options).unwrap());
        crate::container::Engine {
            options: self.options,
            stores: self.stores,
            keys: self.keys,
            registries,
            tokens: Arc::new(self.tokens),
            fetcher: self.fetcher,
        }
    }

    pub async fn client(&self, client_id: &str) -> Client {
        self.stores.clients.get(client_id).await.unwrap().unwrap()
    }

    pub fn grant_context(&self) -> GrantContext<'_> {
        GrantContext {
            stores: &self.stores,
            tokens: &self.tokens,
            options: &self.options,
            fetcher: &self.fetcher,
            now: Utc::now(),
        }
    }

    pub fn pkce_methods(&self) -> Vec<Arc<dyn CodeChallengeMethod>> {
        vec![Arc::new(Plain), Arc::new(S256)]
    }

    pub async fn seed_code(
        &self,
        client: &Client,
        user_id: &str,
        code_challenge: Option<String>,
        code_challenge_method: Option<&str>,
    ) -> AuthorizationCode {
        self.tokens
            .issue_authorization_code(
                client,
                user_id.to_string(),
                "login-1".to_string(),
                ScopeSet::parse("openid").unwrap(),
                "https://rp.example.com/cb".to_string(),
                code_challenge,
                code_challenge_method.map(ToString::to_string),
                Some("n-0S6_WzA2Mj".to_string()),
                Some("state-1".to_string()),
                None,
                Utc::now(),
            )
            .await
            .unwrap()
    }

    pub async fn seed_expired_code(&self, client: &Client, user_id: &str) -> AuthorizationCode {
        let mut code = self.seed_code(client, user_id, None, None).await;
        code.expires_at = Utc::now() - Duration::seconds(1);
        self.stores.codes.update(code.clone()).await.unwrap();
        code
    }

    pub async fn seed_refresh(&self, client: &Client, scopes: &str) -> RefreshToken {
        self.tokens
            .issue_refresh_token(
                client,
                "user-1".to_string(),
                ScopeSet::parse(scopes).unwrap(),
                None,
                None,
                None,
                Utc::now(),
            )
            .await
            .unwrap()
    }

    pub async fn seed_session_with_login(&self) -> (Session, Login) {
        let login = self.stores.logins.get("login-1").await.unwrap().unwrap();
        let mut session = Session::new("session-1".into(), Utc::now(), Duration::days(14));
        session.push_login(login.id.clone());
        self.stores.sessions.put(session.clone()).await.unwrap();
        (session, login)
    }

    pub async fn seed_consent(&self, client_id: &str, user_id: &str, scopes: &str) -> Consent {
        let consent = Consent {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes: ScopeSet::parse(scopes).unwrap(),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(365),
        };
        self.stores.consents.put(consent.clone()).await.unwrap();
        consent
    }
}
