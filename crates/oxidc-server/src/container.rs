//! Composition root
//!
//! Three scopes, wired explicitly:
//!
//! - **Singleton**: everything inside [`Engine`] - options, stores, key
//!   ring, registries, token service, fetcher. Immutable after
//!   [`Engine::build`], shared via `Arc`, safe for concurrent reads.
//! - **Request**: a [`RequestScope`] per inbound request, carrying the
//!   request clock and the cancellation signal.
//! - **Transient**: the per-call context structs (`GrantContext`,
//!   `AuthnContext`, `ModeContext`) built on demand from the engine.
//!
//! There is no global registry; a process can run any number of engines.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use oxidc_core::pkce::{CodeChallengeMethod, Plain, S256};
use oxidc_jose::KeyRing;

use crate::authorize::response_mode::{
    FormPostMode, FragmentMode, JwtMode, ModeContext, QueryMode, ResponseModeRenderer,
};
use crate::authorize::response_type::ResponseType;
use crate::client_auth::{
    AuthnContext, ClientAuthenticator, ClientSecretBasic, ClientSecretJwt, ClientSecretPost,
    PrivateKeyJwt, PublicClient, SelfSignedTlsClientAuth, TlsClientAuth,
};
use crate::config::{ConfigError, ProviderOptions};
use crate::fetch::Fetcher;
use crate::grants::{
    AuthorizationCodeGrant, ClientCredentialsGrant, DeviceCodeGrant, GrantContext, GrantHandler,
    JwtBearerGrant, PasswordGrant, RefreshTokenGrant,
};
use crate::registry::{self, Registries};
use crate::stores::Stores;
use crate::tokens::TokenService;

/// Resolve the configured PKCE method names.
fn build_pkce(names: &[String]) -> Result<Vec<Arc<dyn CodeChallengeMethod>>, ConfigError> {
    names
        .iter()
        .map(|name| -> Result<Arc<dyn CodeChallengeMethod>, ConfigError> {
            match name.as_str() {
                "plain" => Ok(Arc::new(Plain)),
                "S256" => Ok(Arc::new(S256)),
                other => Err(ConfigError::UnknownName {
                    kind: "PKCE method",
                    name: other.to_string(),
                }),
            }
        })
        .collect()
}

/// Assemble the strategy registries from validated options.
pub(crate) fn build_registries(options: &ProviderOptions) -> Result<Registries, ConfigError> {
    let pkce = build_pkce(&options.pkce_methods)?;

    let mut grant_handlers: Vec<Arc<dyn GrantHandler>> = Vec::new();
    for name in options.effective_grant_types() {
        let handler: Arc<dyn GrantHandler> = match name.as_str() {
            registry::GRANT_AUTHORIZATION_CODE => {
                Arc::new(AuthorizationCodeGrant::new(pkce.clone()))
            }
            registry::GRANT_REFRESH_TOKEN => Arc::new(RefreshTokenGrant),
            registry::GRANT_CLIENT_CREDENTIALS => Arc::new(ClientCredentialsGrant),
            registry::GRANT_PASSWORD => Arc::new(PasswordGrant),
            registry::GRANT_DEVICE_CODE => Arc::new(DeviceCodeGrant),
            registry::GRANT_JWT_BEARER => Arc::new(JwtBearerGrant),
            other => {
                return Err(ConfigError::UnknownName {
                    kind: "grant type",
                    name: other.to_string(),
                });
            }
        };
        grant_handlers.push(handler);
    }

    let mut response_types = Vec::new();
    for name in &options.response_types {
        response_types.push(ResponseType::from_name(name).ok_or_else(|| {
            ConfigError::UnknownName {
                kind: "response type",
                name: name.clone(),
            }
        })?);
    }

    let mut response_modes: Vec<Arc<dyn ResponseModeRenderer>> = Vec::new();
    for name in &options.response_modes {
        let renderer: Arc<dyn ResponseModeRenderer> = match name.as_str() {
            "query" => Arc::new(QueryMode),
            "fragment" => Arc::new(FragmentMode),
            "form_post" => Arc::new(FormPostMode),
            "jwt" => Arc::new(JwtMode),
            other => {
                return Err(ConfigError::UnknownName {
                    kind: "response mode",
                    name: other.to_string(),
                });
            }
        };
        response_modes.push(renderer);
    }
    // The defaults must always be renderable even when not advertised.
    for fallback in ["query", "fragment"] {
        if !response_modes.iter().any(|m| m.name() == fallback) {
            let renderer: Arc<dyn ResponseModeRenderer> = match fallback {
                "query" => Arc::new(QueryMode),
                _ => Arc::new(FragmentMode),
            };
            response_modes.push(renderer);
        }
    }

    let mut client_auth: Vec<Arc<dyn ClientAuthenticator>> = Vec::new();
    for name in &options.client_auth_methods {
        let method: Arc<dyn ClientAuthenticator> = match name.as_str() {
            "client_secret_basic" => Arc::new(ClientSecretBasic),
            "client_secret_post" => Arc::new(ClientSecretPost),
            "none" => Arc::new(PublicClient),
            "client_secret_jwt" => Arc::new(ClientSecretJwt),
            "private_key_jwt" => Arc::new(PrivateKeyJwt),
            "tls_client_auth" => Arc::new(TlsClientAuth),
            "self_signed_tls_client_auth" => Arc::new(SelfSignedTlsClientAuth),
            other => {
                return Err(ConfigError::UnknownName {
                    kind: "client authentication method",
                    name: other.to_string(),
                });
            }
        };
        client_auth.push(method);
    }

    Ok(Registries::new(
        grant_handlers,
        response_types,
        response_modes,
        client_auth,
        pkce,
        options.displays.clone(),
        options.prompts.clone(),
        options.acr_values.clone(),
    ))
}

/// The singleton scope of a running provider.
pub struct Engine {
    pub options: Arc<ProviderOptions>,
    pub stores: Stores,
    pub keys: Arc<KeyRing>,
    pub registries: Arc<Registries>,
    pub tokens: Arc<TokenService>,
    pub fetcher: Arc<Fetcher>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Validate options and wire every singleton.
    ///
    /// # Errors
    /// Any configuration violation aborts construction.
    pub fn build(
        options: ProviderOptions,
        stores: Stores,
        keys: KeyRing,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        for alg in &options.id_token_signature_algorithms {
            if alg != "none" && keys.select(alg).is_none() {
                return Err(ConfigError::MissingKey(alg.clone()));
            }
        }
        let registries = Arc::new(build_registries(&options)?);
        let options = Arc::new(options);
        let keys = Arc::new(keys);
        let fetcher = Arc::new(Fetcher::new(options.fetch_timeout, options.fetch_cache_ttl));
        let tokens = Arc::new(TokenService::new(
            stores.clone(),
            keys.clone(),
            options.clone(),
            fetcher.clone(),
        ));
        debug!(issuer = %options.issuer, "engine assembled");
        Ok(Self {
            options,
            stores,
            keys,
            registries,
            tokens,
            fetcher,
        })
    }

    /// Transient grant execution context.
    #[must_use]
    pub fn grant_context(&self, now: DateTime<Utc>) -> GrantContext<'_> {
        GrantContext {
            stores: &self.stores,
            tokens: &self.tokens,
            options: &self.options,
            fetcher: &self.fetcher,
            now,
        }
    }

    /// Transient client authentication context for an endpoint path.
    #[must_use]
    pub fn authn_context(&self, endpoint_path: &str, now: DateTime<Utc>) -> AuthnContext<'_> {
        AuthnContext {
            stores: &self.stores,
            fetcher: &self.fetcher,
            endpoint_url: self.options.endpoint_url(endpoint_path),
            issuer: self.options.issuer.clone(),
            now,
        }
    }

    /// Transient response mode rendering context.
    #[must_use]
    pub fn mode_context<'a>(
        &'a self,
        redirect_uri: &'a str,
        client_id: &'a str,
        fragment_default: bool,
        now: DateTime<Utc>,
    ) -> ModeContext<'a> {
        ModeContext {
            redirect_uri,
            client_id,
            issuer: &self.options.issuer,
            keys: &self.keys,
            now,
            fragment_default,
        }
    }

    /// Background sweep deleting expired records from every store.
    /// Returns the task handle; dropping the engine does not stop it,
    /// abort the handle on shutdown.
    pub fn spawn_expiry_sweep(
        self: &Arc<Self>,
        every: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let now = Utc::now();
                let stores = &engine.stores;
                let results = [
                    stores.sessions.purge_expired(now).await,
                    stores.logins.purge_expired(now).await,
                    stores.consents.purge_expired(now).await,
                    stores.grants.purge_expired(now).await,
                    stores.codes.purge_expired(now).await,
                    stores.access_tokens.purge_expired(now).await,
                    stores.refresh_tokens.purge_expired(now).await,
                    stores.device_codes.purge_expired(now).await,
                    stores.logout_tickets.purge_expired(now).await,
                    stores.replay.purge_expired(now).await,
                ];
                let mut purged = 0;
                for result in results {
                    match result {
                        Ok(count) => purged += count,
                        Err(error) => warn!(%error, "expiry sweep store failure"),
                    }
                }
                if purged > 0 {
                    debug!(purged, "expiry sweep removed records");
                }
            }
        })
    }
}

/// Per-request scope: the request clock and cancellation signal.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RequestScope {
    /// A scope for a request arriving now, with a fresh cancellation
    /// token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// A scope bound to the adapter's cancellation signal (client
    /// disconnect).
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            now: Utc::now(),
            cancel,
        }
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}
