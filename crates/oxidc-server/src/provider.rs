//! The provider facade
//!
//! [`Provider`] is what a transport adapter talks to: one entry point per
//! endpoint plus a path-based [`Provider::handle`] dispatcher. Every call
//! runs in its own request scope; pass a cancellation token through
//! [`Provider::handle_cancellable`] to abort store I/O when the client
//! disconnects.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::{Method, Request, Response};
use oxidc_jose::KeyRing;

use crate::config::{ConfigError, ProviderOptions};
use crate::container::{Engine, RequestScope};
use crate::stores::{Stores, memory};
use crate::{authorize, endpoints, interaction};

/// A fully assembled authorization server.
pub struct Provider {
    engine: Arc<Engine>,
}

impl Provider {
    /// Build a provider on the in-memory reference stores.
    ///
    /// # Errors
    /// Fails on any configuration violation.
    pub fn new(options: ProviderOptions, keys: KeyRing) -> Result<Self, ConfigError> {
        Self::with_stores(options, memory::stores(), keys)
    }

    /// Build a provider on externally supplied stores.
    ///
    /// # Errors
    /// Fails on any configuration violation.
    pub fn with_stores(
        options: ProviderOptions,
        stores: Stores,
        keys: KeyRing,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: Arc::new(Engine::build(options, stores, keys)?),
        })
    }

    /// The underlying singleton scope (stores, registries, services).
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Dispatch a request by path and method.
    #[instrument(skip_all, fields(method = ?request.method, path = %request.path))]
    pub async fn handle(&self, request: &Request) -> Response {
        self.dispatch(request, RequestScope::new()).await
    }

    /// Dispatch with an adapter-owned cancellation signal; pending store
    /// I/O is abandoned when the token fires.
    pub async fn handle_cancellable(
        &self,
        request: &Request,
        cancel: CancellationToken,
    ) -> Response {
        let scope = RequestScope::with_cancellation(cancel.clone());
        tokio::select! {
            () = cancel.cancelled() => Response::from_error(&OAuthError::new(
                oxidc_core::ErrorCode::TemporarilyUnavailable,
                "The request was cancelled.",
            )),
            response = self.dispatch(request, scope) => response,
        }
    }

    async fn dispatch(&self, request: &Request, scope: RequestScope) -> Response {
        let engine = &self.engine;
        let paths = &engine.options.paths;
        let path = request.path.as_str();

        if path == paths.authorize && engine.options.authorize_endpoint_enabled() {
            return authorize::handle(engine, &scope, request).await;
        }
        if path == paths.token
            && request.method == Method::Post
            && engine.options.token_endpoint_enabled()
        {
            return endpoints::token::handle(engine, &scope, request).await;
        }
        if path == paths.revocation
            && request.method == Method::Post
            && engine.options.enable_revocation_endpoint
        {
            return endpoints::revocation::handle(engine, &scope, request).await;
        }
        if path == paths.introspection
            && request.method == Method::Post
            && engine.options.enable_introspection_endpoint
        {
            return endpoints::introspection::handle(engine, &scope, request).await;
        }
        if path == paths.userinfo {
            return endpoints::userinfo::handle(engine, &scope, request).await;
        }
        if path == paths.device_authorization
            && request.method == Method::Post
            && engine.options.enable_device_authorization_grant
        {
            return endpoints::device::handle(engine, &scope, request).await;
        }
        if path == paths.logout {
            return endpoints::logout::handle(engine, &scope, request).await;
        }
        if path == paths.jwks && request.method == Method::Get {
            return endpoints::jwks::handle(engine);
        }
        if path == paths.discovery && request.method == Method::Get {
            return endpoints::discovery::handle(engine);
        }
        if engine.options.enable_registration_endpoint {
            if path == paths.registration && request.method == Method::Post {
                return endpoints::registration::register(engine, &scope, request).await;
            }
            if let Some(client_id) = path
                .strip_prefix(paths.registration.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                && !client_id.is_empty()
            {
                return endpoints::registration::manage(engine, &scope, request, client_id).await;
            }
        }
        if let Some(kind) = path
            .strip_prefix(paths.interaction.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        {
            return interaction::handle(engine, &scope, kind, request).await;
        }

        Response::json(
            404,
            json!({
                "error": "invalid_request",
                "error_description": "Unknown endpoint.",
            }),
        )
    }

    /// Approve a device flow user code (verification UI callback).
    ///
    /// # Errors
    /// `invalid_request` for unknown or already-decided codes,
    /// `expired_token` past the code lifetime.
    pub async fn approve_device_code(
        &self,
        user_code: &str,
        user_id: &str,
        login_id: Option<&str>,
    ) -> OAuthResult<()> {
        let scope = RequestScope::new();
        endpoints::device::approve(&self.engine, user_code, user_id, login_id, scope.now).await
    }

    /// Deny a device flow user code (verification UI callback).
    ///
    /// # Errors
    /// Same surface as [`Provider::approve_device_code`].
    pub async fn deny_device_code(&self, user_code: &str) -> OAuthResult<()> {
        let scope = RequestScope::new();
        endpoints::device::deny(&self.engine, user_code, scope.now).await
    }

    /// Start the background expiry sweep.
    pub fn spawn_expiry_sweep(
        &self,
        every: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        self.engine.spawn_expiry_sweep(every)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProvider;
    use oxidc_core::http::Body;

    async fn provider() -> Provider {
        let fixture = TestProvider::with_defaults().await;
        Provider {
            engine: Arc::new(fixture.into_engine()),
        }
    }

    #[tokio::test]
    async fn dispatches_discovery_and_jwks() {
        let provider = provider().await;
        let response = provider
            .handle(&Request::get("/.well-known/openid-configuration"))
            .await;
        assert_eq!(response.status, 200);

        let response = provider.handle(&Request::get("/oauth/jwks")).await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let provider = provider().await;
        let response = provider.handle(&Request::get("/oauth/nope")).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn disabled_endpoints_vanish() {
        let mut options = TestProvider::default_options();
        options.enable_revocation_endpoint = false;
        let fixture = TestProvider::with_options(options).await;
        let provider = Provider {
            engine: Arc::new(fixture.into_engine()),
        };
        let response = provider
            .handle(&Request::post("/oauth/revoke").with_form("token", "t"))
            .await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_request() {
        let provider = provider().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = provider
            .handle_cancellable(&Request::get("/oauth/jwks"), cancel)
            .await;
        assert_eq!(response.status, 503);
        let Body::Json(body) = &response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["error"], "temporarily_unavailable");
    }
}
