//! Strategy registries
//!
//! Every extensible protocol family - client authentication, grant types,
//! response types, response modes, PKCE methods, displays, prompts, ACR -
//! is a list of named implementations resolved by protocol name. The
//! registries are assembled once at bootstrap from `ProviderOptions` and
//! are immutable afterwards; concurrent reads need no locks.
//!
//! Configured names are checked against the closed allowlists below;
//! these are exactly the values the server can advertise in its metadata.

use std::sync::Arc;

use oxidc_core::entities::same_response_type;
use oxidc_core::pkce::CodeChallengeMethod;

use crate::authorize::response_mode::ResponseModeRenderer;
use crate::authorize::response_type::ResponseType;
use crate::client_auth::ClientAuthenticator;
use crate::config::ConfigError;
use crate::grants::GrantHandler;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const GRANT_JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Client authentication methods this implementation can provide.
pub const CLIENT_AUTH_METHODS: &[&str] = &[
    "client_secret_basic",
    "client_secret_post",
    "none",
    "client_secret_jwt",
    "private_key_jwt",
    "tls_client_auth",
    "self_signed_tls_client_auth",
];

/// Grant types this implementation can provide.
pub const GRANT_TYPES: &[&str] = &[
    GRANT_AUTHORIZATION_CODE,
    GRANT_REFRESH_TOKEN,
    GRANT_CLIENT_CREDENTIALS,
    GRANT_PASSWORD,
    GRANT_DEVICE_CODE,
    GRANT_JWT_BEARER,
];

/// Response types this implementation can provide.
pub const RESPONSE_TYPES: &[&str] = &[
    "code",
    "token",
    "id_token",
    "code id_token",
    "code token",
    "id_token token",
    "code id_token token",
];

/// Response modes this implementation can provide.
pub const RESPONSE_MODES: &[&str] = &["query", "fragment", "form_post", "jwt"];

/// PKCE challenge methods this implementation can provide.
pub const PKCE_METHODS: &[&str] = &["plain", "S256"];

/// `display` values understood by the interaction engine.
pub const DISPLAYS: &[&str] = &["page", "popup", "touch", "wap"];

/// `prompt` values understood by the grant state machine.
pub const PROMPTS: &[&str] = &["none", "login", "consent", "select_account", "create"];

/// Reject any configured name outside its allowlist.
pub(crate) fn check_names(
    kind: &'static str,
    configured: &[String],
    allowed: &[&str],
) -> Result<(), ConfigError> {
    for name in configured {
        let known = if kind == "response type" {
            allowed.iter().any(|a| same_response_type(a, name))
        } else {
            allowed.contains(&name.as_str())
        };
        if !known {
            return Err(ConfigError::UnknownName {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// The immutable strategy composition of a running provider.
pub struct Registries {
    grant_handlers: Vec<Arc<dyn GrantHandler>>,
    response_types: Vec<ResponseType>,
    response_modes: Vec<Arc<dyn ResponseModeRenderer>>,
    client_auth: Vec<Arc<dyn ClientAuthenticator>>,
    pkce_methods: Vec<Arc<dyn CodeChallengeMethod>>,
    displays: Vec<String>,
    prompts: Vec<String>,
    acr_values: Vec<String>,
}

impl Registries {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        grant_handlers: Vec<Arc<dyn GrantHandler>>,
        response_types: Vec<ResponseType>,
        response_modes: Vec<Arc<dyn ResponseModeRenderer>>,
        client_auth: Vec<Arc<dyn ClientAuthenticator>>,
        pkce_methods: Vec<Arc<dyn CodeChallengeMethod>>,
        displays: Vec<String>,
        prompts: Vec<String>,
        acr_values: Vec<String>,
    ) -> Self {
        Self {
            grant_handlers,
            response_types,
            response_modes,
            client_auth,
            pkce_methods,
            displays,
            prompts,
            acr_values,
        }
    }

    /// Grant handler by `grant_type` value.
    #[must_use]
    pub fn grant(&self, name: &str) -> Option<&Arc<dyn GrantHandler>> {
        self.grant_handlers.iter().find(|g| g.name() == name)
    }

    /// All enabled grant type names.
    #[must_use]
    pub fn grant_type_names(&self) -> Vec<&'static str> {
        self.grant_handlers.iter().map(|g| g.name()).collect()
    }

    /// Response type by `response_type` value (order-insensitive).
    #[must_use]
    pub fn response_type(&self, name: &str) -> Option<&ResponseType> {
        self.response_types
            .iter()
            .find(|r| same_response_type(r.name(), name))
    }

    /// All enabled response type names.
    #[must_use]
    pub fn response_type_names(&self) -> Vec<&str> {
        self.response_types.iter().map(ResponseType::name).collect()
    }

    /// Response mode renderer by name.
    #[must_use]
    pub fn response_mode(&self, name: &str) -> Option<&Arc<dyn ResponseModeRenderer>> {
        self.response_modes.iter().find(|m| m.name() == name)
    }

    /// All enabled response mode names.
    #[must_use]
    pub fn response_mode_names(&self) -> Vec<&'static str> {
        self.response_modes.iter().map(|m| m.name()).collect()
    }

    /// All enabled client authentication methods.
    #[must_use]
    pub fn client_auth_methods(&self) -> &[Arc<dyn ClientAuthenticator>] {
        &self.client_auth
    }

    /// Client authentication method by name.
    #[must_use]
    pub fn client_auth_method(&self, name: &str) -> Option<&Arc<dyn ClientAuthenticator>> {
        self.client_auth.iter().find(|m| m.name() == name)
    }

    /// All enabled client authentication method names.
    #[must_use]
    pub fn client_auth_method_names(&self) -> Vec<&'static str> {
        self.client_auth.iter().map(|m| m.name()).collect()
    }

    /// PKCE method by `code_challenge_method` value.
    #[must_use]
    pub fn pkce_method(&self, name: &str) -> Option<&Arc<dyn CodeChallengeMethod>> {
        self.pkce_methods.iter().find(|m| m.name() == name)
    }

    /// All enabled PKCE method names.
    #[must_use]
    pub fn pkce_method_names(&self) -> Vec<&'static str> {
        self.pkce_methods.iter().map(|m| m.name()).collect()
    }

    /// Whether a `display` value is supported.
    #[must_use]
    pub fn supports_display(&self, display: &str) -> bool {
        self.displays.iter().any(|d| d == display)
    }

    /// Whether a `prompt` value is supported.
    #[must_use]
    pub fn supports_prompt(&self, prompt: &str) -> bool {
        self.prompts.iter().any(|p| p == prompt)
    }

    /// Supported `display` values.
    #[must_use]
    pub fn displays(&self) -> &[String] {
        &self.displays
    }

    /// Supported `prompt` values.
    #[must_use]
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Advertised `acr_values`.
    #[must_use]
    pub fn acr_values(&self) -> &[String] {
        &self.acr_values
    }
}
