//! Provider configuration
//!
//! `ProviderOptions` is plain data: enumerated strategy names resolved
//! against the registries at bootstrap, URLs, TTLs, and feature flags.
//! Everything is validated once in [`ProviderOptions::validate`];
//! construction of the provider fails with a descriptive
//! [`ConfigError`] instead of surfacing misconfiguration at request time.

use chrono::Duration;
use secrecy::SecretString;
use url::Url;

use oxidc_core::ScopePolicy;
use oxidc_core::scope::ScopeSet;

use crate::registry;

/// Bootstrap failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The issuer is not an absolute HTTPS URL without query or fragment
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),
    /// A configured strategy name is outside the closed allowlist
    #[error("unknown {kind} \"{name}\"")]
    UnknownName {
        kind: &'static str,
        name: String,
    },
    /// Neither a grant type nor a response type is configured
    #[error("no grant types and no response types configured; the server would expose no endpoint")]
    NoEndpoints,
    /// A required interaction URL is missing or malformed
    #[error("invalid interaction URL for {0}")]
    InvalidInteractionUrl(&'static str),
    /// The key ring cannot sign a configured ID-token algorithm
    #[error("no signing key for configured algorithm {0}")]
    MissingKey(String),
}

/// Where the interaction UI lives. The engine appends the relevant
/// challenge as a query parameter when redirecting the user agent.
#[derive(Debug, Clone)]
pub struct InteractionUrls {
    pub login_url: String,
    pub consent_url: String,
    pub select_account_url: String,
    pub create_url: String,
    /// Terminal error page for failures that must not redirect to the
    /// client (and for denied logouts)
    pub error_url: String,
    pub logout_url: String,
    /// Shown inside `verification_uri` of device authorizations
    pub device_verification_url: String,
}

impl InteractionUrls {
    /// All URLs rooted under one first-party base, e.g.
    /// `https://id.example.com` becomes `https://id.example.com/login`,
    /// `/consent`, and so on.
    #[must_use]
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            login_url: format!("{base}/login"),
            consent_url: format!("{base}/consent"),
            select_account_url: format!("{base}/select-account"),
            create_url: format!("{base}/create"),
            error_url: format!("{base}/error"),
            logout_url: format!("{base}/logout"),
            device_verification_url: format!("{base}/device"),
        }
    }

    fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("loginUrl", &self.login_url),
            ("consentUrl", &self.consent_url),
            ("selectAccountUrl", &self.select_account_url),
            ("createUrl", &self.create_url),
            ("errorUrl", &self.error_url),
            ("logoutUrl", &self.logout_url),
            ("deviceVerificationUrl", &self.device_verification_url),
        ]
    }
}

/// Endpoint paths the engine dispatches on. Defaults follow the common
/// `/oauth/*` layout.
#[derive(Debug, Clone)]
pub struct EndpointPaths {
    pub authorize: String,
    pub token: String,
    pub revocation: String,
    pub introspection: String,
    pub userinfo: String,
    pub logout: String,
    pub device_authorization: String,
    pub jwks: String,
    pub registration: String,
    pub discovery: String,
    /// Prefix for interaction context/decision endpoints; the kind is
    /// appended (`/oauth/interaction/login`, ...)
    pub interaction: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            authorize: "/oauth/authorize".into(),
            token: "/oauth/token".into(),
            revocation: "/oauth/revoke".into(),
            introspection: "/oauth/introspect".into(),
            userinfo: "/oauth/userinfo".into(),
            logout: "/oauth/logout".into(),
            device_authorization: "/oauth/device_authorization".into(),
            jwks: "/oauth/jwks".into(),
            registration: "/oauth/register".into(),
            discovery: "/.well-known/openid-configuration".into(),
            interaction: "/oauth/interaction".into(),
        }
    }
}

/// Entity lifetimes. All whole-second durations.
#[derive(Debug, Clone)]
pub struct Ttls {
    pub session: Duration,
    pub login: Duration,
    pub grant: Duration,
    pub authorization_code: Duration,
    pub access_token: Duration,
    pub refresh_token: Duration,
    pub device_code: Duration,
    pub consent: Duration,
}

impl Default for Ttls {
    fn default() -> Self {
        Self {
            session: Duration::days(14),
            login: Duration::days(14),
            grant: Duration::minutes(5),
            authorization_code: Duration::seconds(60),
            access_token: Duration::hours(1),
            refresh_token: Duration::days(14),
            device_code: Duration::minutes(10),
            consent: Duration::days(365),
        }
    }
}

/// The full provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Issuer identifier; absolute HTTPS URL, no query, no fragment
    pub issuer: String,
    /// Scopes this server supports
    pub scopes: ScopeSet,
    /// Enabled client authentication methods
    pub client_auth_methods: Vec<String>,
    /// Enabled grant types; non-empty implies the token endpoint
    pub grant_types: Vec<String>,
    /// Enabled response types; non-empty implies the authorize endpoint
    pub response_types: Vec<String>,
    /// Enabled response modes
    pub response_modes: Vec<String>,
    /// Enabled PKCE methods
    pub pkce_methods: Vec<String>,
    /// Supported `display` values
    pub displays: Vec<String>,
    /// Supported `prompt` values
    pub prompts: Vec<String>,
    /// Advertised `acr_values`
    pub acr_values: Vec<String>,
    /// Scope narrowing policy (strict by default)
    pub scope_policy: ScopePolicy,
    /// Interaction UI locations
    pub interaction: InteractionUrls,
    /// Endpoint paths
    pub paths: EndpointPaths,
    /// Entity lifetimes
    pub ttls: Ttls,
    /// Rotate refresh tokens on use
    pub enable_refresh_token_rotation: bool,
    /// Allow refresh tokens at the introspection endpoint
    pub enable_refresh_token_introspection: bool,
    /// Cascade refresh-token revocation to dependent access tokens
    pub enable_access_token_revocation: bool,
    pub enable_revocation_endpoint: bool,
    pub enable_introspection_endpoint: bool,
    pub enable_device_authorization_grant: bool,
    pub enable_registration_endpoint: bool,
    /// Provider secret key (pairwise subject derivation)
    pub secret_key: SecretString,
    /// Upper bound for local subject identifiers fed into pairwise
    /// derivation
    pub max_local_subject_length: usize,
    /// ID-token signing algorithms offered to clients; `"none"` must be
    /// listed here for any client to register it
    pub id_token_signature_algorithms: Vec<String>,
    /// Timeout for outbound JWKS / sector-identifier fetches
    pub fetch_timeout: std::time::Duration,
    /// Memoization TTL for fetched documents
    pub fetch_cache_ttl: std::time::Duration,
}

impl ProviderOptions {
    /// Options with the default strategy composition: `client_secret_basic`,
    /// `authorization_code`, `code`, `query`, `S256`, display `page`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        interaction: InteractionUrls,
        secret_key: SecretString,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            scopes: ScopeSet::from_tokens(["openid"]),
            client_auth_methods: vec!["client_secret_basic".into()],
            grant_types: vec!["authorization_code".into()],
            response_types: vec!["code".into()],
            response_modes: vec!["query".into()],
            pkce_methods: vec!["S256".into()],
            displays: vec!["page".into()],
            prompts: vec![
                "none".into(),
                "login".into(),
                "consent".into(),
                "select_account".into(),
            ],
            acr_values: Vec::new(),
            scope_policy: ScopePolicy::Strict,
            interaction,
            paths: EndpointPaths::default(),
            ttls: Ttls::default(),
            enable_refresh_token_rotation: false,
            enable_refresh_token_introspection: false,
            enable_access_token_revocation: true,
            enable_revocation_endpoint: true,
            enable_introspection_endpoint: true,
            enable_device_authorization_grant: false,
            enable_registration_endpoint: false,
            secret_key,
            max_local_subject_length: 128,
            id_token_signature_algorithms: vec!["RS256".into()],
            fetch_timeout: std::time::Duration::from_secs(5),
            fetch_cache_ttl: std::time::Duration::from_secs(60),
        }
    }

    /// Whether the token endpoint is exposed.
    #[must_use]
    pub fn token_endpoint_enabled(&self) -> bool {
        !self.grant_types.is_empty() || self.enable_device_authorization_grant
    }

    /// Whether the authorize endpoint is exposed.
    #[must_use]
    pub fn authorize_endpoint_enabled(&self) -> bool {
        !self.response_types.is_empty()
    }

    /// The effective grant type list including the device grant when the
    /// flag is set.
    #[must_use]
    pub fn effective_grant_types(&self) -> Vec<String> {
        let mut grants = self.grant_types.clone();
        if self.enable_device_authorization_grant
            && !grants.iter().any(|g| g == registry::GRANT_DEVICE_CODE)
        {
            grants.push(registry::GRANT_DEVICE_CODE.to_string());
        }
        grants
    }

    /// Absolute URL for a configured path.
    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.issuer.trim_end_matches('/'), path)
    }

    /// Validate the configuration against the closed allowlists.
    ///
    /// # Errors
    /// Returns the first violation found; the provider refuses to boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issuer = Url::parse(&self.issuer)
            .map_err(|e| ConfigError::InvalidIssuer(format!("{}: {e}", self.issuer)))?;
        if issuer.scheme() != "https" {
            return Err(ConfigError::InvalidIssuer(format!(
                "{} does not use the https scheme",
                self.issuer
            )));
        }
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(ConfigError::InvalidIssuer(format!(
                "{} must not carry a query or fragment",
                self.issuer
            )));
        }

        if self.grant_types.is_empty()
            && self.response_types.is_empty()
            && !self.enable_device_authorization_grant
        {
            return Err(ConfigError::NoEndpoints);
        }

        registry::check_names("client authentication method", &self.client_auth_methods,
            registry::CLIENT_AUTH_METHODS)?;
        registry::check_names("grant type", &self.effective_grant_types(), registry::GRANT_TYPES)?;
        registry::check_names("response type", &self.response_types, registry::RESPONSE_TYPES)?;
        registry::check_names("response mode", &self.response_modes, registry::RESPONSE_MODES)?;
        registry::check_names("PKCE method", &self.pkce_methods, registry::PKCE_METHODS)?;
        registry::check_names("display value", &self.displays, registry::DISPLAYS)?;
        registry::check_names("prompt value", &self.prompts, registry::PROMPTS)?;

        for (name, value) in self.interaction.entries() {
            if Url::parse(value).is_err() {
                return Err(ConfigError::InvalidInteractionUrl(name));
            }
        }
        Ok(())
    }
}
