//! OAuth 2.0 / OpenID Connect error taxonomy
//!
//! Protocol failures are values, not exceptions: every handler returns an
//! [`OAuthError`] carrying the RFC error code, a description, the HTTP
//! status it maps to, response headers (`WWW-Authenticate` for
//! authentication failures), and the `state` echo for redirect-bearing
//! endpoints. The transport layer serializes the value either as a JSON
//! body or as redirect parameters through the active response mode.

use serde_json::{Value, json};

/// The closed set of protocol error codes this server emits.
///
/// The RFC 6749 / RFC 6750 base set plus the OIDC interaction and device
/// flow extensions enumerated in the server metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request is missing a parameter, repeats one, or is malformed
    InvalidRequest,
    /// Client authentication failed
    InvalidClient,
    /// The authorization grant (code, refresh token, assertion) is invalid
    InvalidGrant,
    /// The client is not authorized to use this grant or token
    UnauthorizedClient,
    /// The grant type is not supported by this server
    UnsupportedGrantType,
    /// A requested scope is unknown or exceeds what the client may ask for
    InvalidScope,
    /// The resource owner or server denied the request
    AccessDenied,
    /// The response type is not supported by this server
    UnsupportedResponseType,
    /// Internal failure; details are logged, never surfaced
    ServerError,
    /// The server is temporarily unable to handle the request
    TemporarilyUnavailable,
    /// End-user authentication is required (`prompt=none`)
    LoginRequired,
    /// End-user consent is required (`prompt=none`)
    ConsentRequired,
    /// Some interaction is required (`prompt=none`)
    InteractionRequired,
    /// Account selection is required (`prompt=none`)
    AccountSelectionRequired,
    /// The presented bearer token is invalid (RFC 6750)
    InvalidToken,
    /// The presented bearer token lacks a required scope (RFC 6750)
    InsufficientScope,
    /// Device flow: the user has not yet approved the request (RFC 8628)
    AuthorizationPending,
    /// Device flow: the client is polling too fast (RFC 8628)
    SlowDown,
    /// Device flow: the device code expired (RFC 8628)
    ExpiredToken,
    /// The login produced an ACR outside the client's `acr_values`
    UnmetAuthenticationRequirements,
}

impl ErrorCode {
    /// The wire form of the code (`error` response member).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::LoginRequired => "login_required",
            Self::ConsentRequired => "consent_required",
            Self::InteractionRequired => "interaction_required",
            Self::AccountSelectionRequired => "account_selection_required",
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::UnmetAuthenticationRequirements => "unmet_authentication_requirements",
        }
    }

    /// The HTTP status this code maps to when rendered as a JSON body.
    #[must_use]
    pub fn default_status(self) -> u16 {
        match self {
            Self::InvalidClient | Self::InvalidToken => 401,
            Self::InsufficientScope => 403,
            Self::ServerError => 500,
            Self::TemporarilyUnavailable => 503,
            _ => 400,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol error value.
///
/// Construct through the per-code helpers (`OAuthError::invalid_request(..)`
/// and friends), then refine with the builder methods.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {description}")]
pub struct OAuthError {
    /// RFC error code
    pub code: ErrorCode,
    /// Human-readable description (`error_description`)
    pub description: String,
    /// Optional documentation URI (`error_uri`)
    pub uri: Option<String>,
    /// HTTP status for direct (non-redirect) rendering
    pub status: u16,
    /// Response headers, e.g. `WWW-Authenticate` on authentication failures
    pub headers: Vec<(String, String)>,
    /// `state` echo for redirect-bearing endpoints
    pub state: Option<String>,
}

/// Result alias for fallible protocol operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

macro_rules! code_ctor {
    ($(#[$meta:meta])* $name:ident, $code:ident) => {
        $(#[$meta])*
        #[must_use]
        pub fn $name(description: impl Into<String>) -> Self {
            Self::new(ErrorCode::$code, description)
        }
    };
}

impl OAuthError {
    /// Create an error with the code's default status and no extras.
    #[must_use]
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            uri: None,
            status: code.default_status(),
            headers: Vec::new(),
            state: None,
        }
    }

    code_ctor!(invalid_request, InvalidRequest);
    code_ctor!(invalid_client, InvalidClient);
    code_ctor!(invalid_grant, InvalidGrant);
    code_ctor!(unauthorized_client, UnauthorizedClient);
    code_ctor!(unsupported_grant_type, UnsupportedGrantType);
    code_ctor!(invalid_scope, InvalidScope);
    code_ctor!(access_denied, AccessDenied);
    code_ctor!(unsupported_response_type, UnsupportedResponseType);
    code_ctor!(login_required, LoginRequired);
    code_ctor!(consent_required, ConsentRequired);
    code_ctor!(account_selection_required, AccountSelectionRequired);
    code_ctor!(invalid_token, InvalidToken);
    code_ctor!(insufficient_scope, InsufficientScope);
    code_ctor!(authorization_pending, AuthorizationPending);
    code_ctor!(slow_down, SlowDown);
    code_ctor!(expired_token, ExpiredToken);

    /// Internal failure. The description is for the log line; the wire
    /// body never carries internal details.
    #[must_use]
    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, description)
    }

    /// Attach an `error_uri`.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Override the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Attach the request `state` for redirect rendering.
    #[must_use]
    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state = state;
        self
    }

    /// Attach a `WWW-Authenticate` challenge for the given scheme.
    #[must_use]
    pub fn with_www_authenticate(mut self, scheme: &str) -> Self {
        let value = format!(
            "{scheme} error=\"{}\", error_description=\"{}\"",
            self.code.as_str(),
            self.description.replace('"', "'"),
        );
        self.headers.push(("WWW-Authenticate".into(), value));
        self
    }

    /// The JSON body form: `{"error": ..., "error_description": ...}`.
    ///
    /// `server_error` and `temporarily_unavailable` replace the description
    /// with a generic sentence so internals never leak.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let description = match self.code {
            ErrorCode::ServerError => "The authorization server encountered an unexpected error.",
            ErrorCode::TemporarilyUnavailable => {
                "The authorization server is temporarily unable to handle the request."
            }
            _ => self.description.as_str(),
        };
        let mut body = json!({
            "error": self.code.as_str(),
            "error_description": description,
        });
        if let Some(uri) = &self.uri {
            body["error_uri"] = Value::String(uri.clone());
        }
        body
    }

    /// The redirect-parameter form for delivery through a response mode.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("error".to_string(), self.code.as_str().to_string())];
        let description = match self.code {
            ErrorCode::ServerError => {
                "The authorization server encountered an unexpected error.".to_string()
            }
            _ => self.description.clone(),
        };
        if !description.is_empty() {
            params.push(("error_description".to_string(), description));
        }
        if let Some(uri) = &self.uri {
            params.push(("error_uri".to_string(), uri.clone()));
        }
        if let Some(state) = &self.state {
            params.push(("state".to_string(), state.clone()));
        }
        params
    }
}
