//! Transport-agnostic HTTP model
//!
//! The engine never touches a socket: a framework adapter parses the real
//! request into a [`Request`] and renders the returned [`Response`]. Both
//! types are intentionally plain - string headers, pre-parsed query/form
//! pairs, a cookie map - so bindings stay thin.
//!
//! Parameter access goes through [`Params`], which enforces the RFC 6749
//! rule that a request parameter MUST NOT appear more than once.

use std::collections::HashMap;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::Value;

use crate::error::{OAuthError, OAuthResult};

/// Characters escaped when building query/fragment parameter strings.
/// Everything outside the RFC 3986 unreserved set.
const COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode a single query or fragment component.
#[must_use]
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Serialize parameter pairs as `k=v&k=v` with component encoding.
#[must_use]
pub fn encode_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HTTP methods the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Client certificate surfaced by the transport adapter for mutual-TLS
/// client authentication. The adapter performs chain validation; the
/// engine only matches identity.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    /// Subject distinguished name, RFC 4514 string form
    pub subject_dn: String,
    /// Subject alternative names (DNS and URI entries)
    pub subject_alternative_names: Vec<String>,
    /// base64url SHA-256 thumbprint of the DER certificate
    pub thumbprint_sha256: String,
}

/// A parsed inbound request as delivered by the transport adapter.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Path component, e.g. `/oauth/token`
    pub path: String,
    /// Decoded query pairs in arrival order (duplicates preserved)
    pub query: Vec<(String, String)>,
    /// Decoded `application/x-www-form-urlencoded` body pairs
    pub form: Vec<(String, String)>,
    /// Parsed JSON body for `application/json` endpoints (registration)
    pub json_body: Option<Value>,
    /// Headers with lowercase names; multi-valued headers pre-joined
    pub headers: HashMap<String, String>,
    /// Request cookies
    pub cookies: HashMap<String, String>,
    /// Peer certificate for mTLS client authentication, when present
    pub peer_certificate: Option<PeerCertificate>,
}

impl Request {
    /// Start building a GET request (adapter and test convenience).
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Start building a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Start building a request with an explicit method.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
            json_body: None,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            peer_certificate: None,
        }
    }

    /// Set a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    /// Append a query pair.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a form body pair.
    #[must_use]
    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    /// Set a header (name is lowercased).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Header lookup by lowercase name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Cookie lookup.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Parameter view over the form body only (token-family endpoints).
    #[must_use]
    pub fn form_params(&self) -> Params<'_> {
        Params {
            sources: vec![self.form.as_slice()],
        }
    }

    /// Parameter view over query and form (the authorize endpoint accepts
    /// both GET and POST).
    #[must_use]
    pub fn merged_params(&self) -> Params<'_> {
        Params {
            sources: vec![self.query.as_slice(), self.form.as_slice()],
        }
    }

    /// Bearer token from the `Authorization` header, if the scheme matches.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let header = self.header("authorization")?;
        let (scheme, rest) = header.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !rest.is_empty() {
            Some(rest.trim_start())
        } else {
            None
        }
    }
}

/// Read-only parameter view that rejects repeated parameters.
#[derive(Debug)]
pub struct Params<'a> {
    sources: Vec<&'a [(String, String)]>,
}

impl<'a> Params<'a> {
    /// Build a view over explicit pair slices.
    #[must_use]
    pub fn over(sources: Vec<&'a [(String, String)]>) -> Self {
        Self { sources }
    }

    /// Fetch an optional parameter; a repeated name is `invalid_request`.
    pub fn get(&self, name: &str) -> OAuthResult<Option<&'a str>> {
        let mut found = None;
        for source in &self.sources {
            for (k, v) in source.iter() {
                if k == name {
                    if found.is_some() {
                        return Err(OAuthError::invalid_request(format!(
                            "Parameter \"{name}\" must not be provided more than once."
                        )));
                    }
                    found = Some(v.as_str());
                }
            }
        }
        Ok(found)
    }

    /// Fetch a required parameter.
    pub fn require(&self, name: &str) -> OAuthResult<&'a str> {
        self.get(name)?.ok_or_else(|| {
            OAuthError::invalid_request(format!("Missing required parameter \"{name}\"."))
        })
    }

    /// All pairs in arrival order (for freezing authorize parameters).
    #[must_use]
    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.sources
            .iter()
            .flat_map(|s| s.iter().cloned())
            .collect()
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// An outbound `Set-Cookie` directive.
#[derive(Debug, Clone)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    /// `Max-Age` in seconds; `Some(0)` clears the cookie
    pub max_age: Option<i64>,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SetCookie {
    /// A session-scoped HTTP-only secure Lax cookie (the engine default).
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age: Option<i64>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age,
            path: "/".to_string(),
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    /// A directive that removes the named cookie.
    #[must_use]
    pub fn expired(name: impl Into<String>) -> Self {
        Self::new(name, "", Some(0))
    }

    /// Render the `Set-Cookie` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out.push_str(match self.same_site {
            SameSite::Strict => "; SameSite=Strict",
            SameSite::Lax => "; SameSite=Lax",
            SameSite::None => "; SameSite=None",
        });
        out
    }
}

/// Response body variants the engine produces.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    Html(String),
    /// Raw text with a caller-set content type (signed userinfo JWTs)
    Text(String),
}

/// A structured response for the transport adapter to render.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<SetCookie>,
    pub body: Body,
}

impl Response {
    /// An empty response with the given status.
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Body::Empty,
        }
    }

    /// A JSON response; sets `Content-Type: application/json`.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            cookies: Vec::new(),
            body: Body::Json(body),
        }
    }

    /// An HTML page; sets `Content-Type: text/html; charset=utf-8`.
    #[must_use]
    pub fn html(status: u16, body: String) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "text/html; charset=utf-8".into())],
            cookies: Vec::new(),
            body: Body::Html(body),
        }
    }

    /// A `302 Found` redirect.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".into(), location.into())],
            cookies: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add `Cache-Control: no-store` and `Pragma: no-cache` (required on
    /// every token-bearing response).
    #[must_use]
    pub fn no_store(self) -> Self {
        self.with_header("Cache-Control", "no-store")
            .with_header("Pragma", "no-cache")
    }

    /// Attach a `Set-Cookie` directive.
    #[must_use]
    pub fn with_cookie(mut self, cookie: SetCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Render a protocol error as a direct JSON response (non-redirect
    /// endpoints). Redirect-bearing endpoints go through a response mode
    /// renderer instead.
    #[must_use]
    pub fn from_error(err: &OAuthError) -> Self {
        let mut response = Self::json(err.status, err.to_json());
        for (name, value) in &err.headers {
            response = response.with_header(name.clone(), value.clone());
        }
        response.no_store()
    }

    /// `Location` header of a redirect response, when present.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("location"))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_parameter_is_rejected() {
        let request = Request::post("/oauth/token")
            .with_form("grant_type", "authorization_code")
            .with_form("grant_type", "client_credentials");
        let err = request.form_params().get("grant_type").unwrap_err();
        assert_eq!(err.code.as_str(), "invalid_request");
    }

    #[test]
    fn merged_params_detect_cross_source_duplicates() {
        let request = Request::post("/oauth/authorize")
            .with_query("client_id", "a")
            .with_form("client_id", "b");
        assert!(request.merged_params().get("client_id").is_err());
    }

    #[test]
    fn bearer_token_extraction() {
        let request = Request::get("/oauth/userinfo").with_header("authorization", "Bearer abc123");
        assert_eq!(request.bearer_token(), Some("abc123"));

        let request = Request::get("/oauth/userinfo").with_header("authorization", "Basic abc123");
        assert_eq!(request.bearer_token(), None);
    }

    #[test]
    fn cookie_header_rendering() {
        let cookie = SetCookie::new("session", "s-1", Some(3600));
        assert_eq!(
            cookie.to_header_value(),
            "session=s-1; Path=/; Max-Age=3600; HttpOnly; Secure; SameSite=Lax"
        );
        let gone = SetCookie::expired("grant");
        assert!(gone.to_header_value().contains("Max-Age=0"));
    }

    #[test]
    fn component_encoding_escapes_reserved() {
        assert_eq!(encode_component("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_component("plain-._~"), "plain-._~");
    }

    #[test]
    fn error_response_carries_challenge_headers() {
        let err = oauth_err();
        let response = Response::from_error(&err);
        assert_eq!(response.status, 401);
        assert!(
            response
                .headers
                .iter()
                .any(|(name, _)| name == "WWW-Authenticate")
        );
        assert!(
            response
                .headers
                .iter()
                .any(|(name, value)| name == "Cache-Control" && value == "no-store")
        );
    }

    fn oauth_err() -> OAuthError {
        OAuthError::invalid_client("Client authentication failed.").with_www_authenticate("Basic")
    }
}
