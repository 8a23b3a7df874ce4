//! Domain entities
//!
//! Persistent records owned by the stores. Relations between entities are
//! expressed by identifier, never by in-memory back-pointer: a `Grant`
//! holds a `session_id`, a `Session` holds `Login` ids, a `Login` holds a
//! `user_id`. In-memory views resolve them through store lookups.
//!
//! Every time-bound entity exposes `is_expired` / `is_active` predicates;
//! wall-clock `now` is always passed in so expiry logic stays testable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::ScopeSet;

/// Anything that eventually expires; the in-memory stores use this for
/// their purge sweep.
pub trait Expires {
    /// Absolute expiry instant.
    fn expires_at(&self) -> DateTime<Utc>;

    /// Whether the record is past its lifetime at `now`.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Remaining whole seconds at `now` (floor), zero when expired.
    fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        let remaining = (self.expires_at() - now).num_seconds();
        remaining.max(0) as u64
    }
}

macro_rules! impl_expires {
    ($($ty:ty),+) => {
        $(impl Expires for $ty {
            fn expires_at(&self) -> DateTime<Utc> {
                self.expires_at
            }
        })+
    };
}

/// OIDC subject identifier derivation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    #[default]
    Public,
    Pairwise,
}

/// Application type from dynamic registration (RFC 7591).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationType {
    /// Runs on a web server, can keep secrets
    #[default]
    Web,
    /// Mobile/desktop app, cannot keep secrets
    Native,
}

/// A registered relying party.
#[derive(Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier
    pub client_id: String,
    /// Shared secret for `client_secret_*` authentication; absent for
    /// public clients
    pub client_secret: Option<String>,
    /// Secret expiry; `None` means the secret does not expire
    pub secret_expires_at: Option<DateTime<Utc>>,
    /// Exact-match redirect URI allowlist
    pub redirect_uris: Vec<String>,
    /// Registered token endpoint authentication method (protocol name)
    pub token_endpoint_auth_method: String,
    /// Pinned JWS algorithm for client assertions; `None` accepts any
    /// algorithm of the method's family
    pub token_endpoint_auth_signing_alg: Option<String>,
    /// Grant types the client may use
    pub grant_types: Vec<String>,
    /// Response types the client may use
    pub response_types: Vec<String>,
    /// Scopes the client may request
    pub scopes: ScopeSet,
    /// Subject identifier type
    #[serde(default)]
    pub subject_type: SubjectType,
    /// Sector identifier document URL (pairwise clients)
    pub sector_identifier_uri: Option<String>,
    /// Per-client salt folded into pairwise derivation
    pub pairwise_salt: Option<String>,
    /// ID-token signing algorithm; `None` means the server default
    pub id_token_signed_response_alg: Option<String>,
    /// When set, userinfo responses are signed JWTs with this algorithm
    pub userinfo_signed_response_alg: Option<String>,
    /// Required algorithm for request objects (JAR)
    pub request_object_signing_alg: Option<String>,
    /// Client public keys (JWK set document) for `private_key_jwt` and
    /// request object verification
    pub jwks: Option<Value>,
    /// URL of the client's JWK set, fetched on demand
    pub jwks_uri: Option<String>,
    /// Application type
    #[serde(default)]
    pub application_type: ApplicationType,
    /// Whether authorization requests must carry PKCE even for a
    /// confidential client
    #[serde(default)]
    pub require_pkce: bool,
    /// Whether end-user consent is collected for this client
    #[serde(default = "default_true")]
    pub require_consent: bool,
    /// Exact-match post-logout redirect allowlist
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    /// Authentication context class references the client accepts
    #[serde(default)]
    pub acr_values: Vec<String>,
    /// Human-readable name for interaction UIs
    pub client_name: Option<String>,
    /// Bearer token authorizing registration management (RFC 7592)
    pub registration_access_token: Option<String>,
    /// Expected subject DN for `tls_client_auth`
    pub tls_client_auth_subject_dn: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Client {
    /// A confidential client with the default composition:
    /// `client_secret_basic`, `authorization_code` + `refresh_token`,
    /// response type `code`.
    #[must_use]
    pub fn confidential(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uris: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            secret_expires_at: None,
            redirect_uris,
            token_endpoint_auth_method: "client_secret_basic".into(),
            token_endpoint_auth_signing_alg: None,
            grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            response_types: vec!["code".into()],
            scopes: ScopeSet::from_tokens(["openid"]),
            subject_type: SubjectType::Public,
            sector_identifier_uri: None,
            pairwise_salt: None,
            id_token_signed_response_alg: None,
            userinfo_signed_response_alg: None,
            request_object_signing_alg: None,
            jwks: None,
            jwks_uri: None,
            application_type: ApplicationType::Web,
            require_pkce: false,
            require_consent: true,
            post_logout_redirect_uris: Vec::new(),
            acr_values: Vec::new(),
            client_name: None,
            registration_access_token: None,
            tls_client_auth_subject_dn: None,
        }
    }

    /// A public (native) client: no secret, `none` authentication,
    /// mandatory PKCE.
    #[must_use]
    pub fn public(client_id: impl Into<String>, redirect_uris: Vec<String>) -> Self {
        let mut client = Self::confidential(client_id, String::new(), redirect_uris);
        client.client_secret = None;
        client.token_endpoint_auth_method = "none".into();
        client.application_type = ApplicationType::Native;
        client.require_pkce = true;
        client
    }

    /// Replace the scope allowlist.
    #[must_use]
    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    /// Replace the grant type allowlist.
    #[must_use]
    pub fn with_grant_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, grants: I) -> Self {
        self.grant_types = grants.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the response type allowlist.
    #[must_use]
    pub fn with_response_types<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        types: I,
    ) -> Self {
        self.response_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the client authenticates with `none` (public client).
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == "none"
    }

    /// Whether `grant_type` is in the client allowlist.
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Whether `response_type` is in the client allowlist. Response type
    /// values are unordered token sets (`"code id_token"` equals
    /// `"id_token code"`).
    #[must_use]
    pub fn allows_response_type(&self, response_type: &str) -> bool {
        self.response_types
            .iter()
            .any(|r| same_response_type(r, response_type))
    }

    /// Exact byte match against the registered redirect URIs.
    #[must_use]
    pub fn redirect_uri_registered(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|r| r == uri)
    }

    /// Exact byte match against the post-logout allowlist.
    #[must_use]
    pub fn post_logout_redirect_registered(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|r| r == uri)
    }

    /// Whether the registered secret is past its expiry at `now`.
    #[must_use]
    pub fn secret_expired(&self, now: DateTime<Utc>) -> bool {
        self.secret_expires_at.is_some_and(|at| now >= at)
    }

    /// Effective ID-token signing algorithm (server default: RS256).
    #[must_use]
    pub fn id_token_alg(&self) -> &str {
        self.id_token_signed_response_alg.as_deref().unwrap_or("RS256")
    }
}

// Secrets never reach log output
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_endpoint_auth_method", &self.token_endpoint_auth_method)
            .field("grant_types", &self.grant_types)
            .field("response_types", &self.response_types)
            .field("redirect_uris", &self.redirect_uris)
            .field("subject_type", &self.subject_type)
            .finish_non_exhaustive()
    }
}

/// Compare two response type values as unordered token sets.
#[must_use]
pub fn same_response_type(a: &str, b: &str) -> bool {
    let mut left: Vec<&str> = a.split_whitespace().collect();
    let mut right: Vec<&str> = b.split_whitespace().collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

/// A minimal view of an end user as the user service exposes it.
/// Claim production stays behind the user service port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque local identifier (the `public` subject value)
    pub id: String,
    /// Preferred username for introspection responses
    pub username: Option<String>,
}

/// A cookie-bound browser session holding an ordered login stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Login ids, oldest first
    pub logins: Vec<String>,
    /// At most one active login; always a member of `logins`
    pub active_login: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session with no logins.
    #[must_use]
    pub fn new(id: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id,
            logins: Vec::new(),
            active_login: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Push a login onto the stack and make it active.
    pub fn push_login(&mut self, login_id: String) {
        if !self.logins.contains(&login_id) {
            self.logins.push(login_id.clone());
        }
        self.active_login = Some(login_id);
    }

    /// Activate a login already on the stack; `false` when unknown.
    #[must_use]
    pub fn activate_login(&mut self, login_id: &str) -> bool {
        if self.logins.iter().any(|l| l == login_id) {
            self.active_login = Some(login_id.to_string());
            true
        } else {
            false
        }
    }

    /// Detach the active login without touching login history.
    pub fn deactivate(&mut self) {
        self.active_login = None;
    }
}

/// A single authentication event. Immutable after creation; sessions
/// reference logins, they never own them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Authentication method references reported by the UI
    #[serde(default)]
    pub amr: Vec<String>,
    /// Authentication context class reference
    pub acr: Option<String>,
}

impl Login {
    /// Whether more than `max_age` seconds elapsed since authentication.
    #[must_use]
    pub fn older_than(&self, max_age: u64, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() >= max_age as i64
    }
}

/// A recorded end-user consent for a client/scope combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consent {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    /// Granted scopes; always a subset of the client allowlist
    pub scopes: ScopeSet,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Consent {
    /// Whether this consent covers every requested scope.
    #[must_use]
    pub fn covers(&self, requested: &ScopeSet) -> bool {
        self.scopes.contains_all(requested)
    }
}

/// Interactive steps a grant can require or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Login,
    Consent,
    SelectAccount,
    Create,
}

impl InteractionKind {
    /// Protocol name, matching `prompt` values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
            Self::Create => "create",
        }
    }
}

/// An in-progress authorization spanning multiple round-trips.
///
/// Created at `/oauth/authorize` when interaction is needed, mutated by
/// interaction decisions, removed at completion, denial, or expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    /// Unguessable capability handed to the login UI
    pub login_challenge: String,
    /// Unguessable capability handed to the consent UI
    pub consent_challenge: String,
    /// The original authorize parameters, frozen at creation
    pub parameters: Vec<(String, String)>,
    /// Interactions performed so far, in order
    pub interactions: Vec<InteractionKind>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client_id: String,
    /// Session the grant was bound to at creation (by cookie)
    pub session_id: String,
    /// Consent attached by the consent decision
    pub consent_id: Option<String>,
    /// Optimistic-concurrency version; interaction decisions are
    /// serialized through compare-and-set on this counter
    pub version: u64,
}

impl Grant {
    #[must_use]
    pub fn has_interaction(&self, kind: InteractionKind) -> bool {
        self.interactions.contains(&kind)
    }

    /// Record a performed interaction (idempotent).
    pub fn record_interaction(&mut self, kind: InteractionKind) {
        if !self.has_interaction(kind) {
            self.interactions.push(kind);
        }
    }
}

/// A single-use authorization code.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    /// Login backing this code; source of `auth_time`, `acr`, `amr`
    pub login_id: String,
    pub scopes: ScopeSet,
    /// Redirect URI the code was bound to
    pub redirect_uri: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
    pub state: Option<String>,
    /// The `claims` request parameter, carried through to ID-token
    /// assembly
    pub claims: Option<Value>,
    pub issued_at: DateTime<Utc>,
    pub valid_after: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl AuthorizationCode {
    /// Redeemable at `now`: not revoked, inside its validity window.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now >= self.valid_after && now < self.expires_at
    }
}

impl std::fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCode")
            .field("code", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("scopes", &self.scopes)
            .field("revoked", &self.revoked)
            .finish_non_exhaustive()
    }
}

/// An issued access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// Always `Bearer`
    pub token_type: String,
    pub scopes: ScopeSet,
    pub client_id: String,
    /// Absent for `client_credentials` tokens
    pub user_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub valid_after: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    /// Authorization code this token descended from (code-reuse cascade)
    pub authorization_code: Option<String>,
    /// Refresh rotation chain this token belongs to (replay cascade)
    pub refresh_chain: Option<String>,
    /// The `claims` request parameter of the originating authorization,
    /// honored by the userinfo endpoint
    pub claims: Option<Value>,
}

impl AccessToken {
    /// Active at `now` per RFC 7662 semantics.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now >= self.valid_after && now < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("scopes", &self.scopes)
            .field("revoked", &self.revoked)
            .finish_non_exhaustive()
    }
}

/// An issued refresh token. Rotation links successors through
/// `chain_id`/`parent`; replay of a rotated token burns the whole chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    pub scopes: ScopeSet,
    pub client_id: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub valid_after: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    /// Rotation family identifier, stable across rotations
    pub chain_id: String,
    /// Predecessor token in the rotation chain
    pub parent: Option<String>,
    /// Set when the token was consumed by rotation; a consumed token
    /// presented again is replay
    pub consumed_at: Option<DateTime<Utc>>,
    /// Authorization code this chain descended from
    pub authorization_code: Option<String>,
}

impl RefreshToken {
    /// Usable at `now`: not revoked, not consumed, inside its window.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked
            && self.consumed_at.is_none()
            && now >= self.valid_after
            && now < self.expires_at
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("chain_id", &self.chain_id)
            .field("revoked", &self.revoked)
            .field("consumed_at", &self.consumed_at)
            .finish_non_exhaustive()
    }
}

/// Outcome states of a device authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum DeviceStatus {
    /// Waiting for the user to act on the user code
    Pending,
    /// Approved; tokens may be issued once
    Authorized {
        user_id: String,
        login_id: Option<String>,
    },
    /// The user denied the request
    Denied,
    /// Tokens were issued; further polls fail
    Consumed,
}

/// A device/user code pair for the device authorization grant (RFC 8628).
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    /// Short human-typable code shown on the secondary device
    pub user_code: String,
    pub client_id: String,
    pub scopes: ScopeSet,
    /// Minimum polling interval in seconds
    pub interval: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Last token endpoint poll, for `slow_down` pacing
    pub last_polled_at: Option<DateTime<Utc>>,
    pub status: DeviceStatus,
}

impl std::fmt::Debug for DeviceAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAuthorization")
            .field("device_code", &"[REDACTED]")
            .field("user_code", &self.user_code)
            .field("client_id", &self.client_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// The logout analogue of a grant: an in-progress RP-initiated logout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutTicket {
    pub id: String,
    /// Unguessable capability handed to the logout UI
    pub logout_challenge: String,
    pub session_id: String,
    /// Client named by `id_token_hint`/`client_id`, when identified
    pub client_id: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl_expires!(
    Session,
    Login,
    Consent,
    Grant,
    AuthorizationCode,
    AccessToken,
    RefreshToken,
    DeviceAuthorization,
    LogoutTicket
);
