//! Store ports
//!
//! One async port per entity family. Stores exclusively own persistent
//! entities; the engine moves them by value and never holds references
//! across await points. Concurrency discipline is the store's
//! responsibility - the contracts below state what the engine relies on:
//!
//! - `GrantStore::update_if_version` is a compare-and-set: of two racing
//!   interaction decisions exactly one observes `true`.
//! - `RefreshTokenStore` mutations must be linearizable per rotation
//!   chain so replay of a rotated token is always observable.
//! - `ReplayGuard::register` must be atomic per `jti`.
//!
//! Every method is a suspension point; implementations may block on I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use oxidc_core::error::OAuthError;
use oxidc_core::{
    AccessToken, AuthorizationCode, Client, Consent, DeviceAuthorization, Grant, Login,
    LogoutTicket, RefreshToken, ScopeSet, Session, UserProfile,
};

pub mod memory;

/// Store failure surface.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed record does not exist (update/delete targets)
    #[error("record not found")]
    NotFound,
    /// A uniqueness or versioning constraint was violated
    #[error("conflicting concurrent modification")]
    Conflict,
    /// Backend failure; the message goes to the log, never to the wire
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => OAuthError::invalid_request(
                "The request raced with a concurrent modification of the same resource.",
            ),
            other => OAuthError::server_error(other.to_string()),
        }
    }
}

/// Registered client lookup and registration management.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(&self, client_id: &str) -> StoreResult<Option<Client>>;
    async fn put(&self, client: Client) -> StoreResult<()>;
    async fn delete(&self, client_id: &str) -> StoreResult<()>;
}

/// The user database port. Lifecycle of users is out of band; the engine
/// only authenticates credentials, mints accounts for the `create`
/// interaction, and pulls claims.
#[async_trait]
pub trait UserService: Send + Sync {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;

    /// Password check for the resource-owner-password grant and login
    /// interfaces. `None` means the credentials do not match any user.
    async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> StoreResult<Option<UserProfile>>;

    /// Allocate a new user (the `create` interaction).
    async fn create(&self) -> StoreResult<UserProfile>;

    /// Claims for the user filtered by granted scopes and the optional
    /// `claims` request member. The service decides what it exposes.
    async fn claims(
        &self,
        user_id: &str,
        scopes: &ScopeSet,
        requested: Option<&Value>,
    ) -> StoreResult<serde_json::Map<String, Value>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>>;
    async fn put(&self, session: Session) -> StoreResult<()>;
    async fn delete(&self, session_id: &str) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait LoginStore: Send + Sync {
    async fn get(&self, login_id: &str) -> StoreResult<Option<Login>>;
    async fn put(&self, login: Login) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn get(&self, consent_id: &str) -> StoreResult<Option<Consent>>;

    /// All recorded consents for a (user, client) pair, newest first.
    async fn find_for(&self, user_id: &str, client_id: &str) -> StoreResult<Vec<Consent>>;

    async fn put(&self, consent: Consent) -> StoreResult<()>;
    async fn delete(&self, consent_id: &str) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn get(&self, grant_id: &str) -> StoreResult<Option<Grant>>;
    async fn by_login_challenge(&self, challenge: &str) -> StoreResult<Option<Grant>>;
    async fn by_consent_challenge(&self, challenge: &str) -> StoreResult<Option<Grant>>;
    async fn put(&self, grant: Grant) -> StoreResult<()>;

    /// Compare-and-set update: writes `grant` (with its version bumped)
    /// only when the stored version still equals `expected_version`.
    /// Returns whether the write won.
    async fn update_if_version(&self, grant: Grant, expected_version: u64) -> StoreResult<bool>;

    async fn delete(&self, grant_id: &str) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    async fn get(&self, code: &str) -> StoreResult<Option<AuthorizationCode>>;
    async fn put(&self, code: AuthorizationCode) -> StoreResult<()>;
    async fn update(&self, code: AuthorizationCode) -> StoreResult<()>;
    async fn delete(&self, code: &str) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    async fn get(&self, token: &str) -> StoreResult<Option<AccessToken>>;
    async fn put(&self, token: AccessToken) -> StoreResult<()>;
    async fn update(&self, token: AccessToken) -> StoreResult<()>;

    /// Revoke every access token descended from an authorization code
    /// (code-reuse cascade). Returns the number revoked.
    async fn revoke_by_code(&self, code: &str) -> StoreResult<u64>;

    /// Revoke every access token in a refresh rotation chain.
    async fn revoke_chain(&self, chain_id: &str) -> StoreResult<u64>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn get(&self, token: &str) -> StoreResult<Option<RefreshToken>>;
    async fn put(&self, token: RefreshToken) -> StoreResult<()>;
    async fn update(&self, token: RefreshToken) -> StoreResult<()>;

    /// Atomically consume a still-active token for rotation: marks it
    /// consumed and revoked, returning its prior state. `None` when the
    /// token was already consumed, revoked, or missing - of two racing
    /// rotations exactly one receives `Some`.
    async fn consume(
        &self,
        token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshToken>>;

    /// Revoke every refresh token in a rotation chain. Returns the number
    /// revoked.
    async fn revoke_chain(&self, chain_id: &str) -> StoreResult<u64>;

    /// Revoke refresh tokens descended from an authorization code.
    async fn revoke_by_code(&self, code: &str) -> StoreResult<u64>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait DeviceCodeStore: Send + Sync {
    async fn by_device_code(&self, device_code: &str) -> StoreResult<Option<DeviceAuthorization>>;
    async fn by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceAuthorization>>;
    async fn put(&self, authorization: DeviceAuthorization) -> StoreResult<()>;
    async fn update(&self, authorization: DeviceAuthorization) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

#[async_trait]
pub trait LogoutTicketStore: Send + Sync {
    async fn by_challenge(&self, challenge: &str) -> StoreResult<Option<LogoutTicket>>;
    async fn put(&self, ticket: LogoutTicket) -> StoreResult<()>;
    async fn delete(&self, ticket_id: &str) -> StoreResult<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

/// Replay protection for client assertion `jti` values.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Atomically record `jti` until `expires_at`. `false` when the value
    /// was already present and unexpired at `now` (replay).
    async fn register(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let _ = now;
        Ok(0)
    }
}

/// The bundle of store ports the engine is wired with.
#[derive(Clone)]
pub struct Stores {
    pub clients: std::sync::Arc<dyn ClientStore>,
    pub users: std::sync::Arc<dyn UserService>,
    pub sessions: std::sync::Arc<dyn SessionStore>,
    pub logins: std::sync::Arc<dyn LoginStore>,
    pub consents: std::sync::Arc<dyn ConsentStore>,
    pub grants: std::sync::Arc<dyn GrantStore>,
    pub codes: std::sync::Arc<dyn AuthorizationCodeStore>,
    pub access_tokens: std::sync::Arc<dyn AccessTokenStore>,
    pub refresh_tokens: std::sync::Arc<dyn RefreshTokenStore>,
    pub device_codes: std::sync::Arc<dyn DeviceCodeStore>,
    pub logout_tickets: std::sync::Arc<dyn LogoutTicketStore>,
    pub replay: std::sync::Arc<dyn ReplayGuard>,
}
