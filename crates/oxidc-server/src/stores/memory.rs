//! In-memory reference stores
//!
//! `DashMap`-backed implementations of every store port. They are the
//! default wiring for tests and single-process deployments and double as
//! executable documentation of the store contracts: the grant
//! compare-and-set and the replay guard are genuinely atomic here (entry
//! locks), not just by convention.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use oxidc_core::{
    AccessToken, AuthorizationCode, Client, Consent, DeviceAuthorization, Expires, Grant, Login,
    LogoutTicket, RefreshToken, ScopeSet, Session, UserProfile,
};

use super::{
    AccessTokenStore, AuthorizationCodeStore, ClientStore, ConsentStore, DeviceCodeStore,
    GrantStore, LoginStore, LogoutTicketStore, RefreshTokenStore, ReplayGuard, SessionStore,
    StoreError, StoreResult, Stores, UserService,
};

/// Claims each standard OIDC scope unlocks at the userinfo endpoint.
fn claims_for_scope(scope: &str) -> &'static [&'static str] {
    match scope {
        "profile" => &[
            "name",
            "family_name",
            "given_name",
            "middle_name",
            "nickname",
            "preferred_username",
            "profile",
            "picture",
            "website",
            "gender",
            "birthdate",
            "zoneinfo",
            "locale",
            "updated_at",
        ],
        "email" => &["email", "email_verified"],
        "address" => &["address"],
        "phone" => &["phone_number", "phone_number_verified"],
        _ => &[],
    }
}

#[derive(Default)]
pub struct MemoryClientStore {
    clients: DashMap<String, Client>,
}

impl MemoryClientStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn get(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn put(&self, client: Client) -> StoreResult<()> {
        self.clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> StoreResult<()> {
        self.clients
            .remove(client_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

struct MemoryUser {
    profile: UserProfile,
    password: Option<String>,
    claims: serde_json::Map<String, Value>,
}

/// Reference user service backed by a map of seeded accounts.
#[derive(Default)]
pub struct MemoryUserService {
    users: DashMap<String, MemoryUser>,
}

impl MemoryUserService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with optional password credentials and claims.
    pub fn add_user(
        &self,
        id: impl Into<String>,
        username: Option<&str>,
        password: Option<&str>,
        claims: serde_json::Map<String, Value>,
    ) {
        let id = id.into();
        self.users.insert(
            id.clone(),
            MemoryUser {
                profile: UserProfile {
                    id,
                    username: username.map(ToString::to_string),
                },
                password: password.map(ToString::to_string),
                claims,
            },
        );
    }
}

#[async_trait]
impl UserService for MemoryUserService {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|u| u.profile.clone()))
    }

    async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> StoreResult<Option<UserProfile>> {
        for entry in self.users.iter() {
            let matches_name = entry.profile.username.as_deref() == Some(username);
            let matches_password = entry.password.as_deref().is_some_and(|stored| {
                stored.as_bytes().ct_eq(password.as_bytes()).into()
            });
            if matches_name && matches_password {
                return Ok(Some(entry.profile.clone()));
            }
        }
        Ok(None)
    }

    async fn create(&self) -> StoreResult<UserProfile> {
        let profile = UserProfile {
            id: Uuid::new_v4().to_string(),
            username: None,
        };
        self.users.insert(
            profile.id.clone(),
            MemoryUser {
                profile: profile.clone(),
                password: None,
                claims: serde_json::Map::new(),
            },
        );
        Ok(profile)
    }

    async fn claims(
        &self,
        user_id: &str,
        scopes: &ScopeSet,
        requested: Option<&Value>,
    ) -> StoreResult<serde_json::Map<String, Value>> {
        let Some(user) = self.users.get(user_id) else {
            return Ok(serde_json::Map::new());
        };
        let mut allowed: Vec<&str> = scopes.iter().flat_map(claims_for_scope).copied().collect();
        // `claims` parameter members are honored when the service exposes
        // the claim; `null` member values request the default behavior.
        if let Some(names) = requested.and_then(Value::as_object) {
            allowed.extend(names.keys().map(String::as_str));
        }
        Ok(user
            .claims
            .iter()
            .filter(|(name, _)| allowed.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.get(session_id).map(|s| s.clone()))
    }

    async fn put(&self, session: Session) -> StoreResult<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.sessions, now))
    }
}

#[derive(Default)]
pub struct MemoryLoginStore {
    logins: DashMap<String, Login>,
}

impl MemoryLoginStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginStore for MemoryLoginStore {
    async fn get(&self, login_id: &str) -> StoreResult<Option<Login>> {
        Ok(self.logins.get(login_id).map(|l| l.clone()))
    }

    async fn put(&self, login: Login) -> StoreResult<()> {
        self.logins.insert(login.id.clone(), login);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.logins, now))
    }
}

#[derive(Default)]
pub struct MemoryConsentStore {
    consents: DashMap<String, Consent>,
}

impl MemoryConsentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStore for MemoryConsentStore {
    async fn get(&self, consent_id: &str) -> StoreResult<Option<Consent>> {
        Ok(self.consents.get(consent_id).map(|c| c.clone()))
    }

    async fn find_for(&self, user_id: &str, client_id: &str) -> StoreResult<Vec<Consent>> {
        let mut found: Vec<Consent> = self
            .consents
            .iter()
            .filter(|c| c.user_id == user_id && c.client_id == client_id)
            .map(|c| c.clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn put(&self, consent: Consent) -> StoreResult<()> {
        self.consents.insert(consent.id.clone(), consent);
        Ok(())
    }

    async fn delete(&self, consent_id: &str) -> StoreResult<()> {
        self.consents
            .remove(consent_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.consents, now))
    }
}

#[derive(Default)]
pub struct MemoryGrantStore {
    grants: DashMap<String, Grant>,
}

impl MemoryGrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn get(&self, grant_id: &str) -> StoreResult<Option<Grant>> {
        Ok(self.grants.get(grant_id).map(|g| g.clone()))
    }

    async fn by_login_challenge(&self, challenge: &str) -> StoreResult<Option<Grant>> {
        Ok(self
            .grants
            .iter()
            .find(|g| g.login_challenge == challenge)
            .map(|g| g.clone()))
    }

    async fn by_consent_challenge(&self, challenge: &str) -> StoreResult<Option<Grant>> {
        Ok(self
            .grants
            .iter()
            .find(|g| g.consent_challenge == challenge)
            .map(|g| g.clone()))
    }

    async fn put(&self, grant: Grant) -> StoreResult<()> {
        self.grants.insert(grant.id.clone(), grant);
        Ok(())
    }

    async fn update_if_version(
        &self,
        mut grant: Grant,
        expected_version: u64,
    ) -> StoreResult<bool> {
        match self.grants.entry(grant.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().version != expected_version {
                    return Ok(false);
                }
                grant.version = expected_version + 1;
                occupied.insert(grant);
                Ok(true)
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, grant_id: &str) -> StoreResult<()> {
        self.grants.remove(grant_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.grants, now))
    }
}

#[derive(Default)]
pub struct MemoryAuthorizationCodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

impl MemoryAuthorizationCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryAuthorizationCodeStore {
    async fn get(&self, code: &str) -> StoreResult<Option<AuthorizationCode>> {
        Ok(self.codes.get(code).map(|c| c.clone()))
    }

    async fn put(&self, code: AuthorizationCode) -> StoreResult<()> {
        self.codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn update(&self, code: AuthorizationCode) -> StoreResult<()> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(code);
                Ok(())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, code: &str) -> StoreResult<()> {
        self.codes.remove(code);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.codes, now))
    }
}

#[derive(Default)]
pub struct MemoryAccessTokenStore {
    tokens: DashMap<String, AccessToken>,
}

impl MemoryAccessTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessTokenStore for MemoryAccessTokenStore {
    async fn get(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        Ok(self.tokens.get(token).map(|t| t.clone()))
    }

    async fn put(&self, token: AccessToken) -> StoreResult<()> {
        self.tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn update(&self, token: AccessToken) -> StoreResult<()> {
        match self.tokens.entry(token.token.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(token);
                Ok(())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn revoke_by_code(&self, code: &str) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut entry in self.tokens.iter_mut() {
            if entry.authorization_code.as_deref() == Some(code) && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_chain(&self, chain_id: &str) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut entry in self.tokens.iter_mut() {
            if entry.refresh_chain.as_deref() == Some(chain_id) && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.tokens, now))
    }
}

#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    tokens: DashMap<String, RefreshToken>,
}

impl MemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn get(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self.tokens.get(token).map(|t| t.clone()))
    }

    async fn put(&self, token: RefreshToken) -> StoreResult<()> {
        self.tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn update(&self, token: RefreshToken) -> StoreResult<()> {
        match self.tokens.entry(token.token.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(token);
                Ok(())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn consume(
        &self,
        token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshToken>> {
        // Entry holds the shard lock, so check-and-mark is atomic.
        match self.tokens.entry(token.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.revoked || current.consumed_at.is_some() {
                    return Ok(None);
                }
                let prior = current.clone();
                let mut consumed = prior.clone();
                consumed.consumed_at = Some(at);
                consumed.revoked = true;
                occupied.insert(consumed);
                Ok(Some(prior))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn revoke_chain(&self, chain_id: &str) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut entry in self.tokens.iter_mut() {
            if entry.chain_id == chain_id && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_by_code(&self, code: &str) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut entry in self.tokens.iter_mut() {
            if entry.authorization_code.as_deref() == Some(code) && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.tokens, now))
    }
}

#[derive(Default)]
pub struct MemoryDeviceCodeStore {
    authorizations: DashMap<String, DeviceAuthorization>,
}

impl MemoryDeviceCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceCodeStore for MemoryDeviceCodeStore {
    async fn by_device_code(&self, device_code: &str) -> StoreResult<Option<DeviceAuthorization>> {
        Ok(self.authorizations.get(device_code).map(|d| d.clone()))
    }

    async fn by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceAuthorization>> {
        Ok(self
            .authorizations
            .iter()
            .find(|d| d.user_code == user_code)
            .map(|d| d.clone()))
    }

    async fn put(&self, authorization: DeviceAuthorization) -> StoreResult<()> {
        self.authorizations
            .insert(authorization.device_code.clone(), authorization);
        Ok(())
    }

    async fn update(&self, authorization: DeviceAuthorization) -> StoreResult<()> {
        match self.authorizations.entry(authorization.device_code.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(authorization);
                Ok(())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.authorizations, now))
    }
}

#[derive(Default)]
pub struct MemoryLogoutTicketStore {
    tickets: DashMap<String, LogoutTicket>,
}

impl MemoryLogoutTicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogoutTicketStore for MemoryLogoutTicketStore {
    async fn by_challenge(&self, challenge: &str) -> StoreResult<Option<LogoutTicket>> {
        Ok(self
            .tickets
            .iter()
            .find(|t| t.logout_challenge == challenge)
            .map(|t| t.clone()))
    }

    async fn put(&self, ticket: LogoutTicket) -> StoreResult<()> {
        self.tickets.insert(ticket.id.clone(), ticket);
        Ok(())
    }

    async fn delete(&self, ticket_id: &str) -> StoreResult<()> {
        self.tickets.remove(ticket_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(purge(&self.tickets, now))
    }
}

#[derive(Default)]
pub struct MemoryReplayGuard {
    seen: DashMap<String, DateTime<Utc>>,
}

impl MemoryReplayGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayGuard for MemoryReplayGuard {
    async fn register(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.seen.entry(jti.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    return Ok(false);
                }
                occupied.insert(expires_at);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.seen.len() as u64;
        self.seen.retain(|_, expires_at| *expires_at > now);
        Ok(before - self.seen.len() as u64)
    }
}

fn purge<T: Expires>(map: &DashMap<String, T>, now: DateTime<Utc>) -> u64 {
    let before = map.len() as u64;
    map.retain(|_, value| !value.is_expired(now));
    before - map.len() as u64
}

/// A full in-memory store bundle with an empty user service.
#[must_use]
pub fn stores() -> Stores {
    stores_with_users(Arc::new(MemoryUserService::new()))
}

/// A full in-memory store bundle around a seeded user service.
#[must_use]
pub fn stores_with_users(users: Arc<MemoryUserService>) -> Stores {
    Stores {
        clients: Arc::new(MemoryClientStore::new()),
        users,
        sessions: Arc::new(MemorySessionStore::new()),
        logins: Arc::new(MemoryLoginStore::new()),
        consents: Arc::new(MemoryConsentStore::new()),
        grants: Arc::new(MemoryGrantStore::new()),
        codes: Arc::new(MemoryAuthorizationCodeStore::new()),
        access_tokens: Arc::new(MemoryAccessTokenStore::new()),
        refresh_tokens: Arc::new(MemoryRefreshTokenStore::new()),
        device_codes: Arc::new(MemoryDeviceCodeStore::new()),
        logout_tickets: Arc::new(MemoryLogoutTicketStore::new()),
        replay: Arc::new(MemoryReplayGuard::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use oxidc_core::InteractionKind;

    fn grant(version: u64) -> Grant {
        Grant {
            id: "g-1".into(),
            login_challenge: "lc-1".into(),
            consent_challenge: "cc-1".into(),
            parameters: vec![],
            interactions: vec![],
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(5),
            client_id: "client".into(),
            session_id: "s-1".into(),
            consent_id: None,
            version,
        }
    }

    #[tokio::test]
    async fn grant_cas_lets_exactly_one_writer_win() {
        let store = MemoryGrantStore::new();
        store.put(grant(0)).await.unwrap();

        let mut first = store.get("g-1").await.unwrap().unwrap();
        first.record_interaction(InteractionKind::Login);
        let mut second = store.get("g-1").await.unwrap().unwrap();
        second.record_interaction(InteractionKind::Consent);

        assert!(store.update_if_version(first, 0).await.unwrap());
        assert!(!store.update_if_version(second, 0).await.unwrap());

        let stored = store.get("g-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.interactions, vec![InteractionKind::Login]);
    }

    #[tokio::test]
    async fn grant_challenge_lookups() {
        let store = MemoryGrantStore::new();
        store.put(grant(0)).await.unwrap();
        assert!(store.by_login_challenge("lc-1").await.unwrap().is_some());
        assert!(store.by_consent_challenge("cc-1").await.unwrap().is_some());
        assert!(store.by_login_challenge("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replay_guard_flags_duplicates() {
        let guard = MemoryReplayGuard::new();
        let now = Utc::now();
        let exp = now + Duration::minutes(5);
        assert!(guard.register("jti-1", exp, now).await.unwrap());
        assert!(!guard.register("jti-1", exp, now).await.unwrap());
        assert!(guard.register("jti-2", exp, now).await.unwrap());
    }

    #[tokio::test]
    async fn replay_guard_rearms_after_record_expiry() {
        let guard = MemoryReplayGuard::new();
        let now = Utc::now();
        let exp = now + Duration::minutes(5);
        assert!(guard.register("jti-1", exp, now).await.unwrap());

        // once the stored record has expired, the same jti is fresh again
        let later = exp + Duration::seconds(1);
        assert!(
            guard
                .register("jti-1", later + Duration::minutes(5), later)
                .await
                .unwrap()
        );
        // and immediately protected once more
        assert!(
            !guard
                .register("jti-1", later + Duration::minutes(5), later)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn purge_removes_expired_grants() {
        let store = MemoryGrantStore::new();
        let mut stale = grant(0);
        stale.id = "g-stale".into();
        stale.login_challenge = "lc-stale".into();
        stale.expires_at = Utc::now() - Duration::seconds(1);
        store.put(stale).await.unwrap();
        store.put(grant(0)).await.unwrap();

        let removed = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("g-stale").await.unwrap().is_none());
        assert!(store.get("g-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn user_service_credentials_and_claims() {
        let users = MemoryUserService::new();
        let mut claims = serde_json::Map::new();
        claims.insert("email".into(), "alice@example.com".into());
        claims.insert("name".into(), "Alice".into());
        claims.insert("shoe_size".into(), 42.into());
        users.add_user("user-1", Some("alice"), Some("wonderland"), claims);

        assert!(
            users
                .verify_password("alice", "wonderland")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            users
                .verify_password("alice", "underland")
                .await
                .unwrap()
                .is_none()
        );

        let scopes = ScopeSet::parse("openid email").unwrap();
        let produced = users.claims("user-1", &scopes, None).await.unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced["email"], "alice@example.com");

        // claims parameter unlocks exposed claims beyond scope defaults
        let requested = serde_json::json!({ "name": null });
        let produced = users
            .claims("user-1", &scopes, Some(&requested))
            .await
            .unwrap();
        assert_eq!(produced["name"], "Alice");
        assert!(!produced.contains_key("shoe_size"));
    }

    #[tokio::test]
    async fn refresh_consume_has_exactly_one_winner() {
        let store = MemoryRefreshTokenStore::new();
        store
            .put(RefreshToken {
                token: "r1".into(),
                scopes: ScopeSet::default(),
                client_id: "client".into(),
                user_id: "user".into(),
                issued_at: Utc::now(),
                valid_after: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::days(14),
                revoked: false,
                chain_id: "chain".into(),
                parent: None,
                consumed_at: None,
                authorization_code: None,
            })
            .await
            .unwrap();

        let first = store.consume("r1", Utc::now()).await.unwrap();
        let second = store.consume("r1", Utc::now()).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none(), "a consumed token cannot be consumed again");

        let stored = store.get("r1").await.unwrap().unwrap();
        assert!(stored.revoked);
        assert!(stored.consumed_at.is_some());
    }

    #[tokio::test]
    async fn chain_revocation_touches_whole_family() {
        let store = MemoryRefreshTokenStore::new();
        for (token, chain) in [("r1", "chain-a"), ("r2", "chain-a"), ("r3", "chain-b")] {
            store
                .put(RefreshToken {
                    token: token.into(),
                    scopes: ScopeSet::default(),
                    client_id: "client".into(),
                    user_id: "user".into(),
                    issued_at: Utc::now(),
                    valid_after: Utc::now(),
                    expires_at: Utc::now() + Duration::days(14),
                    revoked: false,
                    chain_id: chain.into(),
                    parent: None,
                    consumed_at: None,
                    authorization_code: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.revoke_chain("chain-a").await.unwrap(), 2);
        assert!(store.get("r1").await.unwrap().unwrap().revoked);
        assert!(!store.get("r3").await.unwrap().unwrap().revoked);
    }
}
