//! Token services
//!
//! Central minting and revocation of credentials: opaque access/refresh
//! tokens and authorization codes backed by the stores, and ID tokens
//! assembled from logins, consents, and user claims, signed through the
//! issuer key ring.
//!
//! Revocation cascades live here too: authorization-code reuse burns the
//! tokens minted from the code, refresh replay burns the rotation chain.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::{
    AccessToken, AuthorizationCode, Client, Expires, Login, RefreshToken, ScopeSet, SubjectType,
};
use oxidc_jose::{KeyRing, hashes, jwt, pairwise};

use crate::config::ProviderOptions;
use crate::fetch::Fetcher;
use crate::stores::Stores;

/// Inputs for ID-token assembly.
pub struct IdTokenParams<'a> {
    pub client: &'a Client,
    pub user_id: &'a str,
    /// Login backing the authentication; source of `auth_time`, `acr`,
    /// `amr`. Absent for refresh-minted tokens whose login is gone.
    pub login: Option<&'a Login>,
    pub scopes: &'a ScopeSet,
    pub nonce: Option<&'a str>,
    /// Access token issued alongside; produces `at_hash`
    pub access_token: Option<&'a str>,
    /// Authorization code issued alongside; produces `c_hash`
    pub code: Option<&'a str>,
    /// The `id_token` member of the `claims` request parameter
    pub claims_request: Option<&'a Value>,
}

/// Mints and revokes credentials.
pub struct TokenService {
    stores: Stores,
    keys: Arc<KeyRing>,
    options: Arc<ProviderOptions>,
    fetcher: Arc<Fetcher>,
}

impl TokenService {
    pub(crate) fn new(
        stores: Stores,
        keys: Arc<KeyRing>,
        options: Arc<ProviderOptions>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        Self {
            stores,
            keys,
            options,
            fetcher,
        }
    }

    /// A fresh 256-bit opaque token, base64url.
    #[must_use]
    pub fn opaque_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Mint and store an access token.
    #[allow(clippy::too_many_arguments)]
    pub async fn issue_access_token(
        &self,
        client: &Client,
        user_id: Option<String>,
        scopes: ScopeSet,
        authorization_code: Option<String>,
        refresh_chain: Option<String>,
        claims: Option<Value>,
        now: DateTime<Utc>,
    ) -> OAuthResult<AccessToken> {
        let token = AccessToken {
            token: Self::opaque_token(),
            token_type: "Bearer".to_string(),
            scopes,
            client_id: client.client_id.clone(),
            user_id,
            issued_at: now,
            valid_after: now,
            expires_at: now + self.options.ttls.access_token,
            revoked: false,
            authorization_code,
            refresh_chain,
            claims,
        };
        self.stores.access_tokens.put(token.clone()).await?;
        debug!(client_id = %client.client_id, "issued access token");
        Ok(token)
    }

    /// Mint and store a refresh token. A `None` chain starts a new
    /// rotation family.
    #[allow(clippy::too_many_arguments)]
    pub async fn issue_refresh_token(
        &self,
        client: &Client,
        user_id: String,
        scopes: ScopeSet,
        authorization_code: Option<String>,
        chain_id: Option<String>,
        parent: Option<String>,
        now: DateTime<Utc>,
    ) -> OAuthResult<RefreshToken> {
        let token = RefreshToken {
            token: Self::opaque_token(),
            scopes,
            client_id: client.client_id.clone(),
            user_id,
            issued_at: now,
            valid_after: now,
            expires_at: now + self.options.ttls.refresh_token,
            revoked: false,
            chain_id: chain_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            parent,
            consumed_at: None,
            authorization_code,
        };
        self.stores.refresh_tokens.put(token.clone()).await?;
        Ok(token)
    }

    /// Mint and store a single-use authorization code.
    #[allow(clippy::too_many_arguments)]
    pub async fn issue_authorization_code(
        &self,
        client: &Client,
        user_id: String,
        login_id: String,
        scopes: ScopeSet,
        redirect_uri: String,
        code_challenge: Option<String>,
        code_challenge_method: Option<String>,
        nonce: Option<String>,
        state: Option<String>,
        claims: Option<Value>,
        now: DateTime<Utc>,
    ) -> OAuthResult<AuthorizationCode> {
        let code = AuthorizationCode {
            code: Self::opaque_token(),
            client_id: client.client_id.clone(),
            user_id,
            login_id,
            scopes,
            redirect_uri,
            code_challenge,
            code_challenge_method,
            nonce,
            state,
            claims,
            issued_at: now,
            valid_after: now,
            expires_at: now + self.options.ttls.authorization_code,
            revoked: false,
        };
        self.stores.codes.put(code.clone()).await?;
        Ok(code)
    }

    /// Atomically consume a refresh token and mint its successor in the
    /// same chain. Losing the consumption race means the token was
    /// already rotated - that is replay, and the chain burns.
    pub async fn rotate_refresh_token(
        &self,
        client: &Client,
        old: &RefreshToken,
        scopes: ScopeSet,
        now: DateTime<Utc>,
    ) -> OAuthResult<RefreshToken> {
        let Some(consumed) = self.stores.refresh_tokens.consume(&old.token, now).await? else {
            warn!(chain_id = %old.chain_id, "refresh token consumed twice");
            self.revoke_refresh_chain(&old.chain_id).await?;
            return Err(OAuthError::invalid_grant(
                "The provided refresh token is invalid.",
            ));
        };
        self.issue_refresh_token(
            client,
            consumed.user_id.clone(),
            scopes,
            consumed.authorization_code.clone(),
            Some(consumed.chain_id.clone()),
            Some(consumed.token.clone()),
            now,
        )
        .await
    }

    /// Burn every credential descended from an authorization code
    /// (single-use violation).
    pub async fn revoke_code_descendants(&self, code: &str) -> OAuthResult<()> {
        let access = self.stores.access_tokens.revoke_by_code(code).await?;
        let refresh = self.stores.refresh_tokens.revoke_by_code(code).await?;
        warn!(
            revoked_access = access,
            revoked_refresh = refresh,
            "authorization code reuse: revoked descendants"
        );
        Ok(())
    }

    /// Burn a refresh rotation chain; dependent access tokens follow when
    /// access-token revocation is enabled.
    pub async fn revoke_refresh_chain(&self, chain_id: &str) -> OAuthResult<()> {
        let refresh = self.stores.refresh_tokens.revoke_chain(chain_id).await?;
        let access = if self.options.enable_access_token_revocation {
            self.stores.access_tokens.revoke_chain(chain_id).await?
        } else {
            0
        };
        warn!(
            chain_id,
            revoked_refresh = refresh,
            revoked_access = access,
            "revoked refresh rotation chain"
        );
        Ok(())
    }

    /// The `sub` value this client sees for a user.
    pub async fn subject_for(&self, client: &Client, user_id: &str) -> OAuthResult<String> {
        match client.subject_type {
            SubjectType::Public => Ok(user_id.to_string()),
            SubjectType::Pairwise => {
                let sector = self.sector_identifier(client)?;
                let salt = client.pairwise_salt.as_deref().unwrap_or_default();
                pairwise::derive(
                    &self.options.secret_key,
                    &sector,
                    user_id,
                    salt,
                    self.options.max_local_subject_length,
                )
                .map_err(|e| OAuthError::server_error(e.to_string()))
            }
        }
    }

    /// Sector identifier: host of `sector_identifier_uri`, else host of
    /// the sole redirect URI.
    fn sector_identifier(&self, client: &Client) -> OAuthResult<String> {
        let source = client
            .sector_identifier_uri
            .as_deref()
            .or_else(|| client.redirect_uris.first().map(String::as_str))
            .ok_or_else(|| {
                OAuthError::server_error(format!(
                    "pairwise client {} has no sector source",
                    client.client_id
                ))
            })?;
        let parsed = url::Url::parse(source)
            .map_err(|e| OAuthError::server_error(format!("sector source: {e}")))?;
        parsed
            .host_str()
            .map(ToString::to_string)
            .ok_or_else(|| OAuthError::server_error("sector source has no host".to_string()))
    }

    /// Validate a pairwise client's sector document: it must list every
    /// registered redirect URI. Called at registration time.
    pub async fn validate_sector_document(&self, client: &Client) -> OAuthResult<()> {
        let Some(uri) = &client.sector_identifier_uri else {
            return Ok(());
        };
        let listed = self.fetcher.sector_redirect_uris(uri).await?;
        for registered in &client.redirect_uris {
            if !listed.contains(registered) {
                return Err(OAuthError::invalid_client(format!(
                    "Redirect URI {registered} is not listed in the sector identifier document."
                )));
            }
        }
        Ok(())
    }

    /// Assemble and sign an ID token.
    pub async fn issue_id_token(
        &self,
        params: IdTokenParams<'_>,
        now: DateTime<Utc>,
    ) -> OAuthResult<String> {
        let alg = params.client.id_token_alg().to_string();
        let sub = self.subject_for(params.client, params.user_id).await?;

        let mut claims = Map::new();
        claims.insert("iss".into(), json!(self.options.issuer));
        claims.insert("sub".into(), json!(sub));
        claims.insert("aud".into(), json!(params.client.client_id));
        claims.insert("azp".into(), json!(params.client.client_id));
        claims.insert(
            "exp".into(),
            json!((now + self.options.ttls.access_token).timestamp()),
        );
        claims.insert("iat".into(), json!(now.timestamp()));
        if let Some(login) = params.login {
            claims.insert("auth_time".into(), json!(login.created_at.timestamp()));
            if let Some(acr) = &login.acr {
                claims.insert("acr".into(), json!(acr));
            }
            if !login.amr.is_empty() {
                claims.insert("amr".into(), json!(login.amr));
            }
        }
        if let Some(nonce) = params.nonce {
            claims.insert("nonce".into(), json!(nonce));
        }
        if let Some(token) = params.access_token
            && let Some(hash) = hashes::left_half_hash(&alg, token)
        {
            claims.insert("at_hash".into(), json!(hash));
        }
        if let Some(code) = params.code
            && let Some(hash) = hashes::left_half_hash(&alg, code)
        {
            claims.insert("c_hash".into(), json!(hash));
        }

        // Claims explicitly requested for the ID token, as far as the
        // user service exposes them. `sub` and friends stay ours.
        let user_claims = self
            .stores
            .users
            .claims(params.user_id, params.scopes, params.claims_request)
            .await?;
        for (name, value) in user_claims {
            claims.entry(name).or_insert(value);
        }

        if alg == "none" {
            if !self
                .options
                .id_token_signature_algorithms
                .iter()
                .any(|a| a == "none")
            {
                return Err(OAuthError::server_error(format!(
                    "client {} registered id_token alg none but the server does not allow it",
                    params.client.client_id
                )));
            }
            return jwt::sign_unsecured(&claims)
                .map_err(|e| OAuthError::server_error(e.to_string()));
        }

        let key = self.keys.select(&alg).ok_or_else(|| {
            OAuthError::server_error(format!("no signing key for id_token alg {alg}"))
        })?;
        jwt::sign(key, &claims).map_err(|e| OAuthError::server_error(e.to_string()))
    }

    /// Whole-second remaining lifetime for a token response.
    #[must_use]
    pub fn expires_in(token: &AccessToken, now: DateTime<Utc>) -> u64 {
        token.remaining_seconds(now)
    }
}
