//! The grant state machine
//!
//! An authorization moves Fresh → AwaitingLogin → AwaitingConsent →
//! Ready, with select-account and create as prompted side-steps. The
//! state is not stored as an enum: it is derived on every resumption
//! from the session, the grant's recorded interactions, and the request
//! parameters, so the machine re-enters correctly after each interaction
//! round-trip.

use tracing::{debug, info};

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::http::{Request, Response, encode_component};
use oxidc_core::{Client, Consent, Expires, Grant, InteractionKind, Login, ScopeSet, Session};

use crate::container::{Engine, RequestScope};
use crate::cookies;
use crate::tokens::TokenService;

use super::request::AuthorizeRequest;
use super::response_type::IssueContext;

/// Resolve the session bound to the request cookie, creating a fresh one
/// when absent or expired.
pub(super) async fn resolve_session(
    engine: &Engine,
    request: &Request,
    scope: &RequestScope,
) -> OAuthResult<Session> {
    if let Some(session_id) = request.cookie(cookies::SESSION_COOKIE)
        && let Some(session) = engine.stores.sessions.get(session_id).await?
        && !session.is_expired(scope.now)
    {
        return Ok(session);
    }
    let session = Session::new(
        TokenService::opaque_token(),
        scope.now,
        engine.options.ttls.session,
    );
    engine.stores.sessions.put(session.clone()).await?;
    debug!(session_id = %session.id, "created browser session");
    Ok(session)
}

/// Locate or create the grant for this authorization. `Err` carries a
/// terminal response (expired grant).
pub(super) async fn resolve_grant(
    engine: &Engine,
    request: &Request,
    scope: &RequestScope,
    client: &Client,
    session: &Session,
    authorize: &AuthorizeRequest,
) -> Result<Grant, OAuthError> {
    if let Some(grant_id) = request.cookie(cookies::GRANT_COOKIE)
        && let Some(grant) = engine.stores.grants.get(grant_id).await?
        && grant.session_id == session.id
        && grant.client_id == client.client_id
    {
        if grant.is_expired(scope.now) {
            engine.stores.grants.delete(&grant.id).await?;
            return Err(OAuthError::access_denied("Expired Grant.")
                .with_state(authorize.state.clone()));
        }
        return Ok(grant);
    }

    let grant = Grant {
        id: TokenService::opaque_token(),
        login_challenge: TokenService::opaque_token(),
        consent_challenge: TokenService::opaque_token(),
        parameters: authorize.raw.clone(),
        interactions: Vec::new(),
        created_at: scope.now,
        expires_at: scope.now + engine.options.ttls.grant,
        client_id: client.client_id.clone(),
        session_id: session.id.clone(),
        consent_id: None,
        version: 0,
    };
    engine.stores.grants.put(grant.clone()).await?;
    debug!(grant_id = %grant.id, client_id = %client.client_id, "created grant");
    Ok(grant)
}

/// Redirect the user agent to an interaction UI with the challenge
/// appended, pinning session and grant cookies.
fn interaction_redirect(
    scope: &RequestScope,
    url: &str,
    challenge_param: &str,
    challenge: &str,
    session: &Session,
    grant: &Grant,
) -> Response {
    let separator = if url.contains('?') { '&' } else { '?' };
    Response::redirect(format!(
        "{url}{separator}{challenge_param}={}",
        encode_component(challenge)
    ))
    .with_cookie(cookies::session_cookie(session, scope.now))
    .with_cookie(cookies::grant_cookie(grant, scope.now))
}

/// The login currently backing the session, when still valid.
async fn active_login(
    engine: &Engine,
    scope: &RequestScope,
    session: &Session,
) -> OAuthResult<Option<Login>> {
    let Some(login_id) = &session.active_login else {
        return Ok(None);
    };
    let Some(login) = engine.stores.logins.get(login_id).await? else {
        return Ok(None);
    };
    if login.is_expired(scope.now) {
        return Ok(None);
    }
    Ok(Some(login))
}

/// The consent applicable to this grant: the one attached by a consent
/// decision, else the newest recorded consent covering the request.
async fn applicable_consent(
    engine: &Engine,
    scope: &RequestScope,
    grant: &Grant,
    client: &Client,
    user_id: &str,
    requested: &ScopeSet,
) -> OAuthResult<Option<Consent>> {
    if let Some(consent_id) = &grant.consent_id
        && let Some(consent) = engine.stores.consents.get(consent_id).await?
        && !consent.is_expired(scope.now)
    {
        return Ok(Some(consent));
    }
    let recorded = engine
        .stores
        .consents
        .find_for(user_id, &client.client_id)
        .await?;
    Ok(recorded
        .into_iter()
        .find(|c| !c.is_expired(scope.now) && c.covers(requested)))
}

/// Drive the state machine for a validated request. Protocol errors are
/// returned for the caller to render through the response mode.
pub(super) async fn run(
    engine: &Engine,
    scope: &RequestScope,
    request: &Request,
    client: &Client,
    authorize: &AuthorizeRequest,
) -> OAuthResult<Response> {
    let session = resolve_session(engine, request, scope).await?;
    let grant = resolve_grant(engine, request, scope, client, &session, authorize).await?;
    let urls = &engine.options.interaction;

    let fail_with = |err: OAuthError| err.with_state(authorize.state.clone());

    // Prompted side-steps come before login so a `create` or
    // `select_account` request reaches its UI even with a live session.
    if authorize.has_prompt("create") && !grant.has_interaction(InteractionKind::Create) {
        return Ok(interaction_redirect(
            scope,
            &urls.create_url,
            "login_challenge",
            &grant.login_challenge,
            &session,
            &grant,
        ));
    }
    if authorize.has_prompt("select_account")
        && !grant.has_interaction(InteractionKind::SelectAccount)
    {
        if session.logins.is_empty() {
            return Err(fail_with(OAuthError::account_selection_required(
                "There is no account available to select.",
            )));
        }
        return Ok(interaction_redirect(
            scope,
            &urls.select_account_url,
            "login_challenge",
            &grant.login_challenge,
            &session,
            &grant,
        ));
    }

    let login = active_login(engine, scope, &session).await?;
    let login_needed = match &login {
        None => true,
        Some(login) => {
            authorize
                .max_age
                .is_some_and(|max_age| login.older_than(max_age, scope.now))
                || (authorize.has_prompt("login")
                    && !grant.has_interaction(InteractionKind::Login))
        }
    };
    if login_needed {
        if authorize.has_prompt("none") {
            engine.stores.grants.delete(&grant.id).await?;
            return Err(fail_with(OAuthError::login_required(
                "End-user authentication is required.",
            )));
        }
        return Ok(interaction_redirect(
            scope,
            &urls.login_url,
            "login_challenge",
            &grant.login_challenge,
            &session,
            &grant,
        ));
    }
    let login = login.expect("login_needed is false");

    let consent = applicable_consent(
        engine,
        scope,
        &grant,
        client,
        &login.user_id,
        &authorize.scopes,
    )
    .await?;
    let consent_needed = (authorize.has_prompt("consent")
        && !grant.has_interaction(InteractionKind::Consent))
        || (client.require_consent && consent.is_none());
    if consent_needed {
        if authorize.has_prompt("none") {
            engine.stores.grants.delete(&grant.id).await?;
            return Err(fail_with(OAuthError::consent_required(
                "End-user consent is required.",
            )));
        }
        return Ok(interaction_redirect(
            scope,
            &urls.consent_url,
            "consent_challenge",
            &grant.consent_challenge,
            &session,
            &grant,
        ));
    }

    // Ready: delegate to the response type and complete the grant.
    let granted = match &consent {
        Some(consent) => authorize.scopes.intersect(&consent.scopes),
        None => authorize.scopes.clone(),
    };
    let response_type = engine
        .registries
        .response_type(&authorize.response_type)
        .ok_or_else(|| {
            OAuthError::server_error("validated response type vanished from the registry")
        })?;

    let params = {
        let issue_cx = IssueContext {
            tokens: &engine.tokens,
            stores: &engine.stores,
            client,
            request: authorize,
            login: &login,
            user_id: &login.user_id,
            scopes: &granted,
            now: scope.now,
        };
        response_type.issue(&issue_cx).await.map_err(&fail_with)?
    };

    let mut params = params;
    if let Some(state) = &authorize.state {
        params.push(("state".to_string(), state.clone()));
    }
    // RFC 9207 issuer identification
    params.push(("iss".to_string(), engine.options.issuer.clone()));

    let mode_name = authorize
        .response_mode
        .as_deref()
        .unwrap_or_else(|| response_type.default_mode());
    let renderer = engine.registries.response_mode(mode_name).ok_or_else(|| {
        OAuthError::server_error(format!("response mode {mode_name} vanished from the registry"))
    })?;
    let mode_cx = engine.mode_context(
        &authorize.redirect_uri,
        &client.client_id,
        response_type.fragment_default(),
        scope.now,
    );

    engine.stores.grants.delete(&grant.id).await?;
    info!(
        client_id = %client.client_id,
        response_type = %authorize.response_type,
        "authorization completed"
    );

    Ok(renderer
        .render(&mode_cx, &params)
        .with_cookie(cookies::clear_grant_cookie())
        .with_cookie(cookies::session_cookie(&session, scope.now)))
}
