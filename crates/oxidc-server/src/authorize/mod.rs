//! The authorize endpoint
//!
//! Entry point for `GET`/`POST /oauth/authorize`: parameter parsing,
//! request object merging, the two-stage validation of `request`, and
//! the grant state machine of `flow`. Errors before a trusted redirect
//! URI render an error page; everything after travels back to the
//! client through the response mode.

use tracing::warn;

use oxidc_core::error::OAuthError;
use oxidc_core::http::{Params, Request, Response};
use oxidc_core::Client;

use crate::container::{Engine, RequestScope};

pub mod flow;
pub mod request;
pub mod request_object;
pub mod response_mode;
pub mod response_type;

pub use request::AuthorizeRequest;

/// Terminal error page for failures that must never redirect.
fn error_page(description: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html><html><head><title>Authorization error</title></head>\
         <body><h1>Authorization request error</h1><p>{}</p></body></html>",
        escape_html(description)
    );
    Response::html(400, body).no_store()
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a protocol error back to the client via the response mode.
/// The mode is the explicitly requested one when it resolves, else the
/// default for the (possibly unvalidated) response type.
fn render_error(
    engine: &Engine,
    scope: &RequestScope,
    client: &Client,
    redirect_uri: &str,
    merged: &[(String, String)],
    err: OAuthError,
) -> Response {
    warn!(
        client_id = %client.client_id,
        error = err.code.as_str(),
        description = %err.description,
        "authorization request failed"
    );
    let bare = |name: &str| {
        merged
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };
    let fragment_default = bare("response_type").is_some_and(|rt| {
        rt.split_whitespace().any(|part| part == "token" || part == "id_token")
    });
    let mode_name = bare("response_mode")
        .filter(|name| engine.registries.response_mode(name).is_some())
        .unwrap_or(if fragment_default { "fragment" } else { "query" });
    let renderer = engine
        .registries
        .response_mode(mode_name)
        .or_else(|| engine.registries.response_mode("query"))
        .expect("query mode is always registered");
    let mode_cx = engine.mode_context(redirect_uri, &client.client_id, fragment_default, scope.now);
    renderer.render(&mode_cx, &err.to_params())
}

/// Handle an authorize request end to end.
pub async fn handle(engine: &Engine, scope: &RequestScope, request: &Request) -> Response {
    let params = request.merged_params();

    // Stage zero: the client must be identifiable.
    let client_id = match params.get("client_id") {
        Ok(Some(client_id)) => client_id.to_string(),
        Ok(None) => return error_page("Missing required parameter \"client_id\"."),
        Err(_) => return error_page("The parameter \"client_id\" must not be repeated."),
    };
    let client = match engine.stores.clients.get(&client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => return error_page(&format!("Unknown client \"{client_id}\".")),
        Err(error) => {
            warn!(%error, "client lookup failed");
            return error_page("The authorization server encountered an unexpected error.");
        }
    };

    // Merge a request object before trusting any parameter; it may carry
    // the redirect_uri itself.
    let merged = match request_object::merge(
        params.to_vec(),
        &client,
        &engine.options.issuer,
        &engine.fetcher,
    )
    .await
    {
        Ok(merged) => merged,
        Err(err) => return error_page(&err.description),
    };

    // Stage one: an exactly-registered redirect URI.
    let merged_view = Params::over(vec![&merged]);
    let redirect_uri = match request::resolve_redirect(&merged_view, &client) {
        Ok(uri) => uri,
        Err(message) => return error_page(&message),
    };

    // Stage two: full validation; failures redirect.
    let authorize = match request::validate(
        &merged,
        &client,
        redirect_uri.clone(),
        &engine.registries,
        &engine.options,
    ) {
        Ok(authorize) => authorize,
        Err(err) => return render_error(engine, scope, &client, &redirect_uri, &merged, err),
    };

    match flow::run(engine, scope, request, &client, &authorize).await {
        Ok(response) => response,
        Err(err) => render_error(engine, scope, &client, &redirect_uri, &merged, err)
            .with_cookie(crate::cookies::clear_grant_cookie()),
    }
}
