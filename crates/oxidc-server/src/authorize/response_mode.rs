//! Response mode renderers
//!
//! The response mode decides how authorization response parameters travel
//! back to the client: appended to the redirect URI query, in the
//! fragment, auto-submitted as a form POST, or wrapped in a signed JWT
//! (JARM). Renderers only append parameters - the redirect URI itself is
//! the registered value, byte for byte.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, json};

use oxidc_core::http::{Response, encode_params};
use oxidc_jose::{KeyRing, jwt};

/// Rendering context shared by all modes.
pub struct ModeContext<'a> {
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub issuer: &'a str,
    pub keys: &'a KeyRing,
    pub now: DateTime<Utc>,
    /// Whether the response type defaults to the fragment (JARM follows
    /// the underlying default for its own delivery)
    pub fragment_default: bool,
}

/// A named way of conveying authorization response parameters.
pub trait ResponseModeRenderer: Send + Sync {
    /// Protocol name (`query`, `fragment`, `form_post`, `jwt`).
    fn name(&self) -> &'static str;

    /// Render the parameters into a transport response.
    fn render(&self, cx: &ModeContext<'_>, params: &[(String, String)]) -> Response;
}

fn join_query(redirect_uri: &str, encoded: &str) -> String {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    format!("{redirect_uri}{separator}{encoded}")
}

/// Parameters appended to the redirect URI query.
#[derive(Debug, Default)]
pub struct QueryMode;

impl ResponseModeRenderer for QueryMode {
    fn name(&self) -> &'static str {
        "query"
    }

    fn render(&self, cx: &ModeContext<'_>, params: &[(String, String)]) -> Response {
        Response::redirect(join_query(cx.redirect_uri, &encode_params(params)))
    }
}

/// Parameters carried in the URI fragment.
#[derive(Debug, Default)]
pub struct FragmentMode;

impl ResponseModeRenderer for FragmentMode {
    fn name(&self) -> &'static str {
        "fragment"
    }

    fn render(&self, cx: &ModeContext<'_>, params: &[(String, String)]) -> Response {
        Response::redirect(format!("{}#{}", cx.redirect_uri, encode_params(params)))
    }
}

/// Minimal HTML escaping for attribute values.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Parameters auto-submitted to the redirect URI as a form POST.
#[derive(Debug, Default)]
pub struct FormPostMode;

impl ResponseModeRenderer for FormPostMode {
    fn name(&self) -> &'static str {
        "form_post"
    }

    fn render(&self, cx: &ModeContext<'_>, params: &[(String, String)]) -> Response {
        let inputs: String = params
            .iter()
            .map(|(name, value)| {
                format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
                    escape_html(name),
                    escape_html(value)
                )
            })
            .collect();
        let body = format!(
            "<!DOCTYPE html><html><head><title>Submitting...</title></head>\
             <body onload=\"document.forms[0].submit()\">\
             <form method=\"post\" action=\"{}\">{inputs}\
             <noscript><button type=\"submit\">Continue</button></noscript>\
             </form></body></html>",
            escape_html(cx.redirect_uri)
        );
        Response::html(200, body).no_store()
    }
}

/// JWT-secured authorization response (JARM): the parameters become
/// claims of a signed JWT delivered as the single `response` parameter
/// through the underlying default mode.
#[derive(Debug, Default)]
pub struct JwtMode;

impl ResponseModeRenderer for JwtMode {
    fn name(&self) -> &'static str {
        "jwt"
    }

    fn render(&self, cx: &ModeContext<'_>, params: &[(String, String)]) -> Response {
        let mut claims = Map::new();
        claims.insert("iss".into(), json!(cx.issuer));
        claims.insert("aud".into(), json!(cx.client_id));
        claims.insert(
            "exp".into(),
            json!((cx.now + Duration::minutes(10)).timestamp()),
        );
        for (name, value) in params {
            claims.insert(name.clone(), json!(value));
        }

        let Some(key) = cx.keys.default_key() else {
            return QueryMode.render(cx, &[(
                "error".to_string(),
                "server_error".to_string(),
            )]);
        };
        match jwt::sign(key, &claims) {
            Ok(token) => {
                let wrapped = vec![("response".to_string(), token)];
                if cx.fragment_default {
                    FragmentMode.render(cx, &wrapped)
                } else {
                    QueryMode.render(cx, &wrapped)
                }
            }
            Err(_) => QueryMode.render(cx, &[(
                "error".to_string(),
                "server_error".to_string(),
            )]),
        }
    }
}
