//! Public key set endpoint
//!
//! Serves the asymmetric halves of the issuer key ring. HMAC keys never
//! appear here.

use oxidc_core::http::Response;

use crate::container::Engine;

/// Handle `GET /oauth/jwks`.
#[must_use]
pub fn handle(engine: &Engine) -> Response {
    Response::json(200, engine.keys.public_jwks())
}
