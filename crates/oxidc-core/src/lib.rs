//! # oxidc-core - Protocol Primitives
//!
//! Shared, I/O-free building blocks for the oxidc authorization server:
//!
//! - `error` - the OAuth 2.0 / OIDC error taxonomy as tagged values
//! - `http` - the transport-agnostic request/response model the engine
//!   consumes and produces (the concrete HTTP adapter lives outside)
//! - `entities` - domain records (clients, sessions, grants, credentials)
//!   with their invariants and expiry predicates
//! - `scope` - ordered distinct scope sets and the narrowing policy
//! - `pkce` - Proof Key for Code Exchange (RFC 7636) verifier/challenge
//!   validation and verification
//!
//! Everything here is synchronous and allocation-light; async store ports
//! and endpoint handlers live in `oxidc-server`.

pub mod entities;
pub mod error;
pub mod http;
pub mod pkce;
pub mod scope;

#[doc(inline)]
pub use entities::*;
#[doc(inline)]
pub use error::{ErrorCode, OAuthError, OAuthResult};
#[doc(inline)]
pub use http::{Body, Method, Params, Request, Response, SameSite, SetCookie};
#[doc(inline)]
pub use scope::{ScopePolicy, ScopeSet};
