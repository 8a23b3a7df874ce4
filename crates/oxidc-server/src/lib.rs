//! # oxidc-server - OAuth 2.0 / OpenID Connect Authorization Server Engine
//!
//! A pluggable, transport-agnostic authorization server runtime: protocol
//! validation, the interactive login/consent state machine, credential
//! issuance and lifecycle, client authentication, and the standard
//! endpoint set (authorize, token, revocation, introspection, userinfo,
//! device authorization, logout, discovery, registration, interaction).
//!
//! ## Architecture
//!
//! - `config` - plain-data [`config::ProviderOptions`] validated at bootstrap
//! - `container` - the composition root ([`container::Engine`]) and request scope
//! - `stores` - async ports per entity family, with `DashMap` reference
//!   implementations in `stores::memory`
//! - `registry` - immutable strategy registries (grants, response types,
//!   response modes, client auth, PKCE, display, prompt, ACR)
//! - `client_auth` - the five + mTLS client authentication methods
//! - `authorize` - request validation, JAR, the grant state machine,
//!   response types, response modes
//! - `interaction` - login / consent / select-account / create / logout
//!   subflows driven by a first-party UI
//! - `grants` - token endpoint grant handlers
//! - `endpoints` - the remaining protocol endpoints
//! - `tokens` - credential minting, rotation chains, revocation cascades
//! - `provider` - the [`Provider`] facade adapters talk to
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxidc_jose::KeyRing;
//! use oxidc_server::config::{InteractionUrls, ProviderOptions};
//! use oxidc_server::Provider;
//! use secrecy::SecretString;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ProviderOptions::new(
//!     "https://id.example.com",
//!     InteractionUrls::rooted_at("https://id.example.com/ui"),
//!     SecretString::new(std::env::var("PROVIDER_SECRET")?),
//! );
//! let keys = KeyRing::new().with_rsa_pem(
//!     "2026-08",
//!     "RS256",
//!     &std::fs::read("signing-key.pem")?,
//!     serde_json::from_str(&std::fs::read_to_string("signing-key.pub.jwk")?)?,
//! )?;
//! let provider = Provider::new(options, keys)?;
//! // hand `provider` to your HTTP adapter; call provider.handle(request)
//! # Ok(())
//! # }
//! ```

pub mod authorize;
pub mod client_auth;
pub mod config;
pub mod container;
pub mod cookies;
pub mod endpoints;
pub mod fetch;
pub mod grants;
pub mod interaction;
pub mod provider;
pub mod registry;
pub mod stores;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

#[doc(inline)]
pub use config::{ConfigError, InteractionUrls, ProviderOptions};
#[doc(inline)]
pub use container::{Engine, RequestScope};
#[doc(inline)]
pub use provider::Provider;
#[doc(inline)]
pub use stores::{StoreError, Stores};

// The wire model and entities are re-exported so adapters depend on one
// crate.
pub use oxidc_core::{self as core, http, Client, OAuthError, OAuthResult};
pub use oxidc_jose as jose;
