//! Protocol endpoints
//!
//! One module per HTTP surface. Handlers take the engine, the request
//! scope, and the parsed request, and return a structured response;
//! protocol errors are rendered here, never propagated to the adapter.

pub mod device;
pub mod discovery;
pub mod introspection;
pub mod jwks;
pub mod logout;
pub mod registration;
pub mod revocation;
pub mod token;
pub mod userinfo;
