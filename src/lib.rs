//! gateway-hydrate: identity store bootstrap for an API gateway.
//!
//! On startup the gateway connects to its identity store and, once the store
//! is ready, seeds it with the configured default user, named users, their
//! key-auth credentials and the access-control scopes. Re-running against an
//! already hydrated store writes no scopes.

pub mod bootstrap;
pub mod core;
pub mod hydrate;
pub mod store;

pub use crate::core::{config, error};
pub use bootstrap::logger;
