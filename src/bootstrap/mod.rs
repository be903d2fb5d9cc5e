//! Bootstrap layer: modules that run before the store is connected.
//!
//! - **logger**: tracing-subscriber initialisation.

pub mod logger;
