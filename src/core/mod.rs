//! Core infrastructure: shared foundation used across the whole crate.
//!
//! - **config**: configuration loading and resolved types.
//! - **error**: application-wide and store error enums.

pub mod config;
pub mod error;
