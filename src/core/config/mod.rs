//! Configuration: TOML loading, `[meta] base` inheritance, env overrides.
//!
//! - **raw**: serde shapes that mirror the file.
//! - **types**: resolved, validated configuration handed to the rest of the crate.
//! - **load**: file reading, merging and override application.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from, Overrides};
pub use types::*;
