//! Shared types and error plumbing used across all huddle crates.

pub mod error;
pub mod types;

pub use error::FromMessage;
