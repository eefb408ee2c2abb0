//! `tg-domain` — shared types for the ToolGate runtime.
//!
//! This crate carries the declarative policy model, the configuration
//! surface deserialized from `config.toml`, and the validation
//! machinery shared by both. It has no async or I/O dependencies so
//! every other crate can depend on it.

pub mod config;
pub mod error;
pub mod policy;
pub mod validation;

pub use error::{Error, Result};
pub use validation::{Issue, Severity};
