//! NMI triage common types, identities, and errors.
//!
//! This crate provides foundational types shared by the config and core
//! crates:
//! - Reason codes and host interrupt sources
//! - Common error types
//! - Schema versioning and output format selection

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{Error, Result};
pub use id::{ReasonCode, SourceType};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
