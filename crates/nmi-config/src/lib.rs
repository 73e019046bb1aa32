//! NMI triage configuration: reason-code lists, category table, and config
//! resolution.
//!
//! This crate provides:
//! - The range-list parser for `events_*` parameters
//! - Bounded, allocation-free category sets and the frozen category table
//! - Parameter sources (boot command line, environment, JSON config file)
//! - Config resolution (CLI → env → XDG → defaults) and validation

pub mod category;
pub mod config;
pub mod params;
pub mod range_list;
pub mod table;

pub use category::{Category, CategorySet, DEFAULT_CAPACITY, DOMAIN_SIZE};
pub use config::{resolve_config, BackendKind, ConfigError, ConfigOverrides, NmiConfig};
pub use params::TriageParams;
pub use range_list::{parse_range_list, RangeListError};
pub use table::{CategoryTable, ConfigDiagnostic};
