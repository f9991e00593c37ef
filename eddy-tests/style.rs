//! Style Enforcement Tests
//!
//! Scans the production sources of the Eddy crates for patterns clippy
//! does not reject on its own.
//!
//! - `production_code` - No panicking shortcuts or dead code allowances
//!   outside test modules
//! - `dependency_usage` - Every declared dependency is used by its crate

#[path = "style/dependency_usage.rs"]
mod dependency_usage;
#[path = "style/production_code.rs"]
mod production_code;
