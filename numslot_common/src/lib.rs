//! numslot Common Library
//!
//! This crate provides shared constants and configuration loading utilities
//! for the numslot workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Protocol constants and defaults
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use numslot_common::consts::*;
//! use numslot_common::config::{ConfigLoader, NumslotConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
