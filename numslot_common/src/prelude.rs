//! Prelude module for common re-exports.
//!
//! `use numslot_common::prelude::*;` brings in the configuration types and
//! the protocol defaults without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, ExchangeConfig, ForwardPolicy, LogLevel, NumslotConfig,
    SharedConfig,
};

// ─── Protocol Constants ─────────────────────────────────────────────
pub use crate::consts::{DEFAULT_SHM_NAME, PAYLOAD_CAPACITY};
