// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hot-reloading scoped feature flag client for Loom.
//!
//! This crate serves flag reads from a serialized flag map that can be
//! replaced at any time. Evaluation never blocks on a reload and never sees a
//! half-applied one.
//!
//! # Features
//!
//! - **Scoped resolution**: each client resolves its own scope chain
//!   (`region/eu`, `cohort/beta`, ...) on top of `default`
//! - **Atomic reloads**: snapshots and resolved flags swap as one unit
//! - **All-or-nothing updates**: malformed payloads are rejected and reported
//! - **Derived clients**: [`FlagMapClient::with_scopes`] binds a longer chain
//!   without re-parsing
//! - **Change sources**: file polling or in-process broadcast
//!
//! # Example
//!
//! ```ignore
//! use loom_flagmap::{ClientConfig, FlagMapClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LOOM_FLAGMAP_PATH=/etc/loom/flags.json
//!     let config = ClientConfig::load(None)?;
//!     let client = FlagMapClient::from_config(&config)?;
//!
//!     let eu = client.with_scopes(["region/eu"]);
//!     if eu.is_enabled("checkout.new_flow") {
//!         // ...
//!     }
//!     let in_rollout = eu.is_enabled_for_id("search.rollout", 42);
//!     let batch_size = eu.scaled_value("ingest.batch", 10.0, 500.0);
//!
//!     Ok(())
//! }
//! ```

mod client;
pub mod config;
mod error;
mod source;

pub use client::{FlagMapClient, FlagMapClientBuilder, Generation, UpdateOutcome};
pub use config::{ClientConfig, ConfigError};
pub use error::{FlagsError, Result};
pub use source::{
	BroadcastChangeSource, ChangeSource, ChangeSubscription, FileChangeSource, SharedChangeSource,
};

// Re-export core types for convenience
pub use loom_flagmap_core::{
	FlagKind, FlagMapError, FlagValue, ResolvedFlags, ScopeMap, Snapshot, DEFAULT_SCOPE,
};
