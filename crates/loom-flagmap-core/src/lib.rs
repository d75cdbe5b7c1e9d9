// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Loom scoped flag maps.
//!
//! This crate holds the pure, I/O-free half of the flag map client: parsing a
//! serialized flag tree into an immutable [`Snapshot`], flattening a scope
//! chain into [`ResolvedFlags`], and answering typed queries against them. The
//! live, hot-reloading client lives in `loom-flagmap`.
//!
//! # Overview
//!
//! - Flags are booleans or rollout fractions in `[0, 1]`
//! - Scopes nest via `/`-separated paths (`region/eu`)
//! - `default` is always resolved, with the lowest priority
//! - Percentile rollouts hash `(flag, id)` with CRC32, so a given id always
//!   lands in the same bucket
//!
//! # Example
//!
//! ```
//! use loom_flagmap_core::{ResolvedFlags, Snapshot};
//!
//! let snapshot = Snapshot::parse(br#"{
//!     "dcdr": {
//!         "info": { "current_sha": "5f1c0e2" },
//!         "features": {
//!             "default": { "new_ui": false, "ramp": 0.5 },
//!             "cohort": { "beta": { "new_ui": true } }
//!         }
//!     }
//! }"#)?;
//!
//! let flags = ResolvedFlags::resolve(&snapshot, &["cohort/beta"]);
//! assert!(flags.is_enabled("new_ui"));
//! assert_eq!(flags.scaled_value("ramp", 0.0, 10.0), 5.0);
//! # Ok::<(), loom_flagmap_core::FlagMapError>(())
//! ```

pub mod error;
pub mod evaluation;
pub mod resolver;
pub mod snapshot;
pub mod value;

pub use error::{FlagMapError, Result};
pub use evaluation::{bucket, within_percentile, ResolvedFlags, BUCKETS};
pub use resolver::resolve;
pub use snapshot::{
	scope_path, Info, Snapshot, DEFAULT_ROOT_KEY, DEFAULT_SCOPE, SCOPE_SEPARATOR,
};
pub use value::{FlagKind, FlagValue, ScopeMap};
