// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the flag map client.

use loom_flagmap_core::FlagMapError;
use thiserror::Error;

use crate::config::ConfigError;

/// Flag map client errors.
///
/// Evaluation never returns these; they surface only from construction,
/// configuration and [`FlagMapClient::apply_update`](crate::FlagMapClient::apply_update).
#[derive(Debug, Error)]
pub enum FlagsError {
	/// A payload could not be parsed; the previous snapshot stays active.
	#[error("failed to parse flag map: {0}")]
	Parse(#[from] FlagMapError),

	/// Configuration could not be loaded or is invalid.
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),

	/// A change source was supplied without a Tokio runtime to watch it on.
	#[error("a Tokio runtime is required to watch a change source")]
	NoRuntime,
}

/// Result type alias for flag map client operations.
pub type Result<T> = std::result::Result<T, FlagsError>;
