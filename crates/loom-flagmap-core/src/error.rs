// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for flag map parsing.

use thiserror::Error;

/// Errors produced while turning raw bytes into a [`Snapshot`](crate::Snapshot).
///
/// Only the parser fails. Resolution and evaluation degrade to safe defaults
/// instead of returning errors.
#[derive(Debug, Error)]
pub enum FlagMapError {
	/// Payload is not valid JSON.
	#[error("syntax error: {0}")]
	Syntax(#[source] serde_json::Error),

	/// Top-level value is not a JSON object.
	#[error("top-level value must be an object")]
	NotAnObject,

	/// The envelope key is missing from the top-level object.
	#[error("missing root key '{key}'")]
	MissingRoot { key: String },

	/// Envelope content does not match the expected shape.
	#[error("invalid flag map: {0}")]
	Shape(#[source] serde_json::Error),

	/// The `default` scope exists but is not a scope map.
	#[error("scope 'default' must be an object")]
	InvalidDefaultScope,

	/// Serializing a snapshot or export failed.
	#[error("serialization error: {0}")]
	Serialize(#[source] serde_json::Error),
}

/// Result type alias for flag map operations.
pub type Result<T> = std::result::Result<T, FlagMapError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_missing_root_message_names_key() {
		let err = FlagMapError::MissingRoot {
			key: "dcdr".to_string(),
		};
		assert_eq!(err.to_string(), "missing root key 'dcdr'");
	}

	#[test]
	fn test_syntax_error_keeps_source() {
		let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
		let err = FlagMapError::Syntax(source);
		assert!(std::error::Error::source(&err).is_some());
		assert!(err.to_string().starts_with("syntax error"));
	}
}
