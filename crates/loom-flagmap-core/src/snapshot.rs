// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Immutable, parsed generations of the flag tree.
//!
//! The wire format is a single-key envelope:
//!
//! ```json
//! {
//!   "dcdr": {
//!     "info": { "current_sha": "5f1c0e2" },
//!     "features": {
//!       "default": { "new_ui": true, "rollout": 0.3 },
//!       "region": { "eu": { "new_ui": false } }
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{FlagMapError, Result};
use crate::value::{FlagValue, ScopeMap};

/// Scope that is always present and always resolved with the lowest priority.
pub const DEFAULT_SCOPE: &str = "default";

/// Envelope key used when none is configured.
pub const DEFAULT_ROOT_KEY: &str = "dcdr";

/// Separator for nested scope paths, e.g. `region/eu`.
pub const SCOPE_SEPARATOR: char = '/';

static EMPTY_SCOPE: ScopeMap = ScopeMap::new();

/// Snapshot metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
	/// Content identifier of the flag definition, typically a commit sha.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_sha: Option<String>,
}

#[derive(Deserialize)]
struct Body {
	#[serde(default)]
	info: Info,
	#[serde(default)]
	features: ScopeMap,
}

#[derive(Serialize)]
struct BodyRef<'a> {
	info: &'a Info,
	features: &'a ScopeMap,
}

/// One fully parsed generation of the flag definition tree.
///
/// Snapshots are never mutated; a reload builds a new one and the old one is
/// dropped once nothing references it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
	info: Info,
	features: ScopeMap,
}

impl Snapshot {
	/// Minimal valid snapshot containing only an empty `default` scope.
	pub fn empty() -> Self {
		let mut features = ScopeMap::new();
		features.insert(DEFAULT_SCOPE.to_string(), FlagValue::Scope(ScopeMap::new()));
		Self {
			info: Info::default(),
			features,
		}
	}

	/// Builds a snapshot from an already constructed tree.
	///
	/// A missing `default` scope is synthesized; a `default` entry that is not
	/// a scope is rejected.
	pub fn new(version: Option<String>, features: ScopeMap) -> Result<Self> {
		Self::from_parts(
			Info {
				current_sha: version,
			},
			features,
		)
	}

	/// Parses a payload using the [`DEFAULT_ROOT_KEY`] envelope.
	pub fn parse(bytes: &[u8]) -> Result<Self> {
		Self::parse_with_root(bytes, DEFAULT_ROOT_KEY)
	}

	/// Parses a payload whose envelope key is `root_key`.
	pub fn parse_with_root(bytes: &[u8], root_key: &str) -> Result<Self> {
		let document: serde_json::Value =
			serde_json::from_slice(bytes).map_err(FlagMapError::Syntax)?;

		let mut top = match document {
			serde_json::Value::Object(map) => map,
			_ => return Err(FlagMapError::NotAnObject),
		};

		let body = top.remove(root_key).ok_or_else(|| FlagMapError::MissingRoot {
			key: root_key.to_string(),
		})?;

		let body: Body = serde_json::from_value(body).map_err(FlagMapError::Shape)?;
		Self::from_parts(body.info, body.features)
	}

	fn from_parts(info: Info, mut features: ScopeMap) -> Result<Self> {
		match features.get(DEFAULT_SCOPE) {
			None => {
				features.insert(DEFAULT_SCOPE.to_string(), FlagValue::Scope(ScopeMap::new()));
			}
			Some(FlagValue::Scope(_)) => {}
			Some(_) => return Err(FlagMapError::InvalidDefaultScope),
		}

		Ok(Self { info, features })
	}

	/// Content identifier, empty when the payload carried none.
	pub fn version(&self) -> &str {
		self.info.current_sha.as_deref().unwrap_or("")
	}

	pub fn info(&self) -> &Info {
		&self.info
	}

	/// The whole tree, keyed by top-level scope name.
	pub fn features(&self) -> &ScopeMap {
		&self.features
	}

	/// Looks up a scope by name, descending `/`-separated paths.
	///
	/// Returns `None` when any segment is missing or lands on a flag rather
	/// than a nested scope.
	pub fn scope(&self, name: &str) -> Option<&ScopeMap> {
		let mut segments = scope_path(name);
		let first = segments.next()?;
		let mut current = self.features.get(first)?.as_scope()?;
		for segment in segments {
			current = current.get(segment)?.as_scope()?;
		}
		Some(current)
	}

	/// Flags of the `default` scope.
	pub fn defaults(&self) -> &ScopeMap {
		self.scope(DEFAULT_SCOPE).unwrap_or(&EMPTY_SCOPE)
	}

	/// Names of the top-level scopes, in sorted order.
	pub fn scope_names(&self) -> impl Iterator<Item = &str> {
		self.features
			.iter()
			.filter(|(_, value)| value.as_scope().is_some())
			.map(|(name, _)| name.as_str())
	}

	/// Number of leaf flags across the whole tree.
	pub fn flag_count(&self) -> usize {
		fn count(map: &ScopeMap) -> usize {
			map.values()
				.map(|value| match value {
					FlagValue::Scope(nested) => count(nested),
					_ => 1,
				})
				.sum()
		}
		count(&self.features)
	}

	/// Serializes the snapshot in its wire format under [`DEFAULT_ROOT_KEY`].
	pub fn to_json(&self) -> Result<Vec<u8>> {
		self.to_json_with_root(DEFAULT_ROOT_KEY)
	}

	/// Serializes the snapshot under `root_key`, the inverse of
	/// [`Snapshot::parse_with_root`].
	pub fn to_json_with_root(&self, root_key: &str) -> Result<Vec<u8>> {
		encode_envelope(root_key, &self.info, &self.features, false)
	}

	/// Pretty-printed variant of [`Snapshot::to_json`].
	pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
		encode_envelope(DEFAULT_ROOT_KEY, &self.info, &self.features, true)
	}
}

impl Default for Snapshot {
	fn default() -> Self {
		Self::empty()
	}
}

/// Splits a scope name into its path segments.
pub fn scope_path(name: &str) -> std::str::Split<'_, char> {
	name.split(SCOPE_SEPARATOR)
}

pub(crate) fn encode_envelope(
	root_key: &str,
	info: &Info,
	features: &ScopeMap,
	pretty: bool,
) -> Result<Vec<u8>> {
	let body = serde_json::to_value(BodyRef { info, features }).map_err(FlagMapError::Serialize)?;

	let mut envelope = serde_json::Map::new();
	envelope.insert(root_key.to_string(), body);
	let envelope = serde_json::Value::Object(envelope);

	if pretty {
		serde_json::to_vec_pretty(&envelope).map_err(FlagMapError::Serialize)
	} else {
		serde_json::to_vec(&envelope).map_err(FlagMapError::Serialize)
	}
}
