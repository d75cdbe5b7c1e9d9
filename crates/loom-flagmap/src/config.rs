// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.
//!
//! Values are layered, later layers winning:
//! 1. Built-in defaults
//! 2. TOML file
//! 3. `LOOM_FLAGMAP_*` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use loom_flagmap_core::DEFAULT_ROOT_KEY;
use serde::{Deserialize, Serialize};

pub const ENV_PATH: &str = "LOOM_FLAGMAP_PATH";
pub const ENV_POLL_INTERVAL_MS: &str = "LOOM_FLAGMAP_POLL_INTERVAL_MS";
pub const ENV_ROOT_KEY: &str = "LOOM_FLAGMAP_ROOT_KEY";
pub const ENV_SCOPES: &str = "LOOM_FLAGMAP_SCOPES";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// I/O error reading config file
	#[error("I/O error reading {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// TOML parsing error
	#[error("TOML parse error in {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// Validation error
	#[error("Validation error: {0}")]
	Validation(String),

	/// Invalid value
	#[error("Invalid value for {field}: {message}")]
	InvalidValue { field: String, message: String },
}

impl ConfigError {
	pub fn validation(msg: impl Into<String>) -> Self {
		Self::Validation(msg.into())
	}

	pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			field: field.into(),
			message: message.into(),
		}
	}
}

/// Settings for a [`FlagMapClient`](crate::FlagMapClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// File holding the serialized flag map. No watching when unset.
	pub watch_path: Option<PathBuf>,
	/// How often the watched file is checked for changes.
	pub poll_interval_ms: u64,
	/// Envelope key of the payload.
	pub root_key: String,
	/// Initial scope chain, least specific first.
	pub scopes: Vec<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			watch_path: None,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			root_key: DEFAULT_ROOT_KEY.to_string(),
			scopes: Vec::new(),
		}
	}
}

impl ClientConfig {
	/// Loads the file at `path` (if given), then applies environment overrides.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let config = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		let config = config.with_env_overrides()?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::parse_toml(&contents, path)
	}

	pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
		Self::parse_toml(contents, Path::new("<inline>"))
	}

	fn parse_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
		toml::from_str(contents).map_err(|source| ConfigError::TomlParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Applies `LOOM_FLAGMAP_*` variables from the process environment.
	pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
		self.with_overrides_from(|name| std::env::var(name).ok())
	}

	/// Applies overrides read through `lookup`, keyed by variable name.
	pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(path) = lookup(ENV_PATH).filter(|v| !v.is_empty()) {
			self.watch_path = Some(PathBuf::from(path));
		}

		if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
			self.poll_interval_ms = raw
				.trim()
				.parse()
				.map_err(|e| ConfigError::invalid_value(ENV_POLL_INTERVAL_MS, format!("{e}")))?;
		}

		if let Some(root_key) = lookup(ENV_ROOT_KEY) {
			self.root_key = root_key;
		}

		if let Some(scopes) = lookup(ENV_SCOPES) {
			self.scopes = scopes
				.split(',')
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.map(String::from)
				.collect();
		}

		Ok(self)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.poll_interval_ms == 0 {
			return Err(ConfigError::invalid_value(
				"poll_interval_ms",
				"must be greater than zero",
			));
		}
		if self.root_key.is_empty() {
			return Err(ConfigError::validation("root_key must not be empty"));
		}
		Ok(())
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}
