// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed queries against a resolved flag set.
//!
//! None of the queries fail. A missing flag or a flag of the wrong kind
//! evaluates to the query's default:
//!
//! | Query | Default |
//! |-------|---------|
//! | [`ResolvedFlags::is_enabled`] | `false` |
//! | [`ResolvedFlags::is_enabled_for_id`] | `false` |
//! | [`ResolvedFlags::scaled_value`] | `min` |

use crate::error::Result;
use crate::resolver::resolve;
use crate::snapshot::{encode_envelope, Info, Snapshot};
use crate::value::{FlagValue, ScopeMap};

/// Number of buckets identifiers are hashed into for percentile rollouts.
pub const BUCKETS: u32 = 100;

/// Deterministic bucket hash for a flag and an identifier.
///
/// CRC32 (IEEE) over the flag name followed by the decimal form of `id`.
pub fn bucket(name: &str, id: u64) -> u32 {
	let mut hasher = crc32fast::Hasher::new();
	hasher.update(name.as_bytes());
	hasher.update(id.to_string().as_bytes());
	hasher.finalize()
}

/// Returns true if `id` falls inside the first `fraction` of the buckets for
/// flag `name`.
///
/// The percentage is truncated toward zero (`0.299` is 29%), matching the
/// bucket boundaries existing rollouts were configured against.
pub fn within_percentile(name: &str, id: u64, fraction: f64) -> bool {
	let percentage = (fraction * f64::from(BUCKETS)) as u32;
	bucket(name, id) % BUCKETS < percentage
}

/// The flat, scope-merged flag set a client answers queries from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFlags {
	features: ScopeMap,
}

impl ResolvedFlags {
	pub fn new(features: ScopeMap) -> Self {
		Self { features }
	}

	/// Resolves `scopes` against `snapshot`.
	pub fn resolve<S: AsRef<str>>(snapshot: &Snapshot, scopes: &[S]) -> Self {
		Self::new(resolve(snapshot, scopes))
	}

	pub fn features(&self) -> &ScopeMap {
		&self.features
	}

	pub fn get(&self, name: &str) -> Option<&FlagValue> {
		self.features.get(name)
	}

	pub fn len(&self) -> usize {
		self.features.len()
	}

	pub fn is_empty(&self) -> bool {
		self.features.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagValue)> {
		self.features.iter().map(|(name, value)| (name.as_str(), value))
	}

	/// Returns true if `name` is present, whatever its kind.
	pub fn exists(&self, name: &str) -> bool {
		self.features.contains_key(name)
	}

	/// Returns true only for a boolean flag set to `true`.
	pub fn is_enabled(&self, name: &str) -> bool {
		matches!(self.features.get(name), Some(FlagValue::Boolean(true)))
	}

	/// Returns true if `id` is inside the rollout of percentile flag `name`.
	pub fn is_enabled_for_id(&self, name: &str, id: u64) -> bool {
		match self.features.get(name) {
			Some(FlagValue::Fraction(fraction)) => within_percentile(name, id, *fraction),
			_ => false,
		}
	}

	/// Linearly interpolates between `min` and `max` by the flag's fraction.
	pub fn scaled_value(&self, name: &str, min: f64, max: f64) -> f64 {
		match self.features.get(name) {
			Some(FlagValue::Fraction(fraction)) => min + (max - min) * fraction,
			_ => min,
		}
	}

	/// Serializes these flags in the snapshot wire format under `root_key`,
	/// with `features` holding the flat set instead of a scope tree.
	pub fn export_json(&self, root_key: &str, version: &str) -> Result<Vec<u8>> {
		let info = Info {
			current_sha: (!version.is_empty()).then(|| version.to_string()),
		};
		encode_envelope(root_key, &info, &self.features, true)
	}
}

impl From<ScopeMap> for ResolvedFlags {
	fn from(features: ScopeMap) -> Self {
		Self::new(features)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn flags() -> ResolvedFlags {
		let snapshot = Snapshot::parse(
			br#"{
				"dcdr": {
					"features": {
						"default": {
							"new_ui": true,
							"old_ui": false,
							"ramp": 0.5,
							"rollout": 0.3,
							"full": 1,
							"off": 0,
							"nested": { "x": true }
						}
					}
				}
			}"#,
		)
		.unwrap();
		let empty: [&str; 0] = [];
		ResolvedFlags::resolve(&snapshot, &empty)
	}

	#[test]
	fn test_exists() {
		let flags = flags();
		assert!(flags.exists("new_ui"));
		assert!(flags.exists("ramp"));
		assert!(flags.exists("nested"));
		assert!(!flags.exists("missing"));
	}

	#[test]
	fn test_is_enabled() {
		let flags = flags();
		assert!(flags.is_enabled("new_ui"));
		assert!(!flags.is_enabled("old_ui"));
		assert!(!flags.is_enabled("ramp"));
		assert!(!flags.is_enabled("full"));
		assert!(!flags.is_enabled("nested"));
		assert!(!flags.is_enabled("missing"));
	}

	#[test]
	fn test_scaled_value() {
		let flags = flags();
		assert_eq!(flags.scaled_value("ramp", 0.0, 10.0), 5.0);
		assert_eq!(flags.scaled_value("missing", 2.0, 8.0), 2.0);
		assert_eq!(flags.scaled_value("new_ui", 2.0, 8.0), 2.0);
		assert_eq!(flags.scaled_value("nested", 2.0, 8.0), 2.0);
		assert_eq!(flags.scaled_value("full", 2.0, 8.0), 8.0);
		assert_eq!(flags.scaled_value("off", 2.0, 8.0), 2.0);
	}

	#[test]
	fn test_is_enabled_for_id_type_mismatch() {
		let flags = flags();
		assert!(!flags.is_enabled_for_id("new_ui", 42));
		assert!(!flags.is_enabled_for_id("nested", 42));
		assert!(!flags.is_enabled_for_id("missing", 42));
	}

	#[test]
	fn test_is_enabled_for_id_bounds() {
		let flags = flags();
		for id in 0..500 {
			assert!(flags.is_enabled_for_id("full", id));
			assert!(!flags.is_enabled_for_id("off", id));
		}
	}

	#[test]
	fn test_bucket_matches_crc32_of_name_and_decimal_id() {
		assert_eq!(bucket("rollout", 42), crc32fast::hash(b"rollout42"));
		assert_eq!(
			bucket("f", u64::MAX),
			crc32fast::hash(b"f18446744073709551615")
		);
		// Reference value for the IEEE polynomial.
		assert_eq!(bucket("12345678", 9), 0xCBF4_3926);
	}

	#[test]
	fn test_rollout_decision_is_stable() {
		// crc32("rollout42") = 0x65317693, bucket 35.
		assert_eq!(bucket("rollout", 42), 0x6531_7693);
		assert_eq!(bucket("rollout", 42) % BUCKETS, 35);

		let flags = flags();
		for _ in 0..10 {
			assert!(!flags.is_enabled_for_id("rollout", 42));
		}
		assert!(!within_percentile("rollout", 42, 0.35));
		assert!(within_percentile("rollout", 42, 0.36));
	}

	#[test]
	fn test_percentage_truncates() {
		// 0.299 * 100 truncates to 29, so bucket 29 is excluded.
		let id = (0..10_000u64)
			.find(|id| bucket("t", *id) % 100 == 29)
			.unwrap();
		assert!(!within_percentile("t", id, 0.299));
		assert!(within_percentile("t", id, 0.30));
	}

	#[test]
	fn test_rollout_distribution_is_roughly_proportional() {
		let enabled = (0..10_000u64)
			.filter(|id| within_percentile("checkout", *id, 0.25))
			.count();
		assert!((1_500..3_500).contains(&enabled), "enabled = {enabled}");
	}

	#[test]
	fn test_export_json_flat() {
		let flags = flags();
		let json: serde_json::Value =
			serde_json::from_slice(&flags.export_json("dcdr", "abc").unwrap()).unwrap();
		assert_eq!(json["dcdr"]["info"]["current_sha"], "abc");
		assert_eq!(json["dcdr"]["features"]["new_ui"], true);
		assert_eq!(json["dcdr"]["features"]["ramp"], 0.5);

		let json: serde_json::Value =
			serde_json::from_slice(&ResolvedFlags::default().export_json("dcdr", "").unwrap()).unwrap();
		assert_eq!(json, serde_json::json!({"dcdr": {"info": {}, "features": {}}}));
	}

	#[test]
	fn test_export_json_custom_root_reparses() {
		let flags = flags();
		let bytes = flags.export_json("flags", "abc").unwrap();

		let snapshot = Snapshot::parse_with_root(&bytes, "flags").unwrap();
		assert_eq!(snapshot.version(), "abc");
		assert_eq!(snapshot.features().get("new_ui"), Some(&FlagValue::Boolean(true)));
		assert_eq!(snapshot.features().get("ramp"), Some(&FlagValue::Fraction(0.5)));
	}

	proptest! {
		#[test]
		fn rollout_is_deterministic(name in "[a-z_]{1,20}", id: u64, fraction in 0.0f64..=1.0) {
			prop_assert_eq!(
				within_percentile(&name, id, fraction),
				within_percentile(&name, id, fraction)
			);
		}

		#[test]
		fn rollout_is_monotonic(
			name in "[a-z_]{1,20}",
			id: u64,
			a in 0.0f64..=1.0,
			b in 0.0f64..=1.0,
		) {
			let (low, high) = if a <= b { (a, b) } else { (b, a) };
			if within_percentile(&name, id, low) {
				prop_assert!(within_percentile(&name, id, high));
			}
		}

		#[test]
		fn scaled_value_stays_within_bounds(
			fraction in 0.0f64..=1.0,
			min in -1000.0f64..1000.0,
			span in 0.0f64..1000.0,
		) {
			let mut features = ScopeMap::new();
			features.insert("f".to_string(), FlagValue::Fraction(fraction));
			let flags = ResolvedFlags::new(features);
			let max = min + span;
			let value = flags.scaled_value("f", min, max);
			prop_assert!(value >= min - 1e-9 && value <= max + 1e-9);
		}
	}
}
