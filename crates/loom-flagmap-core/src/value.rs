// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Unexpected, Visitor};
use serde::{Deserialize, Serialize};

/// Map of names to flag values. Used both for scopes in the tree and for the
/// flattened result of a resolution.
pub type ScopeMap = BTreeMap<String, FlagValue>;

/// A single entry in a flag map.
///
/// Values are untyped on the wire; each one is classified on parse and the
/// evaluation methods match on the variant, degrading to a default when the
/// variant does not fit the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
	/// On/off flag.
	Boolean(bool),
	/// Rollout fraction in `[0.0, 1.0]`.
	Fraction(f64),
	/// Nested scope (`region` -> `eu` -> flags).
	Scope(ScopeMap),
}

/// The logical type of a [`FlagValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
	Boolean,
	Percentile,
	Scope,
}

impl FlagKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			FlagKind::Boolean => "boolean",
			FlagKind::Percentile => "percentile",
			FlagKind::Scope => "scope",
		}
	}
}

impl fmt::Display for FlagKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FlagValue {
	pub fn kind(&self) -> FlagKind {
		match self {
			FlagValue::Boolean(_) => FlagKind::Boolean,
			FlagValue::Fraction(_) => FlagKind::Percentile,
			FlagValue::Scope(_) => FlagKind::Scope,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			FlagValue::Boolean(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_fraction(&self) -> Option<f64> {
		match self {
			FlagValue::Fraction(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_scope(&self) -> Option<&ScopeMap> {
		match self {
			FlagValue::Scope(map) => Some(map),
			_ => None,
		}
	}

	/// Returns true if `value` is an acceptable rollout fraction.
	pub fn is_valid_fraction(value: f64) -> bool {
		value.is_finite() && (0.0..=1.0).contains(&value)
	}
}

impl From<bool> for FlagValue {
	fn from(value: bool) -> Self {
		FlagValue::Boolean(value)
	}
}

impl From<ScopeMap> for FlagValue {
	fn from(value: ScopeMap) -> Self {
		FlagValue::Scope(value)
	}
}

impl<'de> Deserialize<'de> for FlagValue {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_any(FlagValueVisitor)
	}
}

struct FlagValueVisitor;

impl FlagValueVisitor {
	fn fraction<E: de::Error>(value: f64) -> Result<FlagValue, E> {
		if FlagValue::is_valid_fraction(value) {
			Ok(FlagValue::Fraction(value))
		} else {
			Err(E::invalid_value(
				Unexpected::Float(value),
				&"a fraction between 0 and 1",
			))
		}
	}
}

impl<'de> Visitor<'de> for FlagValueVisitor {
	type Value = FlagValue;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("a boolean, a number between 0 and 1, or a scope object")
	}

	fn visit_bool<E: de::Error>(self, v: bool) -> Result<FlagValue, E> {
		Ok(FlagValue::Boolean(v))
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<FlagValue, E> {
		Self::fraction(v as f64)
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<FlagValue, E> {
		Self::fraction(v as f64)
	}

	fn visit_f64<E: de::Error>(self, v: f64) -> Result<FlagValue, E> {
		Self::fraction(v)
	}

	fn visit_map<A>(self, mut map: A) -> Result<FlagValue, A::Error>
	where
		A: MapAccess<'de>,
	{
		let mut scope = ScopeMap::new();
		while let Some((key, value)) = map.next_entry::<String, FlagValue>()? {
			scope.insert(key, value);
		}
		Ok(FlagValue::Scope(scope))
	}
}
