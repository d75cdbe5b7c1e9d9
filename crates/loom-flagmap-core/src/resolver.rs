// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flattening of a scope chain into the flags visible to a caller.
//!
//! Precedence, weakest first:
//!
//! 1. `default`
//! 2. `scopes[0]`
//! 3. ...
//! 4. `scopes[last]`
//!
//! Each scope overwrites the keys it shares with the ones before it, so the
//! most specific (last) caller scope wins and `default` is the fallback.
//! Unknown scopes and empty names contribute nothing.

use crate::snapshot::{Snapshot, DEFAULT_SCOPE};
use crate::value::ScopeMap;

/// Resolves `scopes` against `snapshot` into a flat flag map.
pub fn resolve<S: AsRef<str>>(snapshot: &Snapshot, scopes: &[S]) -> ScopeMap {
	let chain = std::iter::once(DEFAULT_SCOPE).chain(scopes.iter().map(AsRef::as_ref));

	let mut merged = ScopeMap::new();
	for name in chain {
		if name.is_empty() {
			continue;
		}

		if let Some(scope) = snapshot.scope(name) {
			for (key, value) in scope {
				merged.insert(key.clone(), value.clone());
			}
		}
	}

	merged
}
