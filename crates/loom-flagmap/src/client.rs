// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The live, hot-reloading flag map client.
//!
//! A client owns one [`Generation`]: a snapshot paired with the flags
//! resolved from it for the client's scope chain. Generations are immutable
//! and published through an [`ArcSwap`], so:
//!
//! * readers do a wait-free load and never see a snapshot from one reload
//!   combined with flags from another;
//! * a reload builds the next generation off to the side and publishes it
//!   with a single pointer swap;
//! * a payload that fails to parse is rejected and the current generation
//!   stays in place.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption, Guard};
use bytes::Bytes;
use loom_flagmap_core::{ResolvedFlags, Snapshot, DEFAULT_ROOT_KEY};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{FlagsError, Result};
use crate::source::{ChangeSource, FileChangeSource, SharedChangeSource};

/// A snapshot together with the flags resolved from it.
#[derive(Debug)]
pub struct Generation {
	number: u64,
	snapshot: Arc<Snapshot>,
	flags: Arc<ResolvedFlags>,
}

impl Generation {
	/// Publication counter. `0` is the empty initial generation.
	pub fn number(&self) -> u64 {
		self.number
	}

	pub fn snapshot(&self) -> &Arc<Snapshot> {
		&self.snapshot
	}

	pub fn flags(&self) -> &Arc<ResolvedFlags> {
		&self.flags
	}

	pub fn version(&self) -> &str {
		self.snapshot.version()
	}
}

/// Result of applying a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
	/// A new generation was published.
	Applied { generation: u64, version: String },
	/// The payload matched the current snapshot; nothing was published.
	Unchanged { version: String },
}

impl UpdateOutcome {
	fn unchanged(snapshot: &Snapshot) -> Self {
		Self::Unchanged {
			version: snapshot.version().to_string(),
		}
	}
}

struct LiveState {
	scopes: Vec<String>,
	root_key: String,
	current: ArcSwap<Generation>,
	updates: watch::Sender<u64>,
	/// Last payload the watch task took from the change source.
	last_delivered: ArcSwapOption<Bytes>,
}

impl LiveState {
	fn new(scopes: Vec<String>, root_key: String, snapshot: Arc<Snapshot>, number: u64) -> Self {
		let flags = Arc::new(ResolvedFlags::resolve(&snapshot, &scopes));
		let (updates, _) = watch::channel(number);
		Self {
			scopes,
			root_key,
			current: ArcSwap::from_pointee(Generation {
				number,
				snapshot,
				flags,
			}),
			updates,
			last_delivered: ArcSwapOption::empty(),
		}
	}

	fn apply_update(&self, payload: &[u8]) -> Result<UpdateOutcome> {
		match Snapshot::parse_with_root(payload, &self.root_key) {
			Ok(snapshot) => Ok(self.publish(Arc::new(snapshot))),
			Err(e) => {
				let current = self.current.load();
				warn!(
					error = %e,
					version = %current.version(),
					"Rejected flag map update, keeping current snapshot"
				);
				Err(e.into())
			}
		}
	}

	fn publish(&self, snapshot: Arc<Snapshot>) -> UpdateOutcome {
		let mut current = self.current.load_full();
		if current.number > 0 && *current.snapshot == *snapshot {
			debug!(version = %snapshot.version(), "Flag map unchanged");
			return UpdateOutcome::unchanged(&snapshot);
		}

		let flags = Arc::new(ResolvedFlags::resolve(&snapshot, &self.scopes));
		let flag_count = flags.len();

		// Compare and publish against the same generation, so concurrent
		// writers of equal content publish it once.
		let number = loop {
			let next = Arc::new(Generation {
				number: current.number + 1,
				snapshot: Arc::clone(&snapshot),
				flags: Arc::clone(&flags),
			});
			let previous = self.current.compare_and_swap(&current, next);
			if Arc::ptr_eq(&previous, &current) {
				break current.number + 1;
			}

			current = Guard::into_inner(previous);
			if current.number > 0 && *current.snapshot == *snapshot {
				debug!(version = %snapshot.version(), "Flag map unchanged");
				return UpdateOutcome::unchanged(&snapshot);
			}
		};

		self.updates.send_if_modified(|latest| {
			if number > *latest {
				*latest = number;
				true
			} else {
				false
			}
		});

		info!(
			version = %snapshot.version(),
			generation = number,
			flags = flag_count,
			scopes = ?self.scopes,
			"Flag map updated"
		);

		UpdateOutcome::Applied {
			generation: number,
			version: snapshot.version().to_string(),
		}
	}
}

/// Aborts the watch task once the last client clone sharing it is dropped.
struct WatchHandle {
	source: SharedChangeSource,
	runtime: Handle,
	task: JoinHandle<()>,
}

impl WatchHandle {
	/// Starts applying payloads from `source` to `live`, resuming after
	/// `last_seen` if the caller already reflects that payload.
	fn spawn(
		live: Arc<LiveState>,
		source: SharedChangeSource,
		runtime: Handle,
		last_seen: Option<Bytes>,
	) -> Self {
		let mut subscription = source.subscribe_from(&runtime, last_seen);
		let task = runtime.spawn(async move {
			while let Some(payload) = subscription.next().await {
				// Rejections are logged by apply_update.
				let _ = live.apply_update(&payload);
				live.last_delivered.store(Some(Arc::new(payload)));
			}
			debug!("Change source closed, stopping flag map watch");
		});

		Self {
			source,
			runtime,
			task,
		}
	}
}

impl Drop for WatchHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Builder for constructing a [`FlagMapClient`].
pub struct FlagMapClientBuilder {
	scopes: Vec<String>,
	root_key: String,
	snapshot: Option<Arc<Snapshot>>,
	source: Option<SharedChangeSource>,
}

impl FlagMapClientBuilder {
	pub fn new() -> Self {
		Self {
			scopes: Vec::new(),
			root_key: DEFAULT_ROOT_KEY.to_string(),
			snapshot: None,
			source: None,
		}
	}

	/// Sets the scope chain, least specific first.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();
		self
	}

	/// Appends one scope to the chain.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scopes.push(scope.into());
		self
	}

	/// Sets the payload envelope key. Defaults to `dcdr`.
	pub fn root_key(mut self, root_key: impl Into<String>) -> Self {
		self.root_key = root_key.into();
		self
	}

	/// Starts the client from an already parsed snapshot instead of the empty one.
	pub fn snapshot(mut self, snapshot: impl Into<Arc<Snapshot>>) -> Self {
		self.snapshot = Some(snapshot.into());
		self
	}

	/// Watches `source` for payloads.
	pub fn change_source(self, source: impl ChangeSource) -> Self {
		self.shared_change_source(Arc::new(source))
	}

	pub fn shared_change_source(mut self, source: SharedChangeSource) -> Self {
		self.source = Some(source);
		self
	}

	/// Builds the client.
	///
	/// With a change source attached this must run inside a Tokio runtime;
	/// the watch task is spawned on it.
	pub fn build(self) -> Result<FlagMapClient> {
		let (snapshot, number) = match self.snapshot {
			Some(snapshot) => (snapshot, 1),
			None => (Arc::new(Snapshot::empty()), 0),
		};

		let live = Arc::new(LiveState::new(self.scopes, self.root_key, snapshot, number));

		let watch = match self.source {
			Some(source) => {
				let runtime = Handle::try_current().map_err(|_| FlagsError::NoRuntime)?;
				Some(Arc::new(WatchHandle::spawn(
					Arc::clone(&live),
					source,
					runtime,
					None,
				)))
			}
			None => None,
		};

		debug!(scopes = ?live.scopes, watching = watch.is_some(), "Flag map client initialized");

		Ok(FlagMapClient { live, watch })
	}
}

impl Default for FlagMapClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Client for evaluating scoped flags against a hot-reloadable flag map.
///
/// Clones share the same state and watch task. Use
/// [`FlagMapClient::with_scopes`] for an independent client bound to a longer
/// scope chain.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use loom_flagmap::{FileChangeSource, FlagMapClient};
///
/// let client = FlagMapClient::builder()
///     .scopes(["region/eu"])
///     .change_source(FileChangeSource::new("/etc/loom/flags.json", Duration::from_secs(1)))
///     .build()?;
///
/// let beta = client.with_scopes(["cohort/beta"]);
/// if beta.is_enabled("checkout.new_flow") {
///     // ...
/// }
/// let pct = client.is_enabled_for_id("search.rollout", user_id);
/// ```
#[derive(Clone)]
pub struct FlagMapClient {
	live: Arc<LiveState>,
	watch: Option<Arc<WatchHandle>>,
}

impl FlagMapClient {
	pub fn builder() -> FlagMapClientBuilder {
		FlagMapClientBuilder::new()
	}

	/// Unloaded client with no scopes and no change source.
	pub fn new() -> Self {
		let live = Arc::new(LiveState::new(
			Vec::new(),
			DEFAULT_ROOT_KEY.to_string(),
			Arc::new(Snapshot::empty()),
			0,
		));
		Self { live, watch: None }
	}

	/// Builds a client from configuration, watching `watch_path` if set.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		config.validate()?;

		let mut builder = Self::builder()
			.scopes(config.scopes.iter().cloned())
			.root_key(config.root_key.clone());

		if let Some(path) = &config.watch_path {
			builder = builder.change_source(FileChangeSource::new(path, config.poll_interval()));
		}

		builder.build()
	}

	/// Parses `payload` and, on success, publishes it as the new generation.
	///
	/// On failure the current generation is kept and the parse error returned.
	/// Safe to call from any thread; re-applying an identical payload is a
	/// no-op, also when several threads apply it at once.
	pub fn apply_update(&self, payload: &[u8]) -> Result<UpdateOutcome> {
		self.live.apply_update(payload)
	}

	/// Publishes an already parsed snapshot.
	pub fn set_snapshot(&self, snapshot: impl Into<Arc<Snapshot>>) -> UpdateOutcome {
		self.live.publish(snapshot.into())
	}

	/// Returns a callback that applies payloads to this client, for change
	/// sources that push through a callback instead of a subscription.
	pub fn update_handler(&self) -> impl Fn(&[u8]) -> Result<UpdateOutcome> + Send + Sync + 'static {
		let live = Arc::clone(&self.live);
		move |payload: &[u8]| live.apply_update(payload)
	}

	/// Returns a client bound to this client's scopes followed by `scopes`.
	///
	/// The new client starts from the current snapshot, resolves its own flags
	/// and, if this client watches a change source, opens its own subscription
	/// to it. Passing no scopes, or a single empty scope, returns this client.
	pub fn with_scopes<I, S>(&self, scopes: I) -> FlagMapClient
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let extra: Vec<String> = scopes.into_iter().map(Into::into).collect();
		if extra.is_empty() || (extra.len() == 1 && extra[0].is_empty()) {
			return self.clone();
		}

		let mut chain = self.live.scopes.clone();
		chain.extend(extra);

		let current = self.live.current.load_full();
		let live = Arc::new(LiveState::new(
			chain,
			self.live.root_key.clone(),
			Arc::clone(&current.snapshot),
			current.number,
		));

		// The derived client starts from the parent's generation, which may be
		// newer than the source's latest payload, so resume after the payload
		// the parent last took instead of replaying it.
		let watch = self.watch.as_ref().map(|parent| {
			let delivered = self.live.last_delivered.load_full();
			let last_seen = delivered.as_deref().cloned();
			live.last_delivered.store(delivered);
			Arc::new(WatchHandle::spawn(
				Arc::clone(&live),
				Arc::clone(&parent.source),
				parent.runtime.clone(),
				last_seen,
			))
		});

		debug!(scopes = ?live.scopes, "Derived scoped flag map client");

		FlagMapClient { live, watch }
	}

	/// The current generation. Hold it to run several queries against one
	/// consistent snapshot.
	pub fn generation(&self) -> Arc<Generation> {
		self.live.current.load_full()
	}

	pub fn generation_number(&self) -> u64 {
		self.live.current.load().number
	}

	/// True once a snapshot has been loaded.
	pub fn is_loaded(&self) -> bool {
		self.generation_number() > 0
	}

	pub fn flags(&self) -> Arc<ResolvedFlags> {
		Arc::clone(&self.live.current.load().flags)
	}

	pub fn snapshot(&self) -> Arc<Snapshot> {
		Arc::clone(&self.live.current.load().snapshot)
	}

	pub fn scopes(&self) -> &[String] {
		&self.live.scopes
	}

	pub fn root_key(&self) -> &str {
		&self.live.root_key
	}

	/// Content identifier of the current snapshot.
	pub fn current_version(&self) -> String {
		self.live.current.load().version().to_string()
	}

	/// Receiver that observes the number of every published generation.
	pub fn updates(&self) -> watch::Receiver<u64> {
		self.live.updates.subscribe()
	}

	/// Serializes this client's resolved flags in the wire format, under the
	/// client's root key.
	pub fn scoped_export(&self) -> Result<Vec<u8>> {
		let current = self.live.current.load();
		Ok(current
			.flags
			.export_json(&self.live.root_key, current.version())?)
	}

	pub fn is_watching(&self) -> bool {
		self.watch
			.as_ref()
			.is_some_and(|watch| !watch.task.is_finished())
	}

	/// Stops reloading from the change source. The current generation stays.
	pub fn stop_watching(&self) {
		if let Some(watch) = &self.watch {
			watch.task.abort();
		}
	}

	pub fn exists(&self, name: &str) -> bool {
		self.live.current.load().flags.exists(name)
	}

	pub fn is_enabled(&self, name: &str) -> bool {
		self.live.current.load().flags.is_enabled(name)
	}

	pub fn is_enabled_for_id(&self, name: &str, id: u64) -> bool {
		self.live.current.load().flags.is_enabled_for_id(name, id)
	}

	pub fn scaled_value(&self, name: &str, min: f64, max: f64) -> f64 {
		self.live.current.load().flags.scaled_value(name, min, max)
	}
}

impl Default for FlagMapClient {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for FlagMapClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let current = self.live.current.load();
		f.debug_struct("FlagMapClient")
			.field("scopes", &self.live.scopes)
			.field("version", &current.version())
			.field("generation", &current.number)
			.field("flags", &current.flags.len())
			.field("watching", &self.watch.is_some())
			.finish()
	}
}
