// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change sources deliver raw flag map payloads to clients.
//!
//! A source hands out independent [`ChangeSubscription`]s. Every client that
//! watches a source (including clients derived with
//! [`FlagMapClient::with_scopes`](crate::FlagMapClient::with_scopes)) holds its
//! own subscription, so reload notifications are never shared.
//!
//! Subscriptions have latest-value semantics: if payloads arrive faster than
//! a client applies them, intermediate payloads are skipped and the newest one
//! is delivered. Each payload is a complete flag map, so nothing is lost.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Something that produces flag map payloads when the definition changes.
pub trait ChangeSource: Send + Sync + 'static {
	/// Opens a new, independent subscription for a consumer that already
	/// holds `last_seen`.
	///
	/// The current payload is delivered first unless it equals `last_seen`.
	/// Sources that need background work spawn it on `runtime`. That work
	/// stops once the returned subscription is dropped.
	fn subscribe_from(&self, runtime: &Handle, last_seen: Option<Bytes>) -> ChangeSubscription;

	/// Opens a new, independent subscription that starts with the current
	/// payload.
	fn subscribe(&self, runtime: &Handle) -> ChangeSubscription {
		self.subscribe_from(runtime, None)
	}
}

/// Type alias for a shared change source.
pub type SharedChangeSource = Arc<dyn ChangeSource>;

/// Receiving end of a change source.
#[derive(Debug)]
pub struct ChangeSubscription {
	rx: watch::Receiver<Option<Bytes>>,
}

impl ChangeSubscription {
	pub fn new(rx: watch::Receiver<Option<Bytes>>) -> Self {
		Self { rx }
	}

	/// Waits for the next payload. Returns `None` once the source is gone.
	pub async fn next(&mut self) -> Option<Bytes> {
		loop {
			self.rx.changed().await.ok()?;
			if let Some(payload) = self.rx.borrow_and_update().clone() {
				return Some(payload);
			}
		}
	}
}

/// In-process source that fans published payloads out to every subscription.
///
/// Use it to bridge an external transport (object store, config service) to
/// clients, or to drive reloads in tests.
#[derive(Debug)]
pub struct BroadcastChangeSource {
	tx: watch::Sender<Option<Bytes>>,
}

impl BroadcastChangeSource {
	pub fn new() -> Self {
		let (tx, _) = watch::channel(None);
		Self { tx }
	}

	/// Publishes a payload to all current and future subscriptions.
	pub fn publish(&self, payload: impl Into<Bytes>) {
		self.tx.send_replace(Some(payload.into()));
	}

	/// Number of live subscriptions.
	pub fn subscriber_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

impl Default for BroadcastChangeSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ChangeSource for BroadcastChangeSource {
	fn subscribe_from(&self, _runtime: &Handle, last_seen: Option<Bytes>) -> ChangeSubscription {
		let mut rx = self.tx.subscribe();
		// A new subscriber still gets the latest payload, unless it has it.
		if *rx.borrow() != last_seen {
			rx.mark_changed();
		}
		ChangeSubscription::new(rx)
	}
}

/// Watches a file by polling it, emitting its contents whenever they change.
///
/// The current contents are emitted on the first poll, unless they equal the
/// subscriber's last seen payload. A missing or unreadable
/// file is logged and retried on the next poll; the last good payload stays in
/// effect meanwhile.
#[derive(Debug, Clone)]
pub struct FileChangeSource {
	path: PathBuf,
	poll_interval: Duration,
}

impl FileChangeSource {
	pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
		Self {
			path: path.into(),
			poll_interval,
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn poll_interval(&self) -> Duration {
		self.poll_interval
	}
}

impl ChangeSource for FileChangeSource {
	fn subscribe_from(&self, runtime: &Handle, last_seen: Option<Bytes>) -> ChangeSubscription {
		let (tx, rx) = watch::channel(None);
		info!(path = %self.path.display(), "Started watching flag map file");
		runtime.spawn(poll_file(self.path.clone(), self.poll_interval, tx, last_seen));
		ChangeSubscription::new(rx)
	}
}

async fn poll_file(
	path: PathBuf,
	poll_interval: Duration,
	tx: watch::Sender<Option<Bytes>>,
	mut last: Option<Bytes>,
) {
	let mut ticker = tokio::time::interval(poll_interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	let mut last_error: Option<io::ErrorKind> = None;

	loop {
		tokio::select! {
			_ = ticker.tick() => {}
			_ = tx.closed() => {
				debug!(path = %path.display(), "Subscription dropped, stopping file poll");
				break;
			}
		}

		match tokio::fs::read(&path).await {
			Ok(contents) => {
				last_error = None;
				if last.as_deref() == Some(contents.as_slice()) {
					continue;
				}

				debug!(path = %path.display(), bytes = contents.len(), "Flag map file changed");
				let contents = Bytes::from(contents);
				last = Some(contents.clone());
				if tx.send(Some(contents)).is_err() {
					break;
				}
			}
			Err(e) => {
				if last_error != Some(e.kind()) {
					warn!(path = %path.display(), error = %e, "Failed to read flag map file");
					last_error = Some(e.kind());
				}
			}
		}
	}
}
