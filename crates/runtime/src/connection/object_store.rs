//! Identity map of mirrored objects with per-GUID notification.
//!
//! Uses [`DashMap`] for concurrent reads from caller tasks while the dispatch
//! path is the only writer. Per-GUID [`Notify`] ensures only relevant waiters
//! wake up, and [`ObjectStore::wait_for`] registers waiters before checking to
//! prevent lost wakeups.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};

/// Registry of mirrored objects by GUID. At most one proxy per id.
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Arc<dyn ChannelOwner>>,
	waiters: DashMap<Arc<str>, Arc<Notify>>,
}

impl Default for ObjectStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ObjectStore {
	pub fn new() -> Self {
		Self {
			objects: DashMap::new(),
			waiters: DashMap::new(),
		}
	}

	/// Registers `obj` under `guid` and wakes waiters for it.
	///
	/// Fails with [`Error::DuplicateObject`] if the id is taken; the existing
	/// proxy stays in place.
	pub fn register(&self, guid: Arc<str>, obj: Arc<dyn ChannelOwner>) -> Result<()> {
		match self.objects.entry(guid.clone()) {
			Entry::Occupied(_) => {
				return Err(Error::DuplicateObject { guid: guid.to_string() });
			}
			Entry::Vacant(slot) => {
				slot.insert(obj);
			}
		}
		if let Some((_, notify)) = self.waiters.remove(&guid) {
			notify.notify_waiters();
		}
		Ok(())
	}

	pub fn contains(&self, guid: &str) -> bool {
		self.objects.contains_key(guid)
	}

	/// Removes the mapping. The proxy itself is not touched.
	pub fn remove(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.remove(guid).map(|(_, obj)| obj)
	}

	/// Synchronous lookup.
	pub fn try_get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.get(guid).map(|r| r.value().clone())
	}

	/// Lookup that reports unknown ids as [`Error::ObjectNotFound`].
	pub fn lookup(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.try_get(guid).ok_or_else(|| Error::ObjectNotFound {
			guid: guid.to_string(),
			expected: None,
		})
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	/// Waits for an object to be registered, with timeout.
	///
	/// Registers waiter before checking to prevent lost wakeups.
	pub async fn wait_for(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn ChannelOwner>> {
		let g: Arc<str> = Arc::from(guid);
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			let notify = self
				.waiters
				.entry(g.clone())
				.or_insert_with(|| Arc::new(Notify::new()))
				.clone();
			let notified = notify.notified();

			if let Some(obj) = self.try_get(&g) {
				drop(notified);
				self.release_waiter(&g, notify);
				return Ok(obj);
			}

			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			let woken = if remaining.is_zero() {
				drop(notified);
				false
			} else {
				tokio::select! {
					biased;
					_ = notified => true,
					_ = tokio::time::sleep(remaining) => false,
				}
			};
			if !woken {
				self.release_waiter(&g, notify);
				return Err(Self::timeout_error(&g));
			}
		}
	}

	/// Drops the waiter entry for `guid` unless another task still waits on it.
	fn release_waiter(&self, guid: &Arc<str>, notify: Arc<Notify>) {
		drop(notify);
		self.waiters.remove_if(guid, |_, n| Arc::strong_count(n) == 1);
	}

	#[cfg(test)]
	pub(crate) fn pending_waiters(&self) -> usize {
		self.waiters.len()
	}

	fn timeout_error(guid: &str) -> Error {
		let target_type = match () {
			_ if guid.starts_with("page@") => "Page",
			_ if guid.starts_with("frame@") => "Frame",
			_ if guid.starts_with("browser-context@") => "BrowserContext",
			_ if guid.starts_with("request@") => "Request",
			_ if guid.starts_with("response@") => "Response",
			_ => return Error::Timeout(format!("Timeout waiting for object: {guid}")),
		};
		Error::Timeout(format!("Timeout waiting for {target_type} object: {guid}"))
	}
}
