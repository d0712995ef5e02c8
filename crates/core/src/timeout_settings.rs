//! Default timeouts for pages and contexts.
//!
//! A page resolves its effective timeout as: page override, then the default
//! of its *current* owning context, then [`DEFAULT_TIMEOUT_MS`]. The chain is
//! walked on every call, so a page adopted by another context picks up the
//! new owner's default immediately.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use pw_mirror_protocol::DEFAULT_TIMEOUT_MS;

/// Returns the global default timeout.
pub fn default_timeout() -> Duration {
	Duration::from_millis(DEFAULT_TIMEOUT_MS as u64)
}

/// Converts a millisecond option value; zero or negative means unset.
pub(crate) fn from_millis(ms: f64) -> Option<Duration> {
	(ms > 0.0).then(|| Duration::from_millis(ms as u64))
}

/// One level of the timeout chain. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct TimeoutSettings {
	default: Arc<RwLock<Option<Duration>>>,
}

impl TimeoutSettings {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets this level's default. `Duration::ZERO` clears it.
	pub fn set_default_timeout(&self, timeout: Duration) {
		*self.default.write() = (!timeout.is_zero()).then_some(timeout);
	}

	/// Returns this level's own default, if set.
	pub fn default_timeout(&self) -> Option<Duration> {
		*self.default.read()
	}

	/// Resolves against `parent`, falling back to the global default.
	pub fn effective(&self, parent: Option<&TimeoutSettings>) -> Duration {
		self.default_timeout()
			.or_else(|| parent.and_then(TimeoutSettings::default_timeout))
			.unwrap_or_else(default_timeout)
	}
}
