//! Listener ids, RAII subscriptions and URL matchers.
//!
//! [`Subscription`] is what every `on`/`once` call hands back; dropping it
//! removes the listener. [`UrlMatcher`] is the one way URLs are compared in
//! frame lookup and request/response/navigation waits.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pw_mirror_runtime::{Error, Result};

/// Unique identifier for listeners.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

type Dropper = Box<dyn FnOnce(HandlerId) + Send + Sync>;

/// RAII handle that removes a listener on drop.
///
/// The dropper holds only a weak reference to the listener table, so
/// dropping after the owning proxy is gone is a no-op.
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Dropper>,
}

impl Subscription {
	pub fn new(id: HandlerId, dropper: impl FnOnce(HandlerId) + Send + Sync + 'static) -> Self {
		Self {
			id,
			dropper: Some(Box::new(dropper)),
		}
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Returns true until the subscription is released or detached.
	pub fn is_active(&self) -> bool {
		self.dropper.is_some()
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.release();
	}

	/// Keeps the listener registered for the lifetime of its source.
	pub fn detach(mut self) {
		self.dropper = None;
	}

	fn release(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			dropper(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.release();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.is_active())
			.finish()
	}
}

/// URL predicate used by frame lookup and URL-filtered waits.
///
/// One tagged value instead of "string or pattern or closure" arguments.
#[derive(Clone)]
pub enum UrlMatcher {
	/// Whole-string equality.
	Exact(String),
	/// Glob pattern, e.g. `**/api/*.json`.
	Glob(glob::Pattern),
	/// Regular expression, matched anywhere in the URL.
	Regex(regex::Regex),
	/// Arbitrary predicate.
	Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl UrlMatcher {
	pub fn exact(url: impl Into<String>) -> Self {
		Self::Exact(url.into())
	}

	/// Compiles a glob pattern.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] for a malformed pattern.
	pub fn glob(pattern: &str) -> Result<Self> {
		glob::Pattern::new(pattern)
			.map(Self::Glob)
			.map_err(|e| Error::InvalidArgument(format!("invalid glob '{pattern}': {e}")))
	}

	/// Compiles a regular expression.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] for a malformed expression.
	pub fn regex(pattern: &str) -> Result<Self> {
		regex::Regex::new(pattern)
			.map(Self::Regex)
			.map_err(|e| Error::InvalidArgument(format!("invalid regex '{pattern}': {e}")))
	}

	pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
		Self::Predicate(Arc::new(f))
	}

	/// Returns `true` if `url` satisfies this matcher.
	pub fn is_match(&self, url: &str) -> bool {
		match self {
			Self::Exact(expected) => expected == url,
			Self::Glob(pattern) => pattern.matches(url),
			Self::Regex(re) => re.is_match(url),
			Self::Predicate(f) => f(url),
		}
	}
}

impl From<&str> for UrlMatcher {
	fn from(url: &str) -> Self {
		Self::Exact(url.to_string())
	}
}

impl From<String> for UrlMatcher {
	fn from(url: String) -> Self {
		Self::Exact(url)
	}
}

impl From<regex::Regex> for UrlMatcher {
	fn from(re: regex::Regex) -> Self {
		Self::Regex(re)
	}
}

impl From<glob::Pattern> for UrlMatcher {
	fn from(pattern: glob::Pattern) -> Self {
		Self::Glob(pattern)
	}
}

impl fmt::Debug for UrlMatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Exact(url) => f.debug_tuple("Exact").field(url).finish(),
			Self::Glob(pattern) => f.debug_tuple("Glob").field(&pattern.as_str()).finish(),
			Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
			Self::Predicate(_) => f.write_str("Predicate(..)"),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	#[test]
	fn handler_ids_increase() {
		let id1 = next_handler_id();
		let id2 = next_handler_id();
		assert!(id2 > id1);
	}

	#[test]
	fn subscription_runs_dropper_once() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);

		let sub = Subscription::new(7, move |id| {
			assert_eq!(id, 7);
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert!(sub.is_active());
		sub.unsubscribe();
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn detached_subscription_never_unsubscribes() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);

		Subscription::new(1, move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		})
		.detach();
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn exact_matcher_requires_whole_url() {
		let m = UrlMatcher::from("https://example.com/api");
		assert!(m.is_match("https://example.com/api"));
		assert!(!m.is_match("https://example.com/api/v2"));
	}

	#[test]
	fn glob_and_regex_matchers() {
		let glob = UrlMatcher::glob("**/*.png").unwrap();
		assert!(glob.is_match("https://example.com/img/logo.png"));
		assert!(!glob.is_match("https://example.com/logo.jpg"));

		let re = UrlMatcher::regex(r"/api/v\d+/").unwrap();
		assert!(re.is_match("https://example.com/api/v2/users"));
		assert!(!re.is_match("https://example.com/api/users"));

		assert!(matches!(UrlMatcher::regex("("), Err(Error::InvalidArgument(_))));
		assert!(matches!(UrlMatcher::glob("a/***"), Err(Error::InvalidArgument(_))));
	}

	#[test]
	fn predicate_matcher() {
		let m = UrlMatcher::predicate(|url| url.ends_with("/done"));
		assert!(m.is_match("https://example.com/done"));
		assert!(!m.is_match("https://example.com/pending"));
		assert_eq!(format!("{m:?}"), "Predicate(..)");
	}
}
