//! Live frame set of a [`Page`].
//!
//! Membership changes only on the dispatch path (`frameAttached` /
//! `frameDetached`); callers read snapshots.

use std::sync::Arc;

use pw_mirror_runtime::{Error, Result};

use super::Page;
use crate::frame::{Frame, FrameLifecycle};
use crate::handlers::UrlMatcher;
use crate::proxy;

/// Selects one frame by name or by URL.
///
/// Exactly one field must be set.
#[derive(Debug, Clone, Default)]
pub struct FrameQuery {
	/// Exact frame name.
	pub name: Option<String>,
	/// URL matcher.
	pub url: Option<UrlMatcher>,
}

impl FrameQuery {
	pub fn name(name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			url: None,
		}
	}

	pub fn url(url: impl Into<UrlMatcher>) -> Self {
		Self {
			name: None,
			url: Some(url.into()),
		}
	}
}

impl Page {
	/// Returns the attached frames, main frame first.
	pub fn frames(&self) -> Vec<Frame> {
		self.frames.read().values().cloned().collect()
	}

	/// Returns the first attached frame matching `query`.
	///
	/// # Errors
	///
	/// [`Error::InvalidArgument`] unless exactly one of `name` / `url` is set.
	pub fn frame(&self, query: FrameQuery) -> Result<Option<Frame>> {
		let frames = self.frames();
		match (query.name, query.url) {
			(Some(name), None) => Ok(frames.into_iter().find(|f| f.name() == name)),
			(None, Some(url)) => Ok(frames.into_iter().find(|f| url.is_match(&f.url()))),
			(Some(_), Some(_)) => Err(Error::InvalidArgument(
				"frame query takes either a name or a url, not both".to_string(),
			)),
			(None, None) => Err(Error::InvalidArgument("frame query needs a name or a url".to_string())),
		}
	}

	/// Adds a registered frame to the live set.
	///
	/// Returns `None` if the frame is terminal or already attached.
	pub(super) fn attach_frame(&self, guid: &str) -> Result<Option<Frame>> {
		let frame: Frame = proxy::lookup(self.base.connection().as_ref(), guid)?;
		if self.frames.read().contains_key(guid) {
			tracing::debug!(page = %self.guid(), frame = guid, "frame already attached");
			return Ok(None);
		}
		if !frame.apply_lifecycle(FrameLifecycle::Attached(Arc::from(self.guid()))) {
			return Ok(None);
		}

		self.frames.write().insert(Arc::from(guid), frame.clone());
		tracing::debug!(page = %self.guid(), frame = guid, "frame attached");
		Ok(Some(frame))
	}

	/// Removes a frame from the live set and marks it terminal.
	///
	/// Idempotent: a repeated detach returns `None` and changes nothing.
	pub(super) fn detach_frame(&self, guid: &str) -> Option<Frame> {
		let removed = self.frames.write().shift_remove(guid);
		let frame = match removed {
			Some(frame) => frame,
			None => match proxy::lookup::<Frame>(self.base.connection().as_ref(), guid) {
				Ok(frame) => frame,
				Err(_) => {
					tracing::warn!(page = %self.guid(), frame = guid, "detach for unknown frame ignored");
					return None;
				}
			},
		};

		if frame.apply_lifecycle(FrameLifecycle::Detached) {
			Some(frame)
		} else {
			tracing::warn!(page = %self.guid(), frame = guid, "stale frame detach ignored");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn query_constructors_set_one_field() {
		let by_name = FrameQuery::name("ad");
		assert_eq!(by_name.name.as_deref(), Some("ad"));
		assert!(by_name.url.is_none());

		let by_url = FrameQuery::url("https://example.com/");
		assert!(by_url.name.is_none());
		assert!(by_url.url.unwrap().is_match("https://example.com/"));
	}
}
