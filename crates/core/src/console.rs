//! [`ConsoleMessage`] proxy for `console.*` calls in a page.

use std::fmt;
use std::sync::Arc;

use pw_mirror_protocol::ObjectKind;
use pw_mirror_runtime::{ChannelOwnerImpl, ParentOrConnection, Result};
use serde_json::Value;

use crate::proxy::channel_owner_impl;

/// A console message, delivered through [`PageEvent::Console`](crate::PageEvent::Console).
///
/// Immutable: everything comes from the initializer.
#[derive(Clone)]
pub struct ConsoleMessage {
	base: ChannelOwnerImpl,
	kind: ConsoleMessageKind,
	text: String,
	location: Option<ConsoleLocation>,
}

impl ConsoleMessage {
	pub(crate) fn new(parent: ParentOrConnection, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let kind = initializer
			.get("type")
			.and_then(Value::as_str)
			.map(ConsoleMessageKind::from_wire)
			.unwrap_or(ConsoleMessageKind::Log);

		let text = initializer.get("text").and_then(Value::as_str).unwrap_or_default().to_string();

		let location = initializer.get("location").and_then(parse_location);

		Ok(Self {
			base: ChannelOwnerImpl::new(parent, ObjectKind::ConsoleMessage, guid, initializer),
			kind,
			text,
			location,
		})
	}

	/// Returns the type of console message.
	pub fn kind(&self) -> ConsoleMessageKind {
		self.kind
	}

	/// Returns the text content of the message.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Returns the source location, if the driver reported one.
	pub fn location(&self) -> Option<&ConsoleLocation> {
		self.location.as_ref()
	}

	fn handle_event(&self, method: &str, params: Value) -> Result<()> {
		self.base.on_event(method, params)
	}
}

channel_owner_impl!(ConsoleMessage);

impl fmt::Debug for ConsoleMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConsoleMessage")
			.field("guid", &self.base.guid())
			.field("kind", &self.kind)
			.field("text", &self.text)
			.finish()
	}
}

/// The type of console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMessageKind {
	/// `console.log()`
	Log,
	/// `console.debug()`
	Debug,
	/// `console.info()`
	Info,
	/// `console.warn()`
	Warning,
	/// `console.error()`
	Error,
	/// `console.trace()`
	Trace,
	/// `console.assert()`
	Assert,
	/// Any other `console` method
	Other,
}

impl ConsoleMessageKind {
	fn from_wire(s: &str) -> Self {
		match s {
			"log" => Self::Log,
			"debug" => Self::Debug,
			"info" => Self::Info,
			"warning" => Self::Warning,
			"error" => Self::Error,
			"trace" => Self::Trace,
			"assert" => Self::Assert,
			_ => Self::Other,
		}
	}
}

impl fmt::Display for ConsoleMessageKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Log => "log",
			Self::Debug => "debug",
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
			Self::Trace => "trace",
			Self::Assert => "assert",
			Self::Other => "other",
		})
	}
}

/// Source code location for a console message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLocation {
	pub url: String,
	/// 0-indexed
	pub line_number: u32,
	/// 0-indexed
	pub column_number: u32,
}

/// Positions outside `u32` are treated as unknown.
fn parse_location(loc: &Value) -> Option<ConsoleLocation> {
	let position = |key: &str| u32::try_from(loc.get(key)?.as_u64()?).ok();
	Some(ConsoleLocation {
		url: loc.get("url")?.as_str()?.to_string(),
		line_number: position("lineNumber")?,
		column_number: position("columnNumber")?,
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn kind_from_wire() {
		assert_eq!(ConsoleMessageKind::from_wire("log"), ConsoleMessageKind::Log);
		assert_eq!(ConsoleMessageKind::from_wire("warning"), ConsoleMessageKind::Warning);
		assert_eq!(ConsoleMessageKind::from_wire("table"), ConsoleMessageKind::Other);
	}

	#[test]
	fn kind_display() {
		assert_eq!(ConsoleMessageKind::Error.to_string(), "error");
		assert_eq!(ConsoleMessageKind::Other.to_string(), "other");
	}

	#[test]
	fn location_needs_positions_that_fit() {
		let loc = parse_location(&json!({"url": "app.js", "lineNumber": 12, "columnNumber": 4})).unwrap();
		assert_eq!((loc.line_number, loc.column_number), (12, 4));

		let oversized = json!({"url": "app.js", "lineNumber": u64::from(u32::MAX) + 1, "columnNumber": 0});
		assert!(parse_location(&oversized).is_none());
		assert!(parse_location(&json!({"url": "app.js", "lineNumber": -1, "columnNumber": 0})).is_none());
	}
}
