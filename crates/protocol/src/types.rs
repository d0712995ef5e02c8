//! Core protocol types used across the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote object kinds the driver can announce via `__create__`.
///
/// The kind decides which event names and commands are valid for a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
	/// Isolated browsing context owning pages.
	BrowserContext,
	/// A tab or window.
	Page,
	/// A frame inside a page (main frame or iframe).
	Frame,
	/// A `console.*` call captured in a page.
	ConsoleMessage,
	/// A network request issued by a page.
	Request,
	/// A network response to a [`ObjectKind::Request`].
	Response,
}

impl ObjectKind {
	/// Parses the `type` field of a `__create__` message.
	pub fn from_type_name(name: &str) -> Option<Self> {
		match name {
			"BrowserContext" => Some(Self::BrowserContext),
			"Page" => Some(Self::Page),
			"Frame" => Some(Self::Frame),
			"ConsoleMessage" => Some(Self::ConsoleMessage),
			"Request" => Some(Self::Request),
			"Response" => Some(Self::Response),
			_ => None,
		}
	}

	/// Returns the wire type name.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::BrowserContext => "BrowserContext",
			Self::Page => "Page",
			Self::Frame => "Frame",
			Self::ConsoleMessage => "ConsoleMessage",
			Self::Request => "Request",
			Self::Response => "Response",
		}
	}
}

impl fmt::Display for ObjectKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Reference to another remote object, as embedded in params and replies.
///
/// ```json
/// { "guid": "frame@3f2a" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidRef {
	pub guid: String,
}

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
	/// Page width in pixels
	pub width: i32,
	/// Page height in pixels
	pub height: i32,
}

/// Screenshot image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotType {
	/// PNG format (lossless, supports transparency)
	Png,
	/// JPEG format (lossy compression, smaller file size)
	Jpeg,
}

/// Clip region for screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotClip {
	pub x: f64,
	pub y: f64,
	pub width: f64,
	pub height: f64,
}

/// Document load milestones reported by `loadstate` frame events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
	/// The `load` event fired.
	#[default]
	Load,
	/// The `DOMContentLoaded` event fired.
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	/// No network connections for at least 500ms.
	#[serde(rename = "networkidle")]
	NetworkIdle,
}

impl LoadState {
	/// Parses the wire name.
	pub fn from_wire(name: &str) -> Option<Self> {
		match name {
			"load" => Some(Self::Load),
			"domcontentloaded" => Some(Self::DomContentLoaded),
			"networkidle" => Some(Self::NetworkIdle),
			_ => None,
		}
	}

	/// Returns the wire name.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Load => "load",
			Self::DomContentLoaded => "domcontentloaded",
			Self::NetworkIdle => "networkidle",
		}
	}
}

impl fmt::Display for LoadState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
