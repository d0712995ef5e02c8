//! Option structs for proxy commands.
//!
//! Every field is optional; an absent field is omitted from the wire and the
//! documented default applies.

use serde::{Deserialize, Serialize};

use crate::types::{ScreenshotClip, ScreenshotType};

/// Default timeout in milliseconds for waits and commands.
///
/// Applies when neither the call, the page nor the owning context set one.
pub const DEFAULT_TIMEOUT_MS: f64 = 30000.0;

/// Navigation options for `goto()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
	/// Milliseconds; zero or absent means the frame's effective timeout.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,

	/// Overrides the `Referer` header of the navigation request.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub referer: Option<String>,
}

impl GotoOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn timeout(mut self, timeout: f64) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn referer(mut self, referer: impl Into<String>) -> Self {
		self.referer = Some(referer.into());
		self
	}
}

/// Options for closing a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOptions {
	/// Run `beforeunload` handlers. Defaults to `false` on the driver.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub run_before_unload: Option<bool>,
}

/// Options for `screenshot()`.
///
/// Build with [`ScreenshotOptions::builder`]; unset fields keep the driver defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotOptions {
	/// Image format. Defaults to PNG.
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub screenshot_type: Option<ScreenshotType>,

	/// 0-100, JPEG only.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quality: Option<u8>,

	/// Capture the whole scrollable page instead of the viewport.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub full_page: Option<bool>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub clip: Option<ScreenshotClip>,

	/// Transparent instead of white background (PNG only).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub omit_background: Option<bool>,

	/// Milliseconds; zero or absent means the page's effective timeout.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,
}

impl ScreenshotOptions {
	pub fn builder() -> ScreenshotOptionsBuilder {
		ScreenshotOptionsBuilder::default()
	}
}

/// Builder for [`ScreenshotOptions`].
#[derive(Debug, Clone, Default)]
pub struct ScreenshotOptionsBuilder {
	inner: ScreenshotOptions,
}

impl ScreenshotOptionsBuilder {
	pub fn screenshot_type(mut self, format: ScreenshotType) -> Self {
		self.inner.screenshot_type = Some(format);
		self
	}

	pub fn quality(mut self, quality: u8) -> Self {
		self.inner.quality = Some(quality);
		self
	}

	pub fn full_page(mut self, full_page: bool) -> Self {
		self.inner.full_page = Some(full_page);
		self
	}

	pub fn clip(mut self, clip: ScreenshotClip) -> Self {
		self.inner.clip = Some(clip);
		self
	}

	pub fn omit_background(mut self, transparent: bool) -> Self {
		self.inner.omit_background = Some(transparent);
		self
	}

	pub fn timeout(mut self, timeout: f64) -> Self {
		self.inner.timeout = Some(timeout);
		self
	}

	pub fn build(self) -> ScreenshotOptions {
		self.inner
	}
}
