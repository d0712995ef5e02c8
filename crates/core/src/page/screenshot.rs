//! Screenshot methods for [`Page`].

use std::path::Path;

use base64::Engine;
use pw_mirror_protocol::{ScreenshotOptions, ScreenshotType};
use pw_mirror_runtime::{Error, Result};
use serde::Deserialize;

use super::Page;
use crate::timeout_settings::from_millis;

#[derive(Deserialize)]
struct ScreenshotResponse {
	binary: String,
}

impl Page {
	/// Captures a screenshot and returns the decoded image bytes (PNG unless
	/// `options` say otherwise).
	pub async fn screenshot(&self, options: Option<ScreenshotOptions>) -> Result<Vec<u8>> {
		self.ensure_open()?;

		let mut options = options.unwrap_or_default();
		options.screenshot_type.get_or_insert(ScreenshotType::Png);
		options.timeout = options.timeout.filter(|ms| *ms > 0.0);
		let timeout = options
			.timeout
			.and_then(from_millis)
			.unwrap_or_else(|| self.effective_timeout());

		let response: ScreenshotResponse = self
			.base
			.channel()
			.send_with_timeout("screenshot", &options, Some(timeout))
			.await?;

		base64::prelude::BASE64_STANDARD
			.decode(&response.binary)
			.map_err(|e| Error::ProtocolError(format!("decode screenshot: {e}")))
	}

	/// Captures a screenshot, writes it to `path`, and returns the bytes.
	pub async fn screenshot_to_file(&self, path: &Path, options: Option<ScreenshotOptions>) -> Result<Vec<u8>> {
		let bytes = self.screenshot(options).await?;
		tokio::fs::write(path, &bytes).await?;
		tracing::debug!(guid = %self.guid(), path = %path.display(), len = bytes.len(), "screenshot written");
		Ok(bytes)
	}
}
