//! [`Request`] and [`Response`] proxies.
//!
//! Both are snapshots: their fields come from the initializer and never
//! change afterwards.

use std::fmt;
use std::sync::Arc;

use pw_mirror_protocol::ObjectKind;
use pw_mirror_runtime::{ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde_json::Value;

use crate::proxy::{self, channel_owner_impl};

fn required_str(initializer: &Value, key: &str, kind: ObjectKind) -> Result<String> {
	initializer
		.get(key)
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| Error::ProtocolError(format!("{kind} initializer missing '{key}'")))
}

/// A network request issued by a page.
#[derive(Clone)]
pub struct Request {
	base: ChannelOwnerImpl,
	url: String,
	method: String,
}

impl Request {
	pub(crate) fn new(parent: ParentOrConnection, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let url = required_str(&initializer, "url", ObjectKind::Request)?;
		let method = initializer.get("method").and_then(Value::as_str).unwrap_or("GET").to_string();
		Ok(Self {
			base: ChannelOwnerImpl::new(parent, ObjectKind::Request, guid, initializer),
			url,
			method,
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// HTTP method, e.g. `GET`.
	pub fn method(&self) -> &str {
		&self.method
	}

	fn handle_event(&self, method: &str, params: Value) -> Result<()> {
		self.base.on_event(method, params)
	}
}

channel_owner_impl!(Request);

impl fmt::Debug for Request {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Request")
			.field("guid", &self.base.guid())
			.field("method", &self.method)
			.field("url", &self.url)
			.finish()
	}
}

/// The response to a [`Request`].
#[derive(Clone)]
pub struct Response {
	base: ChannelOwnerImpl,
	url: String,
	status: u16,
	status_text: String,
}

impl Response {
	pub(crate) fn new(parent: ParentOrConnection, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let url = required_str(&initializer, "url", ObjectKind::Response)?;
		let status = initializer
			.get("status")
			.and_then(Value::as_u64)
			.ok_or_else(|| Error::ProtocolError("Response initializer missing 'status'".to_string()))? as u16;
		let status_text = initializer.get("statusText").and_then(Value::as_str).unwrap_or_default().to_string();
		Ok(Self {
			base: ChannelOwnerImpl::new(parent, ObjectKind::Response, guid, initializer),
			url,
			status,
			status_text,
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn status(&self) -> u16 {
		self.status
	}

	pub fn status_text(&self) -> &str {
		&self.status_text
	}

	/// Returns true for 2xx statuses.
	pub fn ok(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the originating request, if the driver referenced one that is still alive.
	pub fn request(&self) -> Option<Request> {
		let guid = proxy::guid_param(self.base.initializer(), "request").ok()?;
		proxy::lookup(self.base.connection().as_ref(), guid).ok()
	}

	fn handle_event(&self, method: &str, params: Value) -> Result<()> {
		self.base.on_event(method, params)
	}
}

channel_owner_impl!(Response);

impl fmt::Debug for Response {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Response")
			.field("guid", &self.base.guid())
			.field("status", &self.status)
			.field("url", &self.url)
			.finish()
	}
}
