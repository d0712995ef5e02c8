//! Builds concrete proxies for `__create__` announcements.

use std::sync::Arc;

use pw_mirror_protocol::ObjectKind;
use pw_mirror_runtime::{ChannelOwner, ObjectFactory, ParentOrConnection, Result};
use serde_json::Value;

use crate::browser_context::BrowserContext;
use crate::console::ConsoleMessage;
use crate::frame::Frame;
use crate::network::{Request, Response};
use crate::page::Page;

/// The [`ObjectFactory`] installed by [`connect`](crate::connect).
#[derive(Debug, Default)]
pub struct ProxyFactory;

impl ObjectFactory for ProxyFactory {
	fn create_object(
		&self,
		parent: ParentOrConnection,
		kind: ObjectKind,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn ChannelOwner>> {
		let object: Arc<dyn ChannelOwner> = match kind {
			ObjectKind::BrowserContext => Arc::new(BrowserContext::new(parent, guid, initializer)?),
			ObjectKind::Page => Arc::new(Page::new(parent, guid, initializer)?),
			ObjectKind::Frame => Arc::new(Frame::new(parent, guid, initializer)?),
			ObjectKind::ConsoleMessage => Arc::new(ConsoleMessage::new(parent, guid, initializer)?),
			ObjectKind::Request => Arc::new(Request::new(parent, guid, initializer)?),
			ObjectKind::Response => Arc::new(Response::new(parent, guid, initializer)?),
		};
		Ok(object)
	}
}
