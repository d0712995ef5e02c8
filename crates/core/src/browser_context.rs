//! [`BrowserContext`] proxy and the live set of its pages.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pw_mirror_protocol::{GuidRef, ObjectKind};
use pw_mirror_runtime::{ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::events::{EventHub, ProtocolEvent};
use crate::handlers::Subscription;
use crate::page::{Page, PageEventKind};
use crate::proxy::{self, channel_owner_impl};
use crate::timeout_settings::TimeoutSettings;
use crate::wait::{WaitBuilder, WaitOptions, Waiter};

/// Events published by a [`BrowserContext`].
#[derive(Debug, Clone)]
pub enum ContextEvent {
	/// A page was opened in this context.
	Page(Page),
	Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextEventKind {
	Page,
	Close,
}

impl fmt::Display for ContextEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Page => "page",
			Self::Close => "close",
		})
	}
}

impl ProtocolEvent for ContextEvent {
	type Kind = ContextEventKind;

	fn kind(&self) -> ContextEventKind {
		match self {
			Self::Page(_) => ContextEventKind::Page,
			Self::Close => ContextEventKind::Close,
		}
	}
}

#[derive(Deserialize)]
struct NewPageReply {
	page: GuidRef,
}

type PageSet = Arc<Mutex<IndexMap<Arc<str>, Page>>>;

/// An isolated browsing session owning a set of pages.
#[derive(Clone)]
pub struct BrowserContext {
	base: ChannelOwnerImpl,
	pages: PageSet,
	closed: Arc<AtomicBool>,
	events: EventHub<ContextEvent>,
	timeouts: TimeoutSettings,
}

impl BrowserContext {
	pub(crate) fn new(parent: ParentOrConnection, guid: Arc<str>, initializer: Value) -> Result<Self> {
		Ok(Self {
			base: ChannelOwnerImpl::new(parent, ObjectKind::BrowserContext, guid, initializer),
			pages: Arc::new(Mutex::new(IndexMap::new())),
			closed: Arc::new(AtomicBool::new(false)),
			events: EventHub::new(),
			timeouts: TimeoutSettings::new(),
		})
	}

	pub fn guid(&self) -> &str {
		self.base.guid()
	}

	/// Returns the open pages in the order they were announced.
	pub fn pages(&self) -> Vec<Page> {
		self.pages.lock().values().cloned().collect()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	pub fn events(&self) -> &EventHub<ContextEvent> {
		&self.events
	}

	/// Registers `listener` for every future `kind` event.
	pub fn on<F>(&self, kind: ContextEventKind, listener: F) -> Subscription
	where
		F: Fn(&ContextEvent) -> Result<()> + Send + Sync + 'static,
	{
		self.events.on(kind, listener)
	}

	/// Sets the default timeout inherited by every page of this context.
	///
	/// Zero clears it. Pages re-read it on every wait and command.
	pub fn set_default_timeout(&self, timeout: Duration) {
		self.timeouts.set_default_timeout(timeout);
	}

	pub(crate) fn timeout_settings(&self) -> &TimeoutSettings {
		&self.timeouts
	}

	/// Opens a new page and returns it once the driver has announced it.
	pub async fn new_page(&self) -> Result<Page> {
		self.ensure_open()?;
		let reply: NewPageReply = self.base.channel().send_no_params("newPage").await?;
		let page = self
			.base
			.connection()
			.wait_for_object(&reply.page.guid, self.timeouts.effective(None))
			.await?;
		proxy::downcast(&page)
	}

	/// Closes the context and all its pages.
	///
	/// Closing a context that is already closed succeeds.
	pub async fn close(&self) -> Result<()> {
		if self.is_closed() {
			return Ok(());
		}
		match self.base.channel().send_no_result("close", Value::Null).await {
			Err(e) if e.is_safe_close_error() => {
				tracing::debug!(guid = %self.guid(), error = %e, "context already closed");
				Ok(())
			}
			other => other,
		}
	}

	/// Arms a wait for the next `kind` event. Aborts if the context closes.
	pub fn expect_event(&self, kind: ContextEventKind, options: WaitOptions<ContextEvent>) -> Result<Waiter<ContextEvent>> {
		if kind != ContextEventKind::Close {
			self.ensure_open()?;
		}

		let timeout = options.timeout.resolve(|| self.timeouts.effective(None));
		Ok(WaitBuilder::new(&self.events, kind)
			.predicate(options.predicate)
			.timeout(timeout)
			.reject_on(&self.events, ContextEventKind::Close, || Error::HardFail {
				condition: "close".to_string(),
				message: "Context closed".to_string(),
			})
			.arm())
	}

	/// Waits for the next `kind` event.
	pub async fn wait_for_event(&self, kind: ContextEventKind, options: WaitOptions<ContextEvent>) -> Result<ContextEvent> {
		self.expect_event(kind, options)?.wait().await
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_closed() {
			return Err(Error::TargetClosed {
				target_type: "BrowserContext".to_string(),
				context: format!("context {} is closed", self.guid()),
			});
		}
		Ok(())
	}

	/// Adds `page` to the live set; it leaves again when the page publishes `close`.
	fn track_page(&self, page: &Page) {
		if page.is_closed() {
			return;
		}

		let guid: Arc<str> = Arc::from(page.guid());
		self.pages.lock().insert(Arc::clone(&guid), page.clone());

		let pages = Arc::downgrade(&self.pages);
		page.events()
			.once(PageEventKind::Close, move |_| {
				if let Some(pages) = pages.upgrade() {
					pages.lock().shift_remove(&guid);
				}
				Ok(())
			})
			.detach();
	}

	fn handle_event(&self, method: &str, params: Value) -> Result<()> {
		match method {
			"page" => {
				let guid = proxy::guid_param(&params, "page")?;
				let page: Page = proxy::lookup(self.base.connection().as_ref(), guid)?;
				self.track_page(&page);
				tracing::debug!(context = %self.guid(), page = %page.guid(), "page opened");
				self.events.publish(ContextEvent::Page(page));
			}
			"close" => {
				if self.closed.swap(true, Ordering::SeqCst) {
					tracing::warn!(guid = %self.guid(), "duplicate close ignored");
					return Ok(());
				}
				tracing::debug!(guid = %self.guid(), "context closed");
				self.events.publish(ContextEvent::Close);
			}
			_ => return self.base.on_event(method, params),
		}
		Ok(())
	}
}

channel_owner_impl!(BrowserContext);

impl fmt::Debug for BrowserContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BrowserContext")
			.field("guid", &self.guid())
			.field("pages", &self.pages.lock().len())
			.field("closed", &self.is_closed())
			.finish()
	}
}
