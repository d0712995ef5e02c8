//! [`Page`] proxy: a tab or window and the live set of its frames.

mod frames;
mod screenshot;
mod waiting;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;
use pw_mirror_protocol::{CloseOptions, GotoOptions, GuidRef, ObjectKind, Viewport};
use pw_mirror_runtime::{ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::Deserialize;
use serde_json::Value;

pub use self::frames::FrameQuery;
use crate::browser_context::BrowserContext;
use crate::console::ConsoleMessage;
use crate::events::{EventHub, ProtocolEvent};
use crate::frame::{Frame, FrameLifecycle};
use crate::handlers::Subscription;
use crate::network::{Request, Response};
use crate::proxy::{self, channel_owner_impl};
use crate::timeout_settings::TimeoutSettings;
use crate::wait::WaitBuilder;

/// Events published by a [`Page`].
#[derive(Debug, Clone)]
pub enum PageEvent {
	Close,
	Crash,
	Console(ConsoleMessage),
	DomContentLoaded,
	Load,
	FrameAttached(Frame),
	FrameDetached(Frame),
	Popup(Page),
	Request(Request),
	Response(Response),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEventKind {
	Close,
	Crash,
	Console,
	DomContentLoaded,
	Load,
	FrameAttached,
	FrameDetached,
	Popup,
	Request,
	Response,
}

impl fmt::Display for PageEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Close => "close",
			Self::Crash => "crash",
			Self::Console => "console",
			Self::DomContentLoaded => "domcontentloaded",
			Self::Load => "load",
			Self::FrameAttached => "frameattached",
			Self::FrameDetached => "framedetached",
			Self::Popup => "popup",
			Self::Request => "request",
			Self::Response => "response",
		})
	}
}

impl ProtocolEvent for PageEvent {
	type Kind = PageEventKind;

	fn kind(&self) -> PageEventKind {
		match self {
			Self::Close => PageEventKind::Close,
			Self::Crash => PageEventKind::Crash,
			Self::Console(_) => PageEventKind::Console,
			Self::DomContentLoaded => PageEventKind::DomContentLoaded,
			Self::Load => PageEventKind::Load,
			Self::FrameAttached(_) => PageEventKind::FrameAttached,
			Self::FrameDetached(_) => PageEventKind::FrameDetached,
			Self::Popup(_) => PageEventKind::Popup,
			Self::Request(_) => PageEventKind::Request,
			Self::Response(_) => PageEventKind::Response,
		}
	}
}

#[derive(Debug, Default)]
struct PageState {
	closed: bool,
	viewport: Option<Viewport>,
	/// Context closed together with this page.
	owned_context: Option<Arc<str>>,
}

#[derive(Deserialize)]
struct OpenerReply {
	page: Option<GuidRef>,
}

/// A browser tab or window within a [`BrowserContext`].
///
/// Cheap to clone; clones share all state with the registered proxy.
#[derive(Clone)]
pub struct Page {
	base: ChannelOwnerImpl,
	state: Arc<RwLock<PageState>>,
	/// Attached frames in attach order, main frame first.
	frames: Arc<RwLock<IndexMap<Arc<str>, Frame>>>,
	main_frame: Frame,
	events: EventHub<PageEvent>,
	timeouts: TimeoutSettings,
}

impl Page {
	/// Creates a page from its `__create__` announcement.
	///
	/// The main frame named by `mainFrame.guid` must already be registered.
	pub(crate) fn new(parent: ParentOrConnection, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let main_frame_guid = proxy::guid_param(&initializer, "mainFrame")
			.map_err(|_| Error::ProtocolError("Page initializer missing 'mainFrame.guid' field".to_string()))?
			.to_string();
		let viewport = initializer
			.get("viewportSize")
			.cloned()
			.and_then(|v| serde_json::from_value::<Viewport>(v).ok());

		let base = ChannelOwnerImpl::new(parent, ObjectKind::Page, guid, initializer);
		let main_frame: Frame = proxy::lookup(base.connection().as_ref(), &main_frame_guid)?;
		main_frame.apply_lifecycle(FrameLifecycle::Attached(Arc::from(base.guid())));

		let mut frames = IndexMap::new();
		frames.insert(Arc::from(main_frame.guid()), main_frame.clone());

		Ok(Self {
			base,
			state: Arc::new(RwLock::new(PageState {
				closed: false,
				viewport,
				owned_context: None,
			})),
			frames: Arc::new(RwLock::new(frames)),
			main_frame,
			events: EventHub::new(),
			timeouts: TimeoutSettings::new(),
		})
	}

	pub fn guid(&self) -> &str {
		self.base.guid()
	}

	/// URL of the main frame.
	pub fn url(&self) -> String {
		self.main_frame.url()
	}

	pub fn main_frame(&self) -> Frame {
		self.main_frame.clone()
	}

	/// Returns the owning context. Follows adoption.
	pub fn context(&self) -> Option<BrowserContext> {
		let parent = self.base.parent()?;
		proxy::downcast(&parent).ok()
	}

	pub fn viewport_size(&self) -> Option<Viewport> {
		self.state.read().viewport
	}

	pub fn is_closed(&self) -> bool {
		self.state.read().closed
	}

	pub fn events(&self) -> &EventHub<PageEvent> {
		&self.events
	}

	/// Registers `listener` for every future `kind` event.
	pub fn on<F>(&self, kind: PageEventKind, listener: F) -> Subscription
	where
		F: Fn(&PageEvent) -> Result<()> + Send + Sync + 'static,
	{
		self.events.on(kind, listener)
	}

	/// Sets the default for waits and commands on this page. Zero clears it.
	pub fn set_default_timeout(&self, timeout: Duration) {
		self.timeouts.set_default_timeout(timeout);
	}

	/// Page default, else the current context's default, else 30s.
	pub fn effective_timeout(&self) -> Duration {
		let context = self.context();
		self.timeouts.effective(context.as_ref().map(BrowserContext::timeout_settings))
	}

	/// Navigates the main frame.
	pub async fn goto(&self, url: &str, options: Option<GotoOptions>) -> Result<Option<Response>> {
		self.ensure_open()?;
		self.main_frame.goto(url, options).await
	}

	pub async fn title(&self) -> Result<String> {
		self.ensure_open()?;
		self.main_frame.title().await
	}

	/// Returns the page that opened this one, if it is still open.
	pub async fn opener(&self) -> Result<Option<Page>> {
		let reply: OpenerReply = self.base.channel().send_no_params("opener").await?;
		let Some(GuidRef { guid }) = reply.page else {
			return Ok(None);
		};
		let opener: Page = proxy::lookup(self.base.connection().as_ref(), &guid)?;
		Ok((!opener.is_closed()).then_some(opener))
	}

	/// Makes [`close`](Self::close) also close `context`.
	///
	/// For a context created solely to host this page.
	pub fn set_owned_context(&self, context: &BrowserContext) {
		self.state.write().owned_context = Some(Arc::from(context.guid()));
	}

	/// Returns the context closed together with this page, if it is still registered.
	pub fn owned_context(&self) -> Option<BrowserContext> {
		let guid = self.state.read().owned_context.clone()?;
		proxy::lookup(self.base.connection().as_ref(), &guid).ok()
	}

	/// Closes the page, then its owned context if it has one.
	///
	/// Closing a page that is already closed succeeds. A lost connection
	/// is reported, not swallowed.
	pub async fn close(&self, options: Option<CloseOptions>) -> Result<()> {
		if !self.is_closed() {
			match self.base.channel().send_no_result("close", options.unwrap_or_default()).await {
				Err(e) if e.is_safe_close_error() => {
					tracing::debug!(guid = %self.guid(), error = %e, "page already closed");
				}
				other => other?,
			}
		}
		if let Some(context) = self.owned_context() {
			context.close().await?;
		}
		Ok(())
	}

	/// Adds the page's crash and close abort conditions to a wait.
	///
	/// When both fire, whichever notification is dispatched first settles
	/// the wait.
	pub(crate) fn guard<E: ProtocolEvent>(&self, builder: WaitBuilder<E>) -> WaitBuilder<E> {
		builder
			.reject_on(&self.events, PageEventKind::Crash, || Error::HardFail {
				condition: "crash".to_string(),
				message: "Page crashed".to_string(),
			})
			.reject_on(&self.events, PageEventKind::Close, || Error::HardFail {
				condition: "close".to_string(),
				message: "Page closed".to_string(),
			})
	}

	pub(crate) fn ensure_open(&self) -> Result<()> {
		if self.is_closed() {
			return Err(Error::TargetClosed {
				target_type: "Page".to_string(),
				context: format!("page {} is closed", self.guid()),
			});
		}
		Ok(())
	}

	/// Flips the closed flag. Returns false if it was already set.
	fn mark_closed(&self) -> bool {
		let mut state = self.state.write();
		!std::mem::replace(&mut state.closed, true)
	}

	fn handle_event(&self, method: &str, params: Value) -> Result<()> {
		let connection = self.base.connection();
		let lookup = |key: &str| -> Result<_> { Ok(proxy::guid_param(&params, key)?.to_string()) };

		let event = match method {
			"close" => {
				if !self.mark_closed() {
					tracing::warn!(guid = %self.guid(), "duplicate close ignored");
					return Ok(());
				}
				tracing::debug!(guid = %self.guid(), "page closed");
				PageEvent::Close
			}
			"crash" => PageEvent::Crash,
			"domcontentloaded" => PageEvent::DomContentLoaded,
			"load" => PageEvent::Load,
			"console" => PageEvent::Console(proxy::lookup(connection.as_ref(), &lookup("message")?)?),
			"popup" => PageEvent::Popup(proxy::lookup(connection.as_ref(), &lookup("page")?)?),
			"request" => PageEvent::Request(proxy::lookup(connection.as_ref(), &lookup("request")?)?),
			"response" => PageEvent::Response(proxy::lookup(connection.as_ref(), &lookup("response")?)?),
			"frameAttached" => match self.attach_frame(&lookup("frame")?)? {
				Some(frame) => PageEvent::FrameAttached(frame),
				None => return Ok(()),
			},
			"frameDetached" => match self.detach_frame(&lookup("frame")?) {
				Some(frame) => PageEvent::FrameDetached(frame),
				None => return Ok(()),
			},
			"viewportSizeChanged" => {
				let viewport = params
					.get("viewportSize")
					.cloned()
					.and_then(|v| serde_json::from_value::<Viewport>(v).ok());
				self.state.write().viewport = viewport;
				return Ok(());
			}
			_ => return self.base.on_event(method, params),
		};

		self.events.publish(event);
		Ok(())
	}
}

channel_owner_impl!(Page);

impl fmt::Debug for Page {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Page")
			.field("guid", &self.guid())
			.field("url", &self.url())
			.field("closed", &self.is_closed())
			.finish()
	}
}
