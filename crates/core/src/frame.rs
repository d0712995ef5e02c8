//! [`Frame`] proxy: a document inside a page.
//!
//! Lifecycle is `created -> attached -> detached`. The owning [`Page`] drives
//! the transitions through [`Frame::apply_lifecycle`]; detached is terminal.
//! Commands on a detached frame fail with [`Error::Detached`], and a command
//! still in flight when the frame detaches fails the same way instead of
//! waiting for a reply that may never come.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use pw_mirror_protocol::{GotoOptions, LoadState, ObjectKind};
use pw_mirror_runtime::{ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde_json::Value;
use tokio::sync::watch;

use crate::events::{EventHub, ProtocolEvent};
use crate::handlers::{Subscription, UrlMatcher};
use crate::network::Response;
use crate::page::Page;
use crate::proxy::{self, channel_owner_impl};
use crate::timeout_settings::{default_timeout, from_millis};
use crate::wait::{WaitBuilder, WaitOptions, WaitTimeout, Waiter};

/// Payload of a `navigated` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
	pub url: String,
	pub name: String,
	/// Set when the navigation failed.
	pub error: Option<String>,
}

/// Events published by a [`Frame`].
#[derive(Debug, Clone)]
pub enum FrameEvent {
	Navigated(Navigation),
	/// A load milestone was reached (`added`) or reset.
	LoadState { state: LoadState, added: bool },
	/// The frame left its page. Published once.
	Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameEventKind {
	Navigated,
	LoadState,
	Detached,
}

impl fmt::Display for FrameEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Navigated => "navigated",
			Self::LoadState => "loadstate",
			Self::Detached => "detached",
		})
	}
}

impl ProtocolEvent for FrameEvent {
	type Kind = FrameEventKind;

	fn kind(&self) -> FrameEventKind {
		match self {
			Self::Navigated(_) => FrameEventKind::Navigated,
			Self::LoadState { .. } => FrameEventKind::LoadState,
			Self::Detached => FrameEventKind::Detached,
		}
	}
}

/// Lifecycle transitions applied by the owning page.
#[derive(Debug, Clone)]
pub(crate) enum FrameLifecycle {
	/// Attached to the page with this id.
	Attached(Arc<str>),
	Detached,
}

#[derive(Debug)]
struct FrameState {
	name: String,
	url: String,
	page_guid: Option<Arc<str>>,
	load_states: HashSet<LoadState>,
}

/// A frame in a page: the main frame or an iframe.
#[derive(Clone)]
pub struct Frame {
	base: ChannelOwnerImpl,
	state: Arc<RwLock<FrameState>>,
	/// Terminal flag; watchers are woken when it flips.
	detached: Arc<watch::Sender<bool>>,
	events: EventHub<FrameEvent>,
}

impl Frame {
	pub(crate) fn new(parent: ParentOrConnection, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let url = initializer.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
		let name = initializer.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
		let load_states = initializer
			.get("loadStates")
			.and_then(Value::as_array)
			.map(|states| states.iter().filter_map(Value::as_str).filter_map(LoadState::from_wire).collect())
			.unwrap_or_default();

		let (detached, _) = watch::channel(false);

		Ok(Self {
			base: ChannelOwnerImpl::new(parent, ObjectKind::Frame, guid, initializer),
			state: Arc::new(RwLock::new(FrameState {
				name,
				url,
				page_guid: None,
				load_states,
			})),
			detached: Arc::new(detached),
			events: EventHub::new(),
		})
	}

	pub fn guid(&self) -> &str {
		self.base.guid()
	}

	/// Frame name from the `name` attribute, empty for the main frame.
	pub fn name(&self) -> String {
		self.state.read().name.clone()
	}

	pub fn url(&self) -> String {
		self.state.read().url.clone()
	}

	/// Returns true once the frame has left its page.
	pub fn is_detached(&self) -> bool {
		*self.detached.borrow()
	}

	/// Returns the page this frame is attached to.
	pub fn page(&self) -> Option<Page> {
		let guid = self.state.read().page_guid.clone()?;
		proxy::lookup(self.base.connection().as_ref(), &guid).ok()
	}

	/// Returns true if the frame has reached `state`.
	pub fn has_load_state(&self, state: LoadState) -> bool {
		self.state.read().load_states.contains(&state)
	}

	pub fn events(&self) -> &EventHub<FrameEvent> {
		&self.events
	}

	/// Registers `listener` for every future `kind` event.
	pub fn on<F>(&self, kind: FrameEventKind, listener: F) -> Subscription
	where
		F: Fn(&FrameEvent) -> Result<()> + Send + Sync + 'static,
	{
		self.events.on(kind, listener)
	}

	/// Effective timeout of the owning page, or the global default.
	pub fn effective_timeout(&self) -> Duration {
		self.page().map_or_else(default_timeout, |page| page.effective_timeout())
	}

	/// Navigates the frame.
	///
	/// Returns `None` for navigations without a network response (`about:blank`,
	/// same-document). A zero `timeout` means the effective default.
	pub async fn goto(&self, url: &str, options: Option<GotoOptions>) -> Result<Option<Response>> {
		let mut options = options.unwrap_or_default();
		options.timeout = options.timeout.filter(|ms| *ms > 0.0);
		let timeout = options
			.timeout
			.and_then(from_millis)
			.unwrap_or_else(|| self.effective_timeout());

		let mut params = serde_json::to_value(&options)?;
		params["url"] = Value::from(url);

		let reply = self.send_guarded("goto", params, Some(timeout)).await?;
		let Ok(guid) = proxy::guid_param(&reply, "response") else {
			return Ok(None);
		};

		let response = self.base.connection().wait_for_object(guid, timeout).await?;
		proxy::downcast(&response).map(Some)
	}

	/// Returns the document title.
	pub async fn title(&self) -> Result<String> {
		let reply = self.send_guarded("title", Value::Null, None).await?;
		reply
			.get("value")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::ProtocolError("title reply missing 'value'".to_string()))
	}

	/// Arms a wait for the next `kind` event.
	///
	/// The wait aborts if the frame detaches, or if its page crashes or
	/// closes, unless that is the awaited event.
	pub fn expect_event(&self, kind: FrameEventKind, options: WaitOptions<FrameEvent>) -> Result<Waiter<FrameEvent>> {
		if kind != FrameEventKind::Detached {
			self.ensure_attached()?;
		}

		let timeout = options.timeout.resolve(|| self.effective_timeout());
		let builder = WaitBuilder::new(&self.events, kind)
			.predicate(options.predicate)
			.timeout(timeout);
		Ok(self.guard(builder).arm())
	}

	/// Arms a wait for the next navigation whose URL satisfies `url`.
	///
	/// Arm before triggering the navigation, then [`Waiter::wait`] and pass
	/// the event to [`Frame::navigation_result`].
	pub fn expect_navigation(
		&self,
		url: Option<UrlMatcher>,
		timeout: impl Into<WaitTimeout>,
	) -> Result<Waiter<FrameEvent>> {
		let options = WaitOptions::<FrameEvent>::new().timeout(timeout).predicate(move |event| match event {
			FrameEvent::Navigated(nav) => url.as_ref().is_none_or(|m| m.is_match(&nav.url)),
			_ => false,
		});
		self.expect_event(FrameEventKind::Navigated, options)
	}

	/// Waits for the next navigation whose URL satisfies `url`.
	///
	/// # Errors
	///
	/// - [`Error::HardFail`] if the frame detaches or the page crashes or closes
	/// - [`Error::EventTimeout`] when the timeout passes
	/// - [`Error::Remote`] if the navigation itself failed
	pub async fn wait_for_navigation(
		&self,
		url: Option<UrlMatcher>,
		timeout: impl Into<WaitTimeout>,
	) -> Result<Navigation> {
		let event = self.expect_navigation(url, timeout)?.wait().await?;
		Self::navigation_result(event)
	}

	/// Turns a `navigated` event into the navigation or its failure.
	pub fn navigation_result(event: FrameEvent) -> Result<Navigation> {
		match event {
			FrameEvent::Navigated(Navigation { error: Some(message), .. }) => Err(Error::Remote {
				name: "Error".to_string(),
				message,
				stack: None,
			}),
			FrameEvent::Navigated(nav) => Ok(nav),
			other => Err(Error::ProtocolError(format!("expected a navigation, got {}", other.kind()))),
		}
	}

	/// Waits until the frame has reached `state` (default `load`).
	///
	/// Returns immediately if it already has.
	pub async fn wait_for_load_state(&self, state: Option<LoadState>, timeout: impl Into<WaitTimeout>) -> Result<()> {
		let state = state.unwrap_or_default();
		let options = WaitOptions::<FrameEvent>::new()
			.timeout(timeout)
			.predicate(move |event| matches!(event, FrameEvent::LoadState { state: s, added: true } if *s == state));

		// Armed before checking so a milestone landing in between is not lost.
		let waiter = self.expect_event(FrameEventKind::LoadState, options)?;
		if self.has_load_state(state) {
			return Ok(());
		}
		waiter.wait().await.map(|_| ())
	}

	/// Adds the hard-fail conditions every frame wait shares.
	pub(crate) fn guard<E: ProtocolEvent>(&self, builder: WaitBuilder<E>) -> WaitBuilder<E> {
		let builder = builder.reject_on(&self.events, FrameEventKind::Detached, || Error::HardFail {
			condition: "detached".to_string(),
			message: "Navigating frame was detached!".to_string(),
		});
		match self.page() {
			Some(page) => page.guard(builder),
			None => builder,
		}
	}

	/// Applies a lifecycle transition. Returns false if it changed nothing.
	///
	/// Attaching a detached frame is ignored; detaching twice is a no-op and
	/// publishes [`FrameEvent::Detached`] only the first time.
	pub(crate) fn apply_lifecycle(&self, change: FrameLifecycle) -> bool {
		match change {
			FrameLifecycle::Attached(page_guid) => {
				if self.is_detached() {
					tracing::warn!(guid = %self.guid(), page = %page_guid, "attach of detached frame ignored");
					return false;
				}
				self.state.write().page_guid = Some(page_guid);
				true
			}
			FrameLifecycle::Detached => {
				let changed = self.detached.send_if_modified(|detached| {
					if *detached {
						false
					} else {
						*detached = true;
						true
					}
				});
				if changed {
					tracing::debug!(guid = %self.guid(), "frame detached");
					self.events.publish(FrameEvent::Detached);
				}
				changed
			}
		}
	}

	fn ensure_attached(&self) -> Result<()> {
		if self.is_detached() {
			return Err(self.detached_error());
		}
		Ok(())
	}

	fn detached_error(&self) -> Error {
		Error::Detached {
			target_type: "Frame",
			guid: self.guid().to_string(),
		}
	}

	/// Sends a command that fails with [`Error::Detached`] if the frame
	/// detaches before the reply arrives.
	async fn send_guarded(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Value> {
		self.ensure_attached()?;
		let mut detached = self.detached.subscribe();

		tokio::select! {
			biased;
			reply = self.base.channel().send_with_timeout::<Value, Value>(method, params, timeout) => reply,
			_ = detached.wait_for(|detached| *detached) => Err(self.detached_error()),
		}
	}

	fn handle_event(&self, method: &str, params: Value) -> Result<()> {
		match method {
			"navigated" => {
				let nav = Navigation {
					url: params.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
					name: params.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
					error: params.get("error").and_then(Value::as_str).map(str::to_string),
				};
				{
					let mut state = self.state.write();
					state.url.clone_from(&nav.url);
					state.name.clone_from(&nav.name);
				}
				tracing::debug!(guid = %self.guid(), url = %nav.url, "frame navigated");
				self.events.publish(FrameEvent::Navigated(nav));
			}
			"loadstate" => {
				if let Some(state) = params.get("add").and_then(Value::as_str).and_then(LoadState::from_wire) {
					self.state.write().load_states.insert(state);
					self.events.publish(FrameEvent::LoadState { state, added: true });
				}
				if let Some(state) = params.get("remove").and_then(Value::as_str).and_then(LoadState::from_wire) {
					self.state.write().load_states.remove(&state);
					self.events.publish(FrameEvent::LoadState { state, added: false });
				}
			}
			_ => return self.base.on_event(method, params),
		}
		Ok(())
	}
}

channel_owner_impl!(Frame);

impl fmt::Debug for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.read();
		f.debug_struct("Frame")
			.field("guid", &self.guid())
			.field("name", &state.name)
			.field("url", &state.url)
			.field("detached", &self.is_detached())
			.finish()
	}
}
