//! Event waits on [`Page`].
//!
//! Every wait aborts when the page crashes or closes, unless the awaited
//! event is that crash or close.

use std::future::Future;

use pw_mirror_protocol::LoadState;
use pw_mirror_runtime::{Error, Result};

use super::{Page, PageEvent, PageEventKind};
use crate::events::ProtocolEvent;
use crate::frame::Navigation;
use crate::handlers::UrlMatcher;
use crate::network::{Request, Response};
use crate::wait::{WaitBuilder, WaitOptions, WaitTimeout, Waiter};

fn unexpected(event: &PageEvent) -> Error {
	Error::ProtocolError(format!("unexpected page event '{}'", event.kind()))
}

impl Page {
	/// Arms a wait for the next `kind` event and returns it unresolved.
	///
	/// Issue the command that causes the event after this returns, then
	/// call [`Waiter::wait`].
	///
	/// # Errors
	///
	/// [`Error::TargetClosed`] if the page is closed and `kind` is not `Close`.
	pub fn expect_event(&self, kind: PageEventKind, options: WaitOptions<PageEvent>) -> Result<Waiter<PageEvent>> {
		if kind != PageEventKind::Close {
			self.ensure_open()?;
		}

		let timeout = options.timeout.resolve(|| self.effective_timeout());
		let builder = WaitBuilder::new(&self.events, kind)
			.predicate(options.predicate)
			.timeout(timeout);
		Ok(self.guard(builder).arm())
	}

	/// Waits for the next `kind` event.
	pub async fn wait_for_event(&self, kind: PageEventKind, options: WaitOptions<PageEvent>) -> Result<PageEvent> {
		self.expect_event(kind, options)?.wait().await
	}

	/// Arms a wait, runs `trigger`, then waits.
	///
	/// If `trigger` fails the wait is cancelled and its error returned.
	pub async fn wait_for_event_with<T, Fut>(
		&self,
		kind: PageEventKind,
		options: WaitOptions<PageEvent>,
		trigger: Fut,
	) -> Result<PageEvent>
	where
		Fut: Future<Output = Result<T>>,
	{
		self.expect_event(kind, options)?.wait_with(trigger).await
	}

	/// Waits for a request whose URL satisfies `url` (any request if `None`).
	pub async fn wait_for_request(&self, url: Option<UrlMatcher>, timeout: impl Into<WaitTimeout>) -> Result<Request> {
		let options = WaitOptions::<PageEvent>::new().timeout(timeout).predicate(move |event| {
			matches!(event, PageEvent::Request(request) if url.as_ref().is_none_or(|m| m.is_match(request.url())))
		});

		match self.wait_for_event(PageEventKind::Request, options).await? {
			PageEvent::Request(request) => Ok(request),
			other => Err(unexpected(&other)),
		}
	}

	/// Waits for a response whose URL satisfies `url` (any response if `None`).
	pub async fn wait_for_response(&self, url: Option<UrlMatcher>, timeout: impl Into<WaitTimeout>) -> Result<Response> {
		let options = WaitOptions::<PageEvent>::new().timeout(timeout).predicate(move |event| {
			matches!(event, PageEvent::Response(response) if url.as_ref().is_none_or(|m| m.is_match(response.url())))
		});

		match self.wait_for_event(PageEventKind::Response, options).await? {
			PageEvent::Response(response) => Ok(response),
			other => Err(unexpected(&other)),
		}
	}

	/// Waits for the main frame to navigate to a URL satisfying `url`.
	pub async fn wait_for_navigation(&self, url: Option<UrlMatcher>, timeout: impl Into<WaitTimeout>) -> Result<Navigation> {
		self.ensure_open()?;
		self.main_frame.wait_for_navigation(url, timeout).await
	}

	/// Waits for the main frame to reach `state` (default `load`).
	pub async fn wait_for_load_state(&self, state: Option<LoadState>, timeout: impl Into<WaitTimeout>) -> Result<()> {
		self.ensure_open()?;
		self.main_frame.wait_for_load_state(state, timeout).await
	}
}
