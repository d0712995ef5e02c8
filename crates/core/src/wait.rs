//! Resolve-once waits over events, a timer and abort conditions.
//!
//! A wait is armed in a fixed order: result slot, primary subscription,
//! hard-fail subscriptions, then the deadline. From then on the first of
//! these to settle the slot wins; later writers are ignored. Settling drops
//! every subscription the wait created before the caller is resumed, so no
//! listener outlives its wait regardless of which source won.
//!
//! ```ignore
//! let waiter = page.expect_event(PageEventKind::Load, WaitOptions::default())?;
//! page.goto("https://example.com", None).await?;
//! let load = waiter.wait().await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pw_mirror_runtime::{Error, Result};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::events::{EventHub, ProtocolEvent};
use crate::handlers::Subscription;

/// How long a wait may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitTimeout {
	/// Use the effective default of the owning page or context.
	#[default]
	Inherit,
	/// Explicit limit. `Duration::ZERO` is treated as [`WaitTimeout::Inherit`].
	After(Duration),
	/// No limit. Only ends on the event or a hard-fail condition.
	Unbounded,
}

impl WaitTimeout {
	/// Resolves to a concrete limit; `None` means unbounded.
	pub fn resolve(self, inherited: impl FnOnce() -> Duration) -> Option<Duration> {
		match self {
			Self::After(d) if !d.is_zero() => Some(d),
			Self::Inherit | Self::After(_) => Some(inherited()),
			Self::Unbounded => None,
		}
	}
}

impl From<Duration> for WaitTimeout {
	fn from(d: Duration) -> Self {
		Self::After(d)
	}
}

impl From<Option<Duration>> for WaitTimeout {
	fn from(d: Option<Duration>) -> Self {
		d.map_or(Self::Inherit, Self::After)
	}
}

/// Shared predicate over an event payload.
pub type EventPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Options for `expect_event` / `wait_for_event`.
pub struct WaitOptions<E> {
	/// Defaults to [`WaitTimeout::Inherit`].
	pub timeout: WaitTimeout,
	/// Events rejected by the predicate are skipped. Absent means any event.
	pub predicate: Option<EventPredicate<E>>,
}

impl<E> Default for WaitOptions<E> {
	fn default() -> Self {
		Self {
			timeout: WaitTimeout::Inherit,
			predicate: None,
		}
	}
}

impl<E> Clone for WaitOptions<E> {
	fn clone(&self) -> Self {
		Self {
			timeout: self.timeout,
			predicate: self.predicate.clone(),
		}
	}
}

impl<E> WaitOptions<E> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn timeout(mut self, timeout: impl Into<WaitTimeout>) -> Self {
		self.timeout = timeout.into();
		self
	}

	pub fn predicate(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
		self.predicate = Some(Arc::new(predicate));
		self
	}
}

impl<E> fmt::Debug for WaitOptions<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WaitOptions")
			.field("timeout", &self.timeout)
			.field("predicate", &self.predicate.is_some())
			.finish()
	}
}

struct SlotState<T> {
	tx: Option<oneshot::Sender<Result<T>>>,
	subscriptions: Vec<Subscription>,
	timer: Option<AbortHandle>,
}

/// Resolve-once result slot that also owns its wait's subscriptions.
struct Slot<T> {
	state: Mutex<SlotState<T>>,
}

impl<T> Slot<T> {
	fn new() -> (Arc<Self>, oneshot::Receiver<Result<T>>) {
		let (tx, rx) = oneshot::channel();
		let slot = Arc::new(Self {
			state: Mutex::new(SlotState {
				tx: Some(tx),
				subscriptions: Vec::new(),
				timer: None,
			}),
		});
		(slot, rx)
	}

	/// First writer wins. Releases all subscriptions before delivering.
	fn settle(&self, outcome: Result<T>) -> bool {
		let Some((tx, subscriptions)) = self.take() else {
			return false;
		};
		drop(subscriptions);
		let _ = tx.send(outcome);
		true
	}

	/// Abandons the wait without delivering anything.
	fn cancel(&self) {
		drop(self.take());
	}

	/// Stops the timer and hands out the sender plus subscriptions, once.
	fn take(&self) -> Option<(oneshot::Sender<Result<T>>, Vec<Subscription>)> {
		let mut state = self.state.lock();
		let tx = state.tx.take()?;
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}
		Some((tx, std::mem::take(&mut state.subscriptions)))
	}

	/// Ties the deadline task to this wait; aborted at once if already settled.
	fn attach_timer(&self, timer: AbortHandle) {
		let mut state = self.state.lock();
		if state.tx.is_some() {
			state.timer = Some(timer);
		} else {
			timer.abort();
		}
	}

	/// Ties `sub` to this wait; released immediately if already settled.
	fn attach(&self, sub: Subscription) {
		let mut state = self.state.lock();
		if state.tx.is_some() {
			state.subscriptions.push(sub);
		} else {
			drop(state);
			drop(sub);
		}
	}

	fn is_settled(&self) -> bool {
		self.state.lock().tx.is_none()
	}
}

type HardFailArm<E> = Box<dyn FnOnce(&Arc<Slot<E>>) + Send>;

/// Builder for a single wait.
///
/// Nothing is subscribed until [`arm`](Self::arm).
pub struct WaitBuilder<E: ProtocolEvent> {
	hub: EventHub<E>,
	kind: E::Kind,
	predicate: Option<EventPredicate<E>>,
	timeout: Option<Duration>,
	hard_fails: Vec<HardFailArm<E>>,
}

impl<E: ProtocolEvent> WaitBuilder<E> {
	/// Waits for the next `kind` event on `hub`, with no timeout until one is set.
	pub fn new(hub: &EventHub<E>, kind: E::Kind) -> Self {
		Self {
			hub: hub.clone(),
			kind,
			predicate: None,
			timeout: None,
			hard_fails: Vec::new(),
		}
	}

	pub fn predicate(mut self, predicate: Option<EventPredicate<E>>) -> Self {
		self.predicate = predicate;
		self
	}

	/// `None` waits without a deadline.
	pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	/// Rejects the wait with `error()` if `kind` fires on `hub` first.
	///
	/// Ignored when it names the primary event itself, so waiting for a
	/// page's `close` is not aborted by that same `close`.
	pub fn reject_on<F, M>(mut self, hub: &EventHub<F>, kind: F::Kind, error: M) -> Self
	where
		F: ProtocolEvent,
		M: Fn() -> Error + Send + Sync + 'static,
	{
		let same_kind = (&kind as &dyn std::any::Any).downcast_ref::<E::Kind>() == Some(&self.kind);
		if same_kind && self.hub.is_same_hub(hub) {
			return self;
		}

		let hub = hub.clone();
		self.hard_fails.push(Box::new(move |slot: &Arc<Slot<E>>| {
			let target = Arc::clone(slot);
			let sub = hub.on(kind, move |_| {
				if target.settle(Err(error())) {
					tracing::debug!(condition = %kind, "wait rejected by hard-fail event");
				}
				Ok(())
			});
			slot.attach(sub);
		}));
		self
	}

	/// Subscribes everything and starts the clock.
	///
	/// The deadline runs on its own task, so the wait times out even if
	/// nobody is polling it yet. Must be called from within a tokio runtime.
	pub fn arm(self) -> Waiter<E> {
		let (slot, rx) = Slot::new();

		let primary = {
			let slot = Arc::clone(&slot);
			let predicate = self.predicate;
			self.hub.on(self.kind, move |event| {
				if predicate.as_ref().is_none_or(|p| p(event)) {
					slot.settle(Ok(event.clone()));
				}
				Ok(())
			})
		};
		slot.attach(primary);

		for arm in self.hard_fails {
			arm(&slot);
		}

		let event = self.kind.to_string();
		// A deadline past the clock's range never fires.
		if let Some((timeout, deadline)) = self.timeout.and_then(|t| Some((t, Instant::now().checked_add(t)?))) {
			let target = Arc::clone(&slot);
			let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
			let event = event.clone();
			let timer = tokio::spawn(async move {
				tokio::time::sleep_until(deadline).await;
				if target.settle(Err(Error::EventTimeout { event, timeout_ms })) {
					tracing::debug!(timeout_ms, "wait timed out");
				}
			});
			slot.attach_timer(timer.abort_handle());
		}

		Waiter {
			slot,
			rx,
			timeout: self.timeout,
			event,
		}
	}
}

/// An armed wait. Dropping it cancels the wait and releases its listeners.
pub struct Waiter<E> {
	slot: Arc<Slot<E>>,
	rx: oneshot::Receiver<Result<E>>,
	timeout: Option<Duration>,
	event: String,
}

impl<E> Waiter<E> {
	/// Suspends until the wait settles.
	///
	/// # Errors
	///
	/// - [`Error::EventTimeout`] naming the awaited event when the deadline passes
	/// - [`Error::HardFail`] (or whatever a hard-fail factory returns) when an
	///   abort condition fires first
	pub async fn wait(mut self) -> Result<E> {
		(&mut self.rx).await.map_err(|_| Error::ChannelClosed)?
	}

	/// Runs `trigger` while armed, then waits.
	///
	/// A failing trigger cancels the wait and returns the trigger's error.
	pub async fn wait_with<T, Fut>(self, trigger: Fut) -> Result<E>
	where
		Fut: Future<Output = Result<T>>,
	{
		trigger.await?;
		self.wait().await
	}

	/// Returns true once an outcome has been recorded.
	pub fn is_settled(&self) -> bool {
		self.slot.is_settled()
	}

	/// Name of the awaited event.
	pub fn event(&self) -> &str {
		&self.event
	}
}

impl<E> Drop for Waiter<E> {
	fn drop(&mut self) {
		self.slot.cancel();
	}
}

impl<E> fmt::Debug for Waiter<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Waiter")
			.field("event", &self.event)
			.field("timeout", &self.timeout)
			.field("settled", &self.is_settled())
			.finish()
	}
}
