//! Per-proxy publish/subscribe.
//!
//! Every proxy owns one [`EventHub`] typed by its closed event enum. The
//! dispatch path parses a push notification into that enum once and calls
//! [`EventHub::publish`]; everything else (user listeners, waits, owner
//! bookkeeping) consumes typed values.
//!
//! Delivery rules:
//!
//! - listeners for a kind run synchronously, in registration order
//! - the listener list is snapshotted before the first call, so listeners
//!   added or removed during a publish only affect later publishes
//! - a listener that errors or panics is logged and skipped; later
//!   listeners still run
//!
//! [`EventStream`] offers the same events as an async stream for callers that
//! prefer polling over callbacks.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use pw_mirror_runtime::Result;
use tokio::sync::broadcast;

use crate::handlers::{HandlerId, Subscription, next_handler_id};

/// A typed event published by one kind of proxy.
pub trait ProtocolEvent: Clone + Send + Sync + 'static {
	/// Payload-free discriminant used to subscribe.
	type Kind: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

	fn kind(&self) -> Self::Kind;
}

/// Listener callback. Errors are logged by the hub.
pub type Listener<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

struct ListenerEntry<E> {
	listener: Listener<E>,
	once: bool,
}

type ListenerTable<E> = HashMap<<E as ProtocolEvent>::Kind, IndexMap<HandlerId, ListenerEntry<E>>>;

/// Listener registry for one proxy.
///
/// Cloning shares the registry.
pub struct EventHub<E: ProtocolEvent> {
	listeners: Arc<Mutex<ListenerTable<E>>>,
	stream_tx: broadcast::Sender<E>,
}

impl<E: ProtocolEvent> Clone for EventHub<E> {
	fn clone(&self) -> Self {
		Self {
			listeners: Arc::clone(&self.listeners),
			stream_tx: self.stream_tx.clone(),
		}
	}
}

impl<E: ProtocolEvent> Default for EventHub<E> {
	fn default() -> Self {
		Self::new()
	}
}

impl<E: ProtocolEvent> EventHub<E> {
	pub fn new() -> Self {
		let (stream_tx, _) = broadcast::channel(256);
		Self {
			listeners: Arc::new(Mutex::new(HashMap::new())),
			stream_tx,
		}
	}

	/// Registers `listener` for every future event of `kind`.
	pub fn on<F>(&self, kind: E::Kind, listener: F) -> Subscription
	where
		F: Fn(&E) -> Result<()> + Send + Sync + 'static,
	{
		self.subscribe(kind, Arc::new(listener), false)
	}

	/// Registers `listener` for the next event of `kind` only.
	pub fn once<F>(&self, kind: E::Kind, listener: F) -> Subscription
	where
		F: Fn(&E) -> Result<()> + Send + Sync + 'static,
	{
		self.subscribe(kind, Arc::new(listener), true)
	}

	fn subscribe(&self, kind: E::Kind, listener: Listener<E>, once: bool) -> Subscription {
		let id = next_handler_id();
		self.listeners
			.lock()
			.entry(kind)
			.or_default()
			.insert(id, ListenerEntry { listener, once });

		let weak: Weak<Mutex<ListenerTable<E>>> = Arc::downgrade(&self.listeners);
		Subscription::new(id, move |id| {
			if let Some(table) = weak.upgrade() {
				remove_entry(&mut table.lock(), kind, id);
			}
		})
	}

	/// Removes a listener by id. Returns false if it was already gone.
	pub fn unsubscribe(&self, kind: E::Kind, id: HandlerId) -> bool {
		remove_entry(&mut self.listeners.lock(), kind, id)
	}

	/// Delivers `event` to the listeners registered for its kind.
	pub fn publish(&self, event: E) {
		let kind = event.kind();
		let snapshot: Vec<(HandlerId, Listener<E>)> = {
			let mut table = self.listeners.lock();
			match table.get_mut(&kind) {
				Some(entries) => {
					let snapshot = entries.iter().map(|(id, e)| (*id, Arc::clone(&e.listener))).collect();
					entries.retain(|_, e| !e.once);
					snapshot
				}
				None => Vec::new(),
			}
		};

		for (id, listener) in snapshot {
			match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
				Ok(Ok(())) => {}
				Ok(Err(e)) => tracing::error!(%kind, handler_id = id, error = %e, "event listener failed"),
				Err(panic) => {
					tracing::error!(%kind, handler_id = id, panic = panic_message(&*panic), "event listener panicked")
				}
			}
		}

		let _ = self.stream_tx.send(event);
	}

	/// Number of listeners currently registered for `kind`.
	pub fn listener_count(&self, kind: E::Kind) -> usize {
		self.listeners.lock().get(&kind).map_or(0, IndexMap::len)
	}

	/// Number of listeners across all kinds.
	pub fn total_listeners(&self) -> usize {
		self.listeners.lock().values().map(IndexMap::len).sum()
	}

	/// Returns a stream of every event published from now on.
	pub fn stream(&self) -> EventStream<E> {
		EventStream {
			rx: self.stream_tx.subscribe(),
		}
	}

	/// Returns true if both handles share one registry.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.listeners, &other.listeners)
	}

	/// Returns true if `other` is this hub (possibly seen through another event type).
	pub(crate) fn is_same_hub<F: ProtocolEvent>(&self, other: &EventHub<F>) -> bool {
		(other as &dyn Any)
			.downcast_ref::<EventHub<E>>()
			.is_some_and(|other| self.ptr_eq(other))
	}
}

fn remove_entry<E: ProtocolEvent>(table: &mut ListenerTable<E>, kind: E::Kind, id: HandlerId) -> bool {
	match table.get_mut(&kind) {
		Some(entries) => {
			let removed = entries.shift_remove(&id).is_some();
			if entries.is_empty() {
				table.remove(&kind);
			}
			removed
		}
		None => false,
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
	panic
		.downcast_ref::<&str>()
		.copied()
		.or_else(|| panic.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("<non-string panic>")
}

impl<E: ProtocolEvent> fmt::Debug for EventHub<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventHub").field("listeners", &self.total_listeners()).finish()
	}
}

/// Async view of a hub's events.
///
/// Lagging receivers log a warning and continue with the oldest retained
/// event.
pub struct EventStream<E: ProtocolEvent> {
	rx: broadcast::Receiver<E>,
}

impl<E: ProtocolEvent> EventStream<E> {
	/// Receives the next event, or `None` once the hub is gone.
	pub async fn recv(&mut self) -> Option<E> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "event stream lagged, dropped events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Returns the next buffered event without waiting.
	pub fn try_recv(&mut self) -> Option<E> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "event stream lagged, dropped events");
				}
				Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => return None,
			}
		}
	}
}
