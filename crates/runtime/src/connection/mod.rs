//! Request/response correlation and the single dispatch path.
//!
//! This module sits on top of the transport and handles:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Distinguishing events from responses
//! - Materializing, adopting and disposing proxies from reserved events
//! - Dispatching every other event to its target proxy
//!
//! # Message Flow
//!
//! 1. Caller invokes `send_message()` with GUID, method, and params
//! 2. Connection allocates an id and parks a oneshot sender under it
//! 3. Request is serialized and queued for the writer task
//! 4. Caller awaits the oneshot receiver
//! 5. The run loop receives the response and completes the sender
//!
//! Events are handled strictly in arrival order by the run loop, so registry
//! and proxy state mutations never race each other.

mod object_store;


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

pub use object_store::ObjectStore;
use parking_lot::Mutex as ParkingLotMutex;
use pw_mirror_protocol::ObjectKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};

use crate::channel_owner::{ChannelOwner, DisposeReason, ParentOrConnection};
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Interface proxies need from the connection.
///
/// Object-safe so proxies can hold `Arc<dyn ConnectionLike>` without knowing
/// the transport behind it.
pub trait ConnectionLike: Send + Sync {
	/// Sends a command to the driver and awaits the reply.
	fn send_message(&self, guid: &str, method: &str, params: Value) -> BoxFuture<'_, Result<Value>>;

	/// Removes an id from the registry (synchronous).
	///
	/// Callable from `dispose()` without a runtime.
	fn unregister_object(&self, guid: &str);

	/// Looks up a registered object.
	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>>;

	/// Waits for an object to be registered, with timeout.
	///
	/// A reply can reference an id whose `__create__` has not been processed
	/// yet; this bridges that gap.
	fn wait_for_object(&self, guid: &str, timeout: Duration) -> AsyncChannelOwnerResult<'_>;
}

/// Boxed future used across the object-safe connection boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type alias for complex async return type
pub type AsyncChannelOwnerResult<'a> = BoxFuture<'a, Result<Arc<dyn ChannelOwner>>>;

/// Builds proxies for `__create__` announcements.
///
/// Implemented by the proxy crate and installed with
/// [`Connection::set_factory`] before [`Connection::run`].
pub trait ObjectFactory: Send + Sync {
	/// Creates a proxy for a new remote object.
	///
	/// # Errors
	///
	/// Fails if the initializer is malformed or references an id the
	/// registry does not know.
	fn create_object(
		&self,
		parent: ParentOrConnection,
		kind: ObjectKind,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn ChannelOwner>>;
}

/// Metadata attached to every outgoing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
	/// Unix timestamp in milliseconds
	#[serde(rename = "wallTime")]
	pub wall_time: i64,
	/// Whether this is an internal call (not user-facing API)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
}

impl Metadata {
	/// Create minimal metadata with current timestamp
	pub fn now() -> Self {
		let wall_time = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.unwrap_or_default();
		Self {
			wall_time,
			internal: Some(false),
		}
	}
}

/// Request sent to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Sequential id used to correlate the reply
	pub id: u32,
	/// GUID of the target object (format: "type@hash")
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	pub method: String,
	pub params: Value,
	pub metadata: Metadata,
}

/// Serde helpers for `Arc<str>` serialization
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = serde::Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Reply from the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request ID this response correlates to
	pub id: u32,
	/// Success result (mutually exclusive with error)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

/// Wrapper for protocol error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Protocol error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	/// Error type name (e.g., "TimeoutError", "TargetClosedError")
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Push notification from the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// GUID of the object that emitted the event
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (no `id` field)
	Event(Event),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<TokioMutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		let id = self.id;
		let callbacks = Arc::clone(&self.callbacks);

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				if callbacks.lock().await.remove(&id).is_some() {
					tracing::debug!(id, "removed orphaned callback");
				}
			});
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Connection to the driver process.
///
/// Owns the registry, correlates replies by sequential id and runs the one
/// dispatch path for push notifications.
pub struct Connection {
	last_id: AtomicU32,
	callbacks: CallbackMap,
	/// Set once the dispatch loop has ended
	closed: AtomicBool,
	/// Outbound queue drained by the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Pieces taken exactly once by `run()`
	transport_sender: TokioMutex<Option<Box<dyn Transport>>>,
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	objects: ObjectStore,
	factory: ParkingLotMutex<Option<Arc<dyn ObjectFactory>>>,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU32::new(0),
			closed: AtomicBool::new(false),
			callbacks: Arc::new(TokioMutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			objects: ObjectStore::new(),
			factory: ParkingLotMutex::new(None),
		}
	}

	/// Installs the object factory.
	///
	/// Must happen before `run()` for `__create__` messages to work.
	pub fn set_factory(&self, factory: Arc<dyn ObjectFactory>) {
		*self.factory.lock() = Some(factory);
	}

	/// Returns the object registry.
	pub fn objects(&self) -> &ObjectStore {
		&self.objects
	}

	/// Sends a command and awaits the reply.
	pub async fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);

		tracing::debug!(id, guid, method, "sending request");

		let (tx, rx) = oneshot::channel();
		{
			let mut callbacks = self.callbacks.lock().await;
			if self.closed.load(Ordering::SeqCst) {
				return Err(Error::ChannelClosed);
			}
			callbacks.insert(id, tx);
		}

		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = Request {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
			metadata: Metadata::now(),
		};

		let request_value = serde_json::to_value(&request)?;

		if self.outbound_tx.send(request_value).is_err() {
			tracing::error!(id, "outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Runs the reader, the writer and the dispatch loop until the driver
	/// closes its end.
	///
	/// Pending requests fail with [`Error::ChannelClosed`] once the loop
	/// ends so no caller hangs on a dead connection.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let transport_receiver = Self::take_once(&self.transport_receiver, "transport receiver").await?;
		let mut transport_sender = Self::take_once(&self.transport_sender, "transport sender").await?;
		let mut outbound_rx = Self::take_once(&self.outbound_rx, "outbound receiver").await?;
		let mut message_rx = Self::take_once(&self.message_rx, "message receiver").await?;

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!(error = %e, "transport read error");
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(message).await {
					tracing::error!(error = %e, "transport write error");
					break;
				}
			}
		});

		while let Some(message_value) = message_rx.recv().await {
			match serde_json::from_value::<Message>(message_value) {
				Ok(message) => {
					if let Err(e) = self.dispatch(message).await {
						tracing::error!(error = %e, "error dispatching message");
					}
				}
				Err(e) => {
					tracing::error!(error = %e, "failed to parse message");
				}
			}
		}

		let pending: Vec<_> = {
			let mut callbacks = self.callbacks.lock().await;
			self.closed.store(true, Ordering::SeqCst);
			callbacks.drain().collect()
		};
		for (id, callback) in pending {
			tracing::debug!(id, "failing pending request: connection closed");
			let _ = callback.send(Err(Error::ChannelClosed));
		}

		let _ = reader_handle.await;
		writer_handle.abort();
		Ok(())
	}

	async fn take_once<T>(slot: &TokioMutex<Option<T>>, what: &str) -> Result<T> {
		slot.lock()
			.await
			.take()
			.ok_or_else(|| Error::ProtocolError(format!("run() can only be called once - {what} already taken")))
	}

	/// Dispatches one inbound message on the caller's task.
	///
	/// `run()` calls this for every message it reads; callers that drive the
	/// connection themselves must keep calls sequential.
	pub async fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let callback = self.callbacks.lock().await.remove(&response.id).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id))
				})?;

				let result = match response.error {
					Some(error_wrapper) => {
						let error = parse_protocol_error(error_wrapper.error);
						tracing::debug!(
							id = response.id,
							error = %error,
							stack = error.stack_trace().unwrap_or_default(),
							"request failed"
						);
						Err(error)
					}
					None => Ok(response.result.unwrap_or(Value::Null)),
				};

				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => match event.method.as_str() {
				"__create__" => self.handle_create(event),
				"__dispose__" => self.handle_dispose(&event),
				"__adopt__" => self.handle_adopt(&event),
				_ => {
					let object = self.objects.try_get(&event.guid).ok_or_else(|| Error::ObjectNotFound {
						guid: event.guid.to_string(),
						expected: None,
					})?;
					tracing::debug!(guid = %event.guid, method = %event.method, "event");
					object.on_event(&event.method, event.params)
				}
			},
			Message::Unknown(value) => {
				tracing::debug!(%value, "unknown message type ignored");
				Ok(())
			}
		}
	}

	/// Handles `__create__`: register a new proxy under its owner.
	fn handle_create(self: &Arc<Self>, event: Event) -> Result<()> {
		let type_name = event.params["type"]
			.as_str()
			.ok_or_else(|| Error::ProtocolError("__create__ missing 'type'".to_string()))?;
		let kind = ObjectKind::from_type_name(type_name).ok_or_else(|| Error::UnknownObjectType(type_name.to_string()))?;

		let object_guid: Arc<str> = Arc::from(
			event.params["guid"]
				.as_str()
				.ok_or_else(|| Error::ProtocolError("__create__ missing 'guid'".to_string()))?,
		);

		if self.objects.contains(&object_guid) {
			tracing::error!(guid = %object_guid, %kind, "duplicate __create__ rejected");
			return Err(Error::DuplicateObject {
				guid: object_guid.to_string(),
			});
		}

		let parent = if event.guid.is_empty() {
			None
		} else {
			Some(self.objects.lookup(&event.guid)?)
		};
		let parent_or_conn = match &parent {
			Some(p) => ParentOrConnection::Parent(Arc::clone(p)),
			None => ParentOrConnection::Connection(Arc::clone(self) as Arc<dyn ConnectionLike>),
		};

		let factory = self
			.factory
			.lock()
			.clone()
			.ok_or_else(|| Error::ProtocolError("ObjectFactory not set - call set_factory() before run()".to_string()))?;

		let initializer = event.params.get("initializer").cloned().unwrap_or(Value::Null);
		let object = factory.create_object(parent_or_conn, kind, Arc::clone(&object_guid), initializer)?;

		self.objects.register(Arc::clone(&object_guid), object.clone())?;
		if let Some(parent) = parent {
			parent.add_child(Arc::clone(&object_guid), object);
		}

		tracing::debug!(guid = %object_guid, %kind, parent = %event.guid, "created object");
		Ok(())
	}

	/// Handles `__dispose__`.
	fn handle_dispose(&self, event: &Event) -> Result<()> {
		let reason = match event.params.get("reason").and_then(|r| r.as_str()) {
			Some("gc") => DisposeReason::GarbageCollected,
			_ => DisposeReason::Closed,
		};

		match self.objects.try_get(&event.guid) {
			Some(obj) => {
				obj.dispose(reason);
				tracing::debug!(guid = %event.guid, ?reason, "disposed object");
			}
			None => tracing::warn!(guid = %event.guid, "dispose for unknown object ignored"),
		}
		Ok(())
	}

	/// Handles `__adopt__`: move a child under the event's target.
	fn handle_adopt(&self, event: &Event) -> Result<()> {
		let child_guid = event.params["guid"]
			.as_str()
			.ok_or_else(|| Error::ProtocolError("__adopt__ missing 'guid'".to_string()))?;

		let new_parent = self.objects.lookup(&event.guid)?;
		let child = self.objects.lookup(child_guid)?;

		new_parent.adopt(Arc::clone(&child));
		child.set_parent(&new_parent);
		tracing::debug!(child = child_guid, new_parent = %event.guid, "adopted object");
		Ok(())
	}
}

/// Converts [`ErrorPayload`] from the driver into [`Error::Remote`].
fn parse_protocol_error(error: ErrorPayload) -> Error {
	Error::Remote {
		name: error.name.unwrap_or_else(|| "Error".to_string()),
		message: error.message,
		stack: error.stack,
	}
}

impl ConnectionLike for Connection {
	fn send_message(&self, guid: &str, method: &str, params: Value) -> BoxFuture<'_, Result<Value>> {
		let guid = guid.to_string();
		let method = method.to_string();
		Box::pin(async move { Connection::send_message(self, &guid, &method, params).await })
	}

	fn unregister_object(&self, guid: &str) {
		self.objects.remove(guid);
	}

	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.objects.lookup(guid)
	}

	fn wait_for_object(&self, guid: &str, timeout: Duration) -> AsyncChannelOwnerResult<'_> {
		let guid = guid.to_string();
		Box::pin(async move { self.objects.wait_for(&guid, timeout).await })
	}
}
