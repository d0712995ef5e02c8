//! ChannelOwner - base trait for every mirrored remote object.
//!
//! All proxies (BrowserContext, Page, Frame, ...) implement ChannelOwner to:
//! - Represent one remote object via its GUID
//! - Participate in parent-child ownership (dispose, adopt)
//! - Receive push notifications addressed to them
//! - Issue commands through their [`Channel`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::{Mutex, RwLock};
use pw_mirror_protocol::ObjectKind;
use serde_json::Value;

use crate::channel::Channel;
use crate::connection::ConnectionLike;
use crate::error::Result;

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `ChannelOwner`.
	pub trait Sealed {}
}

type ChildrenRegistry = HashMap<Arc<str>, Arc<dyn ChannelOwner>>;

/// Reason why an object was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// The driver tore the object down (close, navigation, ...).
	Closed,
	/// The driver garbage collected the object.
	GarbageCollected,
}

/// Owner of a newly announced object: another proxy or the connection root.
pub enum ParentOrConnection {
	Parent(Arc<dyn ChannelOwner>),
	Connection(Arc<dyn ConnectionLike>),
}

/// Base trait for all mirrored objects.
///
/// Sealed: only the pw-mirror crates implement it.
pub trait ChannelOwner: private::Sealed + DowncastSync {
	/// Returns the remote id.
	fn guid(&self) -> &str;

	/// Returns the remote object kind.
	fn kind(&self) -> ObjectKind;

	/// Returns the current owner, if any.
	fn parent(&self) -> Option<Arc<dyn ChannelOwner>>;

	/// Returns the connection this object belongs to.
	fn connection(&self) -> Arc<dyn ConnectionLike>;

	/// Returns the creation-time snapshot sent by the driver.
	fn initializer(&self) -> &Value;

	/// Returns the channel for commands.
	fn channel(&self) -> &Channel;

	/// Disposes this object and all its children.
	fn dispose(&self, reason: DisposeReason);

	/// Moves `child` from its old owner into this object's children.
	fn adopt(&self, child: Arc<dyn ChannelOwner>);

	/// Re-points the owner link after an adoption.
	fn set_parent(&self, parent: &Arc<dyn ChannelOwner>);

	fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>);

	fn remove_child(&self, guid: &str);

	/// Handles a push notification addressed to this object.
	///
	/// Runs on the dispatch path. An error is logged by the dispatcher and
	/// never stops delivery of later notifications.
	fn on_event(&self, method: &str, params: Value) -> Result<()>;

	/// Returns true if the driver garbage collected this object.
	fn was_collected(&self) -> bool;
}

impl_downcast!(sync ChannelOwner);

/// Shared state embedded in every proxy.
///
/// Cloning shares all state; the parent link and the collected flag are
/// visible through every clone.
#[derive(Clone)]
pub struct ChannelOwnerImpl {
	guid: Arc<str>,
	kind: ObjectKind,
	parent: Arc<RwLock<Option<Weak<dyn ChannelOwner>>>>,
	connection: Arc<dyn ConnectionLike>,
	children: Arc<Mutex<ChildrenRegistry>>,
	channel: Channel,
	initializer: Arc<Value>,
	was_collected: Arc<AtomicBool>,
}

impl ChannelOwnerImpl {
	pub fn new(parent: ParentOrConnection, kind: ObjectKind, guid: Arc<str>, initializer: Value) -> Self {
		let (connection, parent_link) = match parent {
			ParentOrConnection::Parent(p) => (p.connection(), Some(Arc::downgrade(&p))),
			ParentOrConnection::Connection(c) => (c, None),
		};

		let channel = Channel::new(Arc::clone(&guid), connection.clone());

		Self {
			guid,
			kind,
			parent: Arc::new(RwLock::new(parent_link)),
			connection,
			children: Arc::new(Mutex::new(HashMap::new())),
			channel,
			initializer: Arc::new(initializer),
			was_collected: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn kind(&self) -> ObjectKind {
		self.kind
	}

	/// Returns the owner if it is still alive.
	pub fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.parent.read().as_ref().and_then(Weak::upgrade)
	}

	pub fn set_parent(&self, parent: &Arc<dyn ChannelOwner>) {
		*self.parent.write() = Some(Arc::downgrade(parent));
	}

	pub fn connection(&self) -> Arc<dyn ConnectionLike> {
		self.connection.clone()
	}

	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	/// Disposes this object and all children recursively.
	///
	/// Unregisters every id from the connection. Terminal flags of the
	/// proxies themselves are left to their owners' lifecycle handling.
	pub fn dispose(&self, reason: DisposeReason) {
		if reason == DisposeReason::GarbageCollected {
			self.was_collected.store(true, Ordering::SeqCst);
		}

		if let Some(parent) = self.parent() {
			parent.remove_child(&self.guid);
		}

		self.connection.unregister_object(&self.guid);

		let children: Vec<_> = self.children.lock().drain().map(|(_, child)| child).collect();
		for child in children {
			child.dispose(reason);
		}
	}

	/// Removes `child` from its previous owner and records it here.
	///
	/// The caller re-points the child's own parent link via
	/// [`ChannelOwner::set_parent`].
	pub fn adopt(&self, child: Arc<dyn ChannelOwner>) {
		if let Some(old_parent) = child.parent() {
			old_parent.remove_child(child.guid());
		}
		self.add_child(Arc::from(child.guid()), child);
	}

	pub fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
		self.children.lock().insert(guid, child);
	}

	pub fn remove_child(&self, guid: &str) {
		self.children.lock().remove(guid);
	}

	/// Fallback for notifications a proxy does not model.
	pub fn on_event(&self, method: &str, params: Value) -> Result<()> {
		tracing::trace!(guid = %self.guid, kind = %self.kind, method, ?params, "unhandled event");
		Ok(())
	}

	pub fn was_collected(&self) -> bool {
		self.was_collected.load(Ordering::SeqCst)
	}
}
