//! Shared plumbing for the concrete proxy types.

use std::sync::Arc;

use pw_mirror_runtime::{ChannelOwner, ConnectionLike, Error, Result};
use serde_json::Value;

/// Implements [`ChannelOwner`] by delegating to the proxy's `base` field.
///
/// Push notifications go to the proxy's inherent `handle_event` method.
macro_rules! channel_owner_impl {
	($ty:ty) => {
		impl pw_mirror_runtime::channel_owner::private::Sealed for $ty {}

		impl pw_mirror_runtime::ChannelOwner for $ty {
			fn guid(&self) -> &str {
				self.base.guid()
			}

			fn kind(&self) -> pw_mirror_protocol::ObjectKind {
				self.base.kind()
			}

			fn parent(&self) -> Option<std::sync::Arc<dyn pw_mirror_runtime::ChannelOwner>> {
				self.base.parent()
			}

			fn connection(&self) -> std::sync::Arc<dyn pw_mirror_runtime::ConnectionLike> {
				self.base.connection()
			}

			fn initializer(&self) -> &serde_json::Value {
				self.base.initializer()
			}

			fn channel(&self) -> &pw_mirror_runtime::Channel {
				self.base.channel()
			}

			fn dispose(&self, reason: pw_mirror_runtime::DisposeReason) {
				self.base.dispose(reason)
			}

			fn adopt(&self, child: std::sync::Arc<dyn pw_mirror_runtime::ChannelOwner>) {
				self.base.adopt(child)
			}

			fn set_parent(&self, parent: &std::sync::Arc<dyn pw_mirror_runtime::ChannelOwner>) {
				self.base.set_parent(parent)
			}

			fn add_child(&self, guid: std::sync::Arc<str>, child: std::sync::Arc<dyn pw_mirror_runtime::ChannelOwner>) {
				self.base.add_child(guid, child)
			}

			fn remove_child(&self, guid: &str) {
				self.base.remove_child(guid)
			}

			fn on_event(&self, method: &str, params: serde_json::Value) -> pw_mirror_runtime::Result<()> {
				self.handle_event(method, params)
			}

			fn was_collected(&self) -> bool {
				self.base.was_collected()
			}
		}
	};
}

pub(crate) use channel_owner_impl;

/// Clones the concrete proxy out of a registry entry.
pub(crate) fn downcast<T: ChannelOwner + Clone>(object: &Arc<dyn ChannelOwner>) -> Result<T> {
	object.downcast_ref::<T>().cloned().ok_or_else(|| {
		Error::ProtocolError(format!(
			"Expected {} object, got {} {}",
			short_type_name::<T>(),
			object.kind(),
			object.guid()
		))
	})
}

/// Looks up `guid` and downcasts it.
pub(crate) fn lookup<T: ChannelOwner + Clone>(connection: &dyn ConnectionLike, guid: &str) -> Result<T> {
	let object = connection.get_object(guid).map_err(|e| match e {
		Error::ObjectNotFound { guid, .. } => Error::ObjectNotFound {
			guid,
			expected: Some(short_type_name::<T>()),
		},
		other => other,
	})?;
	downcast(&object)
}

/// Reads `{key: {guid}}` from event params or an initializer.
pub(crate) fn guid_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
	params
		.get(key)
		.and_then(|v| v.get("guid"))
		.and_then(Value::as_str)
		.ok_or_else(|| Error::ProtocolError(format!("missing '{key}.guid'")))
}

fn short_type_name<T>() -> &'static str {
	let full = std::any::type_name::<T>();
	full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guid_param_reads_nested_reference() {
		let params = serde_json::json!({"frame": {"guid": "frame@1"}});
		assert_eq!(guid_param(&params, "frame").unwrap(), "frame@1");
		assert!(matches!(guid_param(&params, "page"), Err(Error::ProtocolError(_))));
	}

	#[test]
	fn short_type_names() {
		assert_eq!(short_type_name::<crate::Page>(), "Page");
		assert_eq!(short_type_name::<crate::Frame>(), "Frame");
	}
}
