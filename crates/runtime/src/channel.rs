//! Command proxy bound to one remote object.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::ConnectionLike;
use crate::error::{Error, Result};

/// Sends commands to the driver on behalf of one proxy.
///
/// Every [`ChannelOwner`](crate::ChannelOwner) holds one. Replies are
/// consumed by the awaiting caller; nothing here touches proxy state.
#[derive(Clone)]
pub struct Channel {
	guid: Arc<str>,
	connection: Arc<dyn ConnectionLike>,
}

impl Channel {
	pub fn new(guid: Arc<str>, connection: Arc<dyn ConnectionLike>) -> Self {
		Self { guid, connection }
	}

	/// Sends `method` and decodes the reply.
	pub async fn send<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
		let params = serde_json::to_value(params)?;
		let reply = self.connection.send_message(&self.guid, method, params).await?;
		serde_json::from_value(reply).map_err(Into::into)
	}

	/// Sends `method` with a `timeout` field (milliseconds) filled in.
	///
	/// An explicit `timeout` already present in `params` wins. `None` leaves
	/// the params untouched, which the driver reads as "no limit".
	pub async fn send_with_timeout<P: Serialize, R: DeserializeOwned>(
		&self,
		method: &str,
		params: P,
		timeout: Option<Duration>,
	) -> Result<R> {
		let mut params = serde_json::to_value(params)?;
		if let Some(timeout) = timeout {
			match &mut params {
				Value::Object(map) => {
					map.entry("timeout").or_insert_with(|| (timeout.as_millis() as f64).into());
				}
				Value::Null => params = serde_json::json!({ "timeout": timeout.as_millis() as f64 }),
				other => {
					return Err(Error::InvalidArgument(format!(
						"{method}: params must be an object to carry a timeout, got {other}"
					)));
				}
			}
		}
		self.send(method, params).await
	}

	/// Sends a command with no parameters.
	pub async fn send_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
		self.send(method, Value::Null).await
	}

	/// Sends a command whose reply carries nothing of interest.
	pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		let _: Value = self.send(method, params).await?;
		Ok(())
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}
}
