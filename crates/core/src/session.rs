//! Session bootstrap: wire a transport to the proxy factory and start dispatch.

use std::sync::Arc;
use std::time::Duration;

use pw_mirror_runtime::{ChannelOwner, Connection, Error, PipeTransport, Result, TransportParts};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::browser_context::BrowserContext;
use crate::object_factory::ProxyFactory;
use crate::proxy;

/// A live connection to the driver with its dispatch loop running.
pub struct Session {
	connection: Arc<Connection>,
	dispatch: JoinHandle<Result<()>>,
}

/// Installs the proxy factory on a new connection and spawns its dispatch loop.
///
/// Must be called from within a tokio runtime.
pub fn connect(parts: TransportParts) -> Session {
	let connection = Arc::new(Connection::new(parts));
	connection.set_factory(Arc::new(ProxyFactory));

	let dispatch = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move {
			let result = connection.run().await;
			tracing::debug!(ok = result.is_ok(), "dispatch loop finished");
			result
		})
	};

	Session { connection, dispatch }
}

/// [`connect`] over the driver's stdin/stdout pipes.
pub fn connect_pipes<W, R>(stdin: W, stdout: R) -> Session
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	let (transport, message_rx) = PipeTransport::new(stdin, stdout);
	connect(transport.into_transport_parts(message_rx))
}

impl Session {
	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	/// Waits for the driver to announce the context `guid`.
	pub async fn context(&self, guid: &str, timeout: Duration) -> Result<BrowserContext> {
		let object = self.connection.objects().wait_for(guid, timeout).await?;
		proxy::downcast(&object)
	}

	/// Looks up a registered proxy by id.
	pub fn object<T: ChannelOwner + Clone>(&self, guid: &str) -> Result<T> {
		proxy::lookup(self.connection.as_ref(), guid)
	}

	/// Returns true once the dispatch loop has stopped.
	pub fn is_finished(&self) -> bool {
		self.dispatch.is_finished()
	}

	/// Waits for the driver to close its end and the dispatch loop to drain.
	pub async fn join(self) -> Result<()> {
		self.dispatch
			.await
			.map_err(|e| Error::TransportError(format!("dispatch task failed: {e}")))?
	}

	/// Stops the dispatch loop without waiting for the driver.
	pub fn shutdown(self) {
		self.dispatch.abort();
	}
}
