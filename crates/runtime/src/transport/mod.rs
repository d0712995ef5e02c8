//! Pipe transport to the driver process.
//!
//! Messages are framed as a 4-byte little-endian length followed by UTF-8
//! JSON, in both directions. The transport knows nothing about message
//! meaning; it hands decoded JSON values to the connection over an unbounded
//! channel.


use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::connection::BoxFuture;
use crate::error::{Error, Result};

/// Largest frame accepted from the driver.
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Write half of a transport.
pub trait Transport: Send {
	/// Frames and writes one message.
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;
}

/// Read half of a transport. Consumed by the connection's run loop.
pub trait TransportReceiver: Send {
	/// Reads frames until EOF or until the message channel closes.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Everything a [`Connection`](crate::Connection) needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Transport over the driver's stdin/stdout (or any pair of byte pipes).
pub struct PipeTransport<W, R> {
	stdin: W,
	stdout: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport writing to `stdin` and reading from `stdout`.
	///
	/// Returns the receiver for decoded inbound messages.
	pub fn new(stdin: W, stdout: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				stdin,
				stdout,
				message_tx,
			},
			message_rx,
		)
	}

	/// Reads frames until EOF or until the receiver is dropped.
	pub async fn run(&mut self) -> Result<()> {
		read_loop(&mut self.stdout, &self.message_tx).await
	}

	/// Splits into independently owned write and read halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender { stdin: self.stdin },
			PipeTransportReceiver {
				stdout: self.stdout,
				message_tx: self.message_tx,
			},
		)
	}

	/// Boxes both halves together with the inbound receiver.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Write half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
	stdin: W,
}

impl<W: AsyncWrite + Unpin + Send> Transport for PipeTransportSender<W> {
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let payload = serde_json::to_vec(&message)?;
			let len = u32::try_from(payload.len())
				.map_err(|_| Error::TransportError(format!("Message too large: {} bytes", payload.len())))?;
			self.stdin.write_all(&len.to_le_bytes()).await?;
			self.stdin.write_all(&payload).await?;
			self.stdin.flush().await?;
			Ok(())
		})
	}
}

/// Read half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	stdout: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportReceiver for PipeTransportReceiver<R> {
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		let PipeTransportReceiver { mut stdout, message_tx } = *self;
		Box::pin(async move { read_loop(&mut stdout, &message_tx).await })
	}
}

async fn read_loop<R: AsyncRead + Unpin>(stdout: &mut R, message_tx: &mpsc::UnboundedSender<Value>) -> Result<()> {
	loop {
		let message = read_frame(stdout).await?;
		if message_tx.send(message).is_err() {
			tracing::debug!("message receiver dropped, stopping transport reader");
			return Ok(());
		}
	}
}

async fn read_frame<R: AsyncRead + Unpin>(stdout: &mut R) -> Result<Value> {
	let mut header = [0u8; 4];
	stdout
		.read_exact(&mut header)
		.await
		.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;

	let len = u32::from_le_bytes(header) as usize;
	if len > MAX_FRAME_BYTES {
		return Err(Error::TransportError(format!(
			"Frame of {len} bytes exceeds limit of {MAX_FRAME_BYTES}"
		)));
	}

	let mut payload = vec![0u8; len];
	stdout
		.read_exact(&mut payload)
		.await
		.map_err(|e| Error::TransportError(format!("Failed to read message body: {e}")))?;

	serde_json::from_slice(&payload).map_err(Into::into)
}
