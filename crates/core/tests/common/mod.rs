//! In-memory driver standing in for the real driver process.
//!
//! Commands sent by the client are decoded from the pipe and handed to the
//! test; replies travel back over the pipe. Push notifications can go either
//! over the pipe ([`Driver::emit`]) or straight into the dispatch path
//! ([`Driver::push`]) when a test needs them applied before it continues.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pw_mirror::{BrowserContext, Connection, Page, Session};
use pw_mirror_runtime::Message;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub struct Driver {
	pub session: Session,
	requests: mpsc::UnboundedReceiver<Value>,
	stdout: DuplexStream,
}

impl Driver {
	pub fn start() -> Self {
		init_tracing();

		let (client_stdin, mut driver_stdin) = duplex(1 << 20);
		let (stdout, client_stdout) = duplex(1 << 20);
		let session = pw_mirror::connect_pipes(client_stdin, client_stdout);

		let (tx, requests) = mpsc::unbounded_channel();
		tokio::spawn(async move {
			while let Ok(len) = driver_stdin.read_u32_le().await {
				let mut body = vec![0u8; len as usize];
				if driver_stdin.read_exact(&mut body).await.is_err() {
					break;
				}
				let request: Value = serde_json::from_slice(&body).expect("client sent invalid JSON");
				if tx.send(request).is_err() {
					break;
				}
			}
		});

		Self {
			session,
			requests,
			stdout,
		}
	}

	pub fn connection(&self) -> &Arc<Connection> {
		self.session.connection()
	}

	/// Next command the client sent.
	pub async fn next_request(&mut self) -> Value {
		tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
			.await
			.expect("no request within 5s")
			.expect("request stream ended")
	}

	/// Next command, which must be `method`.
	pub async fn expect_request(&mut self, method: &str) -> Value {
		let request = self.next_request().await;
		assert_eq!(request["method"], method, "unexpected request: {request}");
		request
	}

	/// Returns true if the client has sent nothing new.
	pub fn no_pending_requests(&mut self) -> bool {
		self.requests.try_recv().is_err()
	}

	pub async fn reply(&mut self, request: &Value, result: Value) {
		self.write(json!({"id": request["id"], "result": result})).await;
	}

	pub async fn reply_error(&mut self, request: &Value, name: &str, message: &str) {
		self.write(json!({"id": request["id"], "error": {"error": {"name": name, "message": message}}}))
			.await;
	}

	/// Sends a push notification over the pipe.
	pub async fn emit(&mut self, guid: &str, method: &str, params: Value) {
		self.write(json!({"guid": guid, "method": method, "params": params})).await;
	}

	/// Dispatches a push notification directly, returning the dispatch result.
	pub async fn push(&self, guid: &str, method: &str, params: Value) -> pw_mirror::Result<()> {
		let message: Message =
			serde_json::from_value(json!({"guid": guid, "method": method, "params": params})).expect("valid message");
		self.connection().dispatch(message).await
	}

	pub async fn create(&self, parent: &str, kind: &str, guid: &str, initializer: Value) -> pw_mirror::Result<()> {
		self.push(
			parent,
			"__create__",
			json!({"type": kind, "guid": guid, "initializer": initializer}),
		)
		.await
	}

	/// Announces a root context.
	pub async fn context(&self, guid: &str) -> BrowserContext {
		self.create("", "BrowserContext", guid, json!({})).await.unwrap();
		self.session.object(guid).unwrap()
	}

	/// Announces a main frame, then a page using it, then tells the context.
	pub async fn open_page(&self, context: &str, page: &str, frame: &str) -> Page {
		self.create(context, "Frame", frame, json!({"url": "about:blank", "name": ""}))
			.await
			.unwrap();
		self.create(
			context,
			"Page",
			page,
			json!({"mainFrame": {"guid": frame}, "viewportSize": {"width": 1280, "height": 720}}),
		)
		.await
		.unwrap();
		self.push(context, "page", json!({"page": {"guid": page}})).await.unwrap();
		self.session.object(page).unwrap()
	}

	/// Closes the driver's stdout, as if the driver process exited.
	pub fn hang_up(self) -> Session {
		drop(self.stdout);
		self.session
	}

	async fn write(&mut self, message: Value) {
		let body = serde_json::to_vec(&message).unwrap();
		self.stdout.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
		self.stdout.write_all(&body).await.unwrap();
		self.stdout.flush().await.unwrap();
	}
}
