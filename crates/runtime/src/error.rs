//! Error types for the pw-mirror runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry, the wait subsystem and remote commands.
#[derive(Debug, Error)]
pub enum Error {
	/// The driver announced an id that is already registered.
	///
	/// The existing proxy is kept; the new announcement is rejected.
	#[error("Duplicate object id: {guid} is already registered")]
	DuplicateObject { guid: String },

	/// Object not found in the connection registry.
	#[error("Object not found: {guid}{}", expected.map(|t| format!(" (expected {})", t)).unwrap_or_default())]
	ObjectNotFound { guid: String, expected: Option<&'static str> },

	/// A wait's timer expired before the awaited event fired.
	#[error("Timeout {timeout_ms}ms exceeded while waiting for event \"{event}\"")]
	EventTimeout { event: String, timeout_ms: u64 },

	/// An abort condition fired while waiting for something else.
	#[error("{message}")]
	HardFail {
		/// Event that fired (e.g. `crash`, `close`, `detached`)
		condition: String,
		/// Human-readable message
		message: String,
	},

	/// Operation addressed to a container already in terminal state.
	#[error("{target_type} {guid} was detached")]
	Detached { target_type: &'static str, guid: String },

	/// Target was closed (context or page).
	#[error("Target closed: Cannot perform operation on closed {target_type}. {context}")]
	TargetClosed { target_type: String, context: String },

	/// Remote driver error with full context.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name (e.g., "TimeoutError", "Error", "TargetClosedError")
		name: String,
		/// Human-readable error message
		message: String,
		/// Stack trace from the driver (if available)
		stack: Option<String>,
	},

	/// Timeout waiting for a referenced object to be announced.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Unknown protocol object type.
	#[error("Unknown protocol object type: {0}")]
	UnknownObjectType(String),

	/// Protocol-level error (malformed or out-of-order messages).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Transport-level error (pipe communication).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Invalid argument provided to method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) | Error::EventTimeout { .. } => true,
			Error::Remote { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}

	/// Returns true if this is a target closed error.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::TargetClosed { .. } => true,
			Error::Remote { name, .. } => name == "TargetClosedError",
			_ => false,
		}
	}

	/// Returns true if the error only says the target is already gone.
	///
	/// Closing something that is already closed counts as success. A dead
	/// connection ([`Error::ChannelClosed`]) is a different failure and is not
	/// included.
	pub fn is_safe_close_error(&self) -> bool {
		match self {
			Error::TargetClosed { .. } => true,
			Error::Remote { name, message, .. } => {
				name == "TargetClosedError"
					|| message.ends_with("Target page, context or browser has been closed")
					|| message.ends_with("Browser has been closed")
			}
			_ => false,
		}
	}

	/// Returns the condition name if this is a hard-fail error.
	pub fn hard_fail_condition(&self) -> Option<&str> {
		match self {
			Error::HardFail { condition, .. } => Some(condition),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn event_timeout_names_event() {
		let err = Error::EventTimeout {
			event: "load".into(),
			timeout_ms: 250,
		};
		assert!(err.is_timeout());
		assert_eq!(err.to_string(), "Timeout 250ms exceeded while waiting for event \"load\"");
	}

	#[test]
	fn remote_target_closed_is_safe_to_ignore_on_close() {
		let err = Error::Remote {
			name: "Error".into(),
			message: "page.close: Target page, context or browser has been closed".into(),
			stack: None,
		};
		assert!(err.is_safe_close_error());
		assert!(!err.is_target_closed());

		let other = Error::Remote {
			name: "Error".into(),
			message: "net::ERR_FAILED".into(),
			stack: None,
		};
		assert!(!other.is_safe_close_error());
	}

	#[test]
	fn lost_connection_is_not_a_safe_close() {
		assert!(!Error::ChannelClosed.is_safe_close_error());
		assert!(
			Error::TargetClosed {
				target_type: "Page".into(),
				context: "page@1 is closed".into(),
			}
			.is_safe_close_error()
		);
	}

	#[test]
	fn stack_trace_only_for_remote_errors() {
		let err = Error::Remote {
			name: "Error".into(),
			message: "boom".into(),
			stack: Some("at page.goto".into()),
		};
		assert_eq!(err.stack_trace(), Some("at page.goto"));
		assert_eq!(Error::ChannelClosed.stack_trace(), None);
	}

	#[test]
	fn hard_fail_displays_message() {
		let err = Error::HardFail {
			condition: "crash".into(),
			message: "Page crashed".into(),
		};
		assert_eq!(err.to_string(), "Page crashed");
		assert_eq!(err.hard_fail_condition(), Some("crash"));
	}
}
