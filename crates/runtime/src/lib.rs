//! pw-mirror runtime: connection, registry and transport.
//!
//! This crate provides the low-level plumbing for mirroring objects that
//! live in a driver process:
//!
//! - **Transport**: length-prefixed JSON over a pair of pipes
//! - **Connection**: request/response correlation and the single dispatch path
//! - **Object registry**: one proxy per remote id, with per-id wakeups
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  pw-mirror   │  Proxies (BrowserContext, Page, Frame, ...)
//! └──────┬───────┘
//!        │ implements ObjectFactory
//! ┌──────▼───────┐
//! │  runtime     │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  correlation + dispatch
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Store  │  │  identity map
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  pipe framing
//! │  └────────┘  │
//! └──────────────┘
//! ```
//!
//! The `Connection` builds proxies through the [`ObjectFactory`] trait so it
//! never depends on their concrete types.

pub mod channel;
pub mod channel_owner;
pub mod connection;
pub mod error;
pub mod transport;

pub use channel::Channel;
pub use channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
pub use connection::{
	Connection, ConnectionLike, ErrorPayload, ErrorWrapper, Event, Message, Metadata, ObjectFactory, ObjectStore, Request,
	Response,
};
pub use error::{Error, Result};
pub use transport::{PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts, TransportReceiver};
