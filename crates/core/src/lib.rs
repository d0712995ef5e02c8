//! pw-mirror: a live local mirror of objects owned by a driver process.
//!
//! The driver announces contexts, pages and frames with push notifications;
//! this crate keeps one proxy per remote object, routes every notification
//! to its proxy's typed [`EventHub`], and lets callers wait for future events
//! with timeouts and abort conditions.
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use pw_mirror::{PageEventKind, WaitOptions};
//!
//! #[tokio::main]
//! async fn main() -> pw_mirror::Result<()> {
//!     let session = pw_mirror::connect_pipes(driver_stdin, driver_stdout);
//!     let context = session.context("browser-context@1", Duration::from_secs(5)).await?;
//!     let page = context.new_page().await?;
//!
//!     let load = page.expect_event(PageEventKind::Load, WaitOptions::default())?;
//!     page.goto("https://example.com", None).await?;
//!     load.wait().await?;
//!
//!     let png = page.screenshot(None).await?;
//!     assert!(!png.is_empty());
//!     page.close(None).await
//! }
//! ```

mod object_factory;
mod proxy;
mod session;

pub mod browser_context;
pub mod console;
pub mod events;
pub mod frame;
pub mod handlers;
pub mod network;
pub mod page;
pub mod timeout_settings;
pub mod wait;

pub use browser_context::{BrowserContext, ContextEvent, ContextEventKind};
pub use console::{ConsoleLocation, ConsoleMessage, ConsoleMessageKind};
pub use events::{EventHub, EventStream, ProtocolEvent};
pub use frame::{Frame, FrameEvent, FrameEventKind, Navigation};
pub use handlers::{HandlerId, Subscription, UrlMatcher};
pub use network::{Request, Response};
pub use object_factory::ProxyFactory;
pub use page::{FrameQuery, Page, PageEvent, PageEventKind};
pub use pw_mirror_protocol::{
	CloseOptions, DEFAULT_TIMEOUT_MS, GotoOptions, LoadState, ObjectKind, ScreenshotClip, ScreenshotOptions,
	ScreenshotType, Viewport,
};
pub use pw_mirror_runtime::{ChannelOwner, Connection, Error, PipeTransport, Result, TransportParts};
pub use session::{Session, connect, connect_pipes};
pub use timeout_settings::TimeoutSettings;
pub use wait::{WaitBuilder, WaitOptions, WaitTimeout, Waiter};
