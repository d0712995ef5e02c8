//! Event waits: resolution, predicates, abort conditions and timeouts.

mod common;

use std::time::Duration;

use common::Driver;
use pw_mirror::{Error, PageEvent, PageEventKind, UrlMatcher, WaitOptions, WaitTimeout};
use serde_json::json;

async fn with_page() -> (Driver, pw_mirror::BrowserContext, pw_mirror::Page) {
	let driver = Driver::start();
	let context = driver.context("browser-context@1").await;
	let page = driver.open_page("browser-context@1", "page@1", "frame@1").await;
	(driver, context, page)
}

/// Yields until `page` has at least one `kind` listener.
async fn until_listening(page: &pw_mirror::Page, kind: PageEventKind) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while page.events().listener_count(kind) == 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("wait never armed");
}

async fn create_request(driver: &Driver, guid: &str, url: &str) {
	driver
		.create("page@1", "Request", guid, json!({"url": url, "method": "GET"}))
		.await
		.unwrap();
}

#[tokio::test]
async fn load_resolves_the_pending_wait() {
	let (driver, _context, page) = with_page().await;

	let waiter = page.expect_event(PageEventKind::Load, WaitOptions::default()).unwrap();
	assert!(!waiter.is_settled());
	driver.push("page@1", "load", json!({})).await.unwrap();
	assert!(waiter.is_settled());
	assert!(matches!(waiter.wait().await.unwrap(), PageEvent::Load));
}

#[tokio::test]
async fn load_over_the_pipe_resolves_the_pending_wait() {
	let (mut driver, _context, page) = with_page().await;

	let waiter = page
		.expect_event(PageEventKind::Load, WaitOptions::new().timeout(Duration::from_secs(5)))
		.unwrap();
	driver.emit("page@1", "load", json!({})).await;
	assert!(matches!(waiter.wait().await.unwrap(), PageEvent::Load));
}

#[tokio::test]
async fn predicate_skips_non_matching_events() {
	let (driver, _context, page) = with_page().await;
	for (guid, url) in [("request@a", "https://a.test/"), ("request@b", "https://b.test/"), ("request@x", "https://x.test/")] {
		create_request(&driver, guid, url).await;
	}

	let options = WaitOptions::<PageEvent>::new()
		.predicate(|event| matches!(event, PageEvent::Request(r) if r.url().starts_with("https://b.")));
	let waiter = page.expect_event(PageEventKind::Request, options).unwrap();

	driver.push("page@1", "request", json!({"request": {"guid": "request@a"}})).await.unwrap();
	assert!(!waiter.is_settled());
	driver.push("page@1", "request", json!({"request": {"guid": "request@b"}})).await.unwrap();
	driver.push("page@1", "request", json!({"request": {"guid": "request@x"}})).await.unwrap();

	let PageEvent::Request(request) = waiter.wait().await.unwrap() else {
		panic!("expected a request event");
	};
	assert_eq!(request.url(), "https://b.test/");
}

#[tokio::test]
async fn crash_aborts_the_wait_and_releases_listeners() {
	let (driver, _context, page) = with_page().await;
	let before = page.events().total_listeners();

	let waiter = page.expect_event(PageEventKind::Response, WaitOptions::default()).unwrap();
	assert!(page.events().total_listeners() > before);

	driver.push("page@1", "crash", json!({})).await.unwrap();
	driver
		.create("page@1", "Response", "response@1", json!({"url": "https://a.test/", "status": 200}))
		.await
		.unwrap();
	driver.push("page@1", "response", json!({"response": {"guid": "response@1"}})).await.unwrap();

	let err = waiter.wait().await.unwrap_err();
	assert!(matches!(err, Error::HardFail { ref condition, .. } if condition == "crash"), "{err}");
	assert_eq!(err.hard_fail_condition(), Some("crash"));
	assert_eq!(page.events().total_listeners(), before);
}

#[tokio::test]
async fn first_abort_condition_dispatched_wins() {
	let (driver, _context, page) = with_page().await;

	let waiter = page.expect_event(PageEventKind::Load, WaitOptions::default()).unwrap();
	driver.push("page@1", "close", json!({})).await.unwrap();
	driver.push("page@1", "crash", json!({})).await.unwrap();

	let err = waiter.wait().await.unwrap_err();
	assert!(matches!(err, Error::HardFail { ref condition, ref message } if condition == "close" && message == "Page closed"));
}

#[tokio::test]
async fn waiting_for_close_is_not_aborted_by_close() {
	let (driver, _context, page) = with_page().await;

	let waiter = page.expect_event(PageEventKind::Close, WaitOptions::default()).unwrap();
	driver.push("page@1", "close", json!({})).await.unwrap();
	assert!(matches!(waiter.wait().await.unwrap(), PageEvent::Close));
}

#[tokio::test]
async fn timeout_is_inherited_from_the_context() {
	let (_driver, context, page) = with_page().await;
	context.set_default_timeout(Duration::from_millis(50));

	let err = page
		.wait_for_event(PageEventKind::Load, WaitOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { ref event, timeout_ms: 50 } if event == "load"), "{err}");
	assert!(err.is_timeout());

	// A zero per-call timeout also inherits.
	let err = page
		.wait_for_event(PageEventKind::Load, WaitOptions::new().timeout(Duration::ZERO))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { timeout_ms: 50, .. }));
}

#[tokio::test]
async fn page_timeout_overrides_the_context() {
	let (_driver, context, page) = with_page().await;
	context.set_default_timeout(Duration::from_secs(60));
	page.set_default_timeout(Duration::from_millis(30));

	let err = page
		.wait_for_event(PageEventKind::DomContentLoaded, WaitOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { ref event, timeout_ms: 30 } if event == "domcontentloaded"));

	let err = page
		.wait_for_event(PageEventKind::DomContentLoaded, WaitOptions::new().timeout(Duration::from_millis(20)))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { timeout_ms: 20, .. }));
}

#[tokio::test]
async fn event_before_deadline_wins_and_later_timer_is_ignored() {
	let (driver, _context, page) = with_page().await;

	let waiter = page
		.expect_event(PageEventKind::Load, WaitOptions::new().timeout(Duration::from_millis(40)))
		.unwrap();
	driver.push("page@1", "load", json!({})).await.unwrap();
	tokio::time::sleep(Duration::from_millis(80)).await;

	assert!(matches!(waiter.wait().await.unwrap(), PageEvent::Load));
}

#[tokio::test]
async fn deadline_before_event_wins_and_later_event_is_ignored() {
	let (driver, _context, page) = with_page().await;
	let before = page.events().listener_count(PageEventKind::Load);

	let wait = {
		let page = page.clone();
		tokio::spawn(async move {
			page.wait_for_event(PageEventKind::Load, WaitOptions::new().timeout(Duration::from_millis(30)))
				.await
		})
	};
	let outcome = wait.await.unwrap();
	driver.push("page@1", "load", json!({})).await.unwrap();

	assert!(matches!(outcome, Err(Error::EventTimeout { .. })));
	assert_eq!(page.events().listener_count(PageEventKind::Load), before);
}

#[tokio::test]
async fn deadline_passes_while_nobody_polls() {
	let (driver, _context, page) = with_page().await;
	let before = page.events().listener_count(PageEventKind::Load);

	let waiter = page
		.expect_event(PageEventKind::Load, WaitOptions::new().timeout(Duration::from_millis(30)))
		.unwrap();
	tokio::time::sleep(Duration::from_millis(80)).await;

	// Expired and unsubscribed before anyone asked for the outcome.
	assert!(waiter.is_settled());
	assert_eq!(page.events().listener_count(PageEventKind::Load), before);

	driver.push("page@1", "load", json!({})).await.unwrap();
	let err = waiter.wait().await.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { ref event, timeout_ms: 30 } if event == "load"), "{err}");
}

#[tokio::test]
async fn trigger_outlasting_the_deadline_yields_a_timeout() {
	let (driver, _context, page) = with_page().await;

	let err = page
		.wait_for_event_with(
			PageEventKind::Load,
			WaitOptions::new().timeout(Duration::from_millis(30)),
			async {
				tokio::time::sleep(Duration::from_millis(80)).await;
				driver.push("page@1", "load", json!({})).await
			},
		)
		.await
		.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { .. }), "{err}");
}

#[tokio::test]
async fn independent_waits_resolve_separately() {
	let (driver, _context, page) = with_page().await;

	let load = page.expect_event(PageEventKind::Load, WaitOptions::default()).unwrap();
	let dom = page.expect_event(PageEventKind::DomContentLoaded, WaitOptions::default()).unwrap();
	let second_load = page.expect_event(PageEventKind::Load, WaitOptions::default()).unwrap();

	driver.push("page@1", "domcontentloaded", json!({})).await.unwrap();
	assert!(dom.is_settled());
	assert!(!load.is_settled());

	driver.push("page@1", "load", json!({})).await.unwrap();
	assert!(matches!(load.wait().await.unwrap(), PageEvent::Load));
	assert!(matches!(second_load.wait().await.unwrap(), PageEvent::Load));
	assert!(matches!(dom.wait().await.unwrap(), PageEvent::DomContentLoaded));
}

#[tokio::test]
async fn trigger_runs_after_the_wait_is_armed() {
	let (driver, _context, page) = with_page().await;

	let event = page
		.wait_for_event_with(PageEventKind::Load, WaitOptions::default(), async {
			// Dispatched before the waiter starts polling; still observed.
			driver.push("page@1", "load", json!({})).await
		})
		.await
		.unwrap();
	assert!(matches!(event, PageEvent::Load));
}

#[tokio::test]
async fn failing_trigger_cancels_the_wait() {
	let (driver, _context, page) = with_page().await;
	let before = page.events().total_listeners();

	let err = page
		.wait_for_event_with(PageEventKind::Load, WaitOptions::default(), async {
			driver.push("page@ghost", "load", json!({})).await
		})
		.await
		.unwrap_err();

	assert!(matches!(err, Error::ObjectNotFound { ref guid, .. } if guid == "page@ghost"));
	assert_eq!(page.events().total_listeners(), before);
}

#[tokio::test]
async fn closed_page_refuses_new_waits() {
	let (driver, _context, page) = with_page().await;
	driver.push("page@1", "close", json!({})).await.unwrap();

	let err = page.expect_event(PageEventKind::Load, WaitOptions::default()).unwrap_err();
	assert!(matches!(err, Error::TargetClosed { ref target_type, .. } if target_type == "Page"));
	assert!(err.is_target_closed());

	let err = page.wait_for_load_state(None, WaitTimeout::Inherit).await.unwrap_err();
	assert!(err.is_target_closed());
}

#[tokio::test]
async fn unbounded_wait_has_no_deadline() {
	let (driver, context, page) = with_page().await;
	context.set_default_timeout(Duration::from_millis(10));

	let wait = {
		let page = page.clone();
		tokio::spawn(async move {
			page.wait_for_event(PageEventKind::Load, WaitOptions::new().timeout(WaitTimeout::Unbounded))
				.await
		})
	};
	until_listening(&page, PageEventKind::Load).await;
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(!wait.is_finished());

	driver.push("page@1", "load", json!({})).await.unwrap();
	assert!(matches!(wait.await.unwrap().unwrap(), PageEvent::Load));
}

#[tokio::test]
async fn wait_for_request_matches_a_glob() {
	let (driver, _context, page) = with_page().await;
	create_request(&driver, "request@1", "https://example.com/logo.png").await;
	create_request(&driver, "request@2", "https://example.com/api/users").await;

	let wait = {
		let page = page.clone();
		tokio::spawn(async move {
			let matcher = UrlMatcher::glob("**/api/*").unwrap();
			page.wait_for_request(Some(matcher), Duration::from_secs(5)).await
		})
	};
	until_listening(&page, PageEventKind::Request).await;

	driver.push("page@1", "request", json!({"request": {"guid": "request@1"}})).await.unwrap();
	driver.push("page@1", "request", json!({"request": {"guid": "request@2"}})).await.unwrap();

	let request = wait.await.unwrap().unwrap();
	assert_eq!(request.url(), "https://example.com/api/users");
	assert_eq!(request.method(), "GET");
}

#[tokio::test]
async fn wait_for_response_links_back_to_its_request() {
	let (driver, _context, page) = with_page().await;
	create_request(&driver, "request@1", "https://example.com/data.json").await;
	driver
		.create(
			"page@1",
			"Response",
			"response@1",
			json!({"url": "https://example.com/data.json", "status": 404, "statusText": "Not Found", "request": {"guid": "request@1"}}),
		)
		.await
		.unwrap();

	let wait = {
		let page = page.clone();
		tokio::spawn(async move {
			page.wait_for_response(Some(UrlMatcher::exact("https://example.com/data.json")), WaitTimeout::Inherit)
				.await
		})
	};
	until_listening(&page, PageEventKind::Response).await;
	driver.push("page@1", "response", json!({"response": {"guid": "response@1"}})).await.unwrap();

	let response = wait.await.unwrap().unwrap();
	assert_eq!(response.status(), 404);
	assert!(!response.ok());
	assert_eq!(response.status_text(), "Not Found");
	assert_eq!(response.request().unwrap().url(), "https://example.com/data.json");
}
