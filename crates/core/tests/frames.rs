//! Frame lifecycle, frame lookup and frame-scoped waits.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Driver;
use pw_mirror::{Error, Frame, FrameQuery, LoadState, Page, PageEventKind, UrlMatcher, WaitTimeout};
use serde_json::json;

async fn with_iframe() -> (Driver, Page, Frame) {
	let driver = Driver::start();
	driver.context("browser-context@1").await;
	let page = driver.open_page("browser-context@1", "page@1", "frame@main").await;
	driver
		.create("page@1", "Frame", "frame@ad", json!({"name": "ad", "url": "https://ads.example/slot"}))
		.await
		.unwrap();
	driver
		.push("page@1", "frameAttached", json!({"frame": {"guid": "frame@ad"}}))
		.await
		.unwrap();
	let iframe = driver.session.object("frame@ad").unwrap();
	(driver, page, iframe)
}

fn counter(page: &Page, kind: PageEventKind) -> (Arc<AtomicUsize>, pw_mirror::Subscription) {
	let hits = Arc::new(AtomicUsize::new(0));
	let sub = {
		let hits = Arc::clone(&hits);
		page.on(kind, move |_| {
			hits.fetch_add(1, Ordering::SeqCst);
			Ok(())
		})
	};
	(hits, sub)
}

fn guids(frames: &[Frame]) -> Vec<String> {
	frames.iter().map(|f| f.guid().to_string()).collect()
}

#[tokio::test]
async fn main_frame_is_attached_at_creation() {
	let driver = Driver::start();
	driver.context("browser-context@1").await;
	let page = driver.open_page("browser-context@1", "page@1", "frame@main").await;

	assert_eq!(guids(&page.frames()), ["frame@main"]);
	let main = page.main_frame();
	assert!(!main.is_detached());
	assert_eq!(main.page().unwrap().guid(), "page@1");
	assert_eq!(page.url(), "about:blank");
}

#[tokio::test]
async fn attach_and_detach_are_idempotent() {
	let (driver, page, iframe) = with_iframe().await;
	let (attached, _a) = counter(&page, PageEventKind::FrameAttached);
	let (detached, _d) = counter(&page, PageEventKind::FrameDetached);

	assert_eq!(guids(&page.frames()), ["frame@main", "frame@ad"]);

	driver
		.push("page@1", "frameAttached", json!({"frame": {"guid": "frame@ad"}}))
		.await
		.unwrap();
	assert_eq!(page.frames().len(), 2);
	assert_eq!(attached.load(Ordering::SeqCst), 0);

	for _ in 0..2 {
		driver
			.push("page@1", "frameDetached", json!({"frame": {"guid": "frame@ad"}}))
			.await
			.unwrap();
	}
	assert_eq!(guids(&page.frames()), ["frame@main"]);
	assert_eq!(detached.load(Ordering::SeqCst), 1);
	assert!(iframe.is_detached());

	let err = iframe.title().await.unwrap_err();
	assert!(matches!(err, Error::Detached { target_type: "Frame", ref guid } if guid == "frame@ad"));

	// Detached is terminal.
	driver
		.push("page@1", "frameAttached", json!({"frame": {"guid": "frame@ad"}}))
		.await
		.unwrap();
	assert_eq!(guids(&page.frames()), ["frame@main"]);
	assert_eq!(attached.load(Ordering::SeqCst), 0);
	assert!(iframe.is_detached());
}

#[tokio::test]
async fn in_flight_command_fails_when_the_frame_detaches() {
	let (mut driver, _page, iframe) = with_iframe().await;

	let title = tokio::spawn(async move { iframe.title().await });
	let request = driver.expect_request("title").await;
	assert_eq!(request["guid"], "frame@ad");

	driver
		.push("page@1", "frameDetached", json!({"frame": {"guid": "frame@ad"}}))
		.await
		.unwrap();

	let err = title.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::Detached { target_type: "Frame", .. }), "{err}");
}

#[tokio::test]
async fn frame_lookup_by_name_or_url() {
	let (_driver, page, _iframe) = with_iframe().await;

	let by_name = page.frame(FrameQuery::name("ad")).unwrap().unwrap();
	assert_eq!(by_name.guid(), "frame@ad");

	let by_url = page.frame(FrameQuery::url("https://ads.example/slot")).unwrap().unwrap();
	assert_eq!(by_url.guid(), "frame@ad");

	let by_glob = page
		.frame(FrameQuery::url(UrlMatcher::glob("https://ads.example/*").unwrap()))
		.unwrap()
		.unwrap();
	assert_eq!(by_glob.guid(), "frame@ad");

	assert!(page.frame(FrameQuery::name("missing")).unwrap().is_none());
}

#[tokio::test]
async fn ambiguous_frame_queries_are_rejected() {
	let (_driver, page, _iframe) = with_iframe().await;

	let err = page.frame(FrameQuery::default()).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));

	let both = FrameQuery {
		name: Some("ad".into()),
		url: Some(UrlMatcher::exact("https://ads.example/slot")),
	};
	assert!(matches!(page.frame(both), Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn navigation_wait_matches_a_regex() {
	let (driver, page, _iframe) = with_iframe().await;
	let main = page.main_frame();

	let waiter = main
		.expect_navigation(Some(UrlMatcher::regex("/done$").unwrap()), Duration::from_secs(5))
		.unwrap();
	driver
		.push("frame@main", "navigated", json!({"url": "https://app.example/step", "name": ""}))
		.await
		.unwrap();
	assert!(!waiter.is_settled());
	driver
		.push("frame@main", "navigated", json!({"url": "https://app.example/done", "name": ""}))
		.await
		.unwrap();

	let nav = Frame::navigation_result(waiter.wait().await.unwrap()).unwrap();
	assert_eq!(nav.url, "https://app.example/done");
	assert_eq!(page.url(), "https://app.example/done");
}

#[tokio::test]
async fn failed_navigation_surfaces_the_driver_error() {
	let (driver, page, _iframe) = with_iframe().await;

	let waiter = page.main_frame().expect_navigation(None, WaitTimeout::Inherit).unwrap();
	driver
		.push(
			"frame@main",
			"navigated",
			json!({"url": "https://down.example/", "name": "", "error": "net::ERR_NAME_NOT_RESOLVED"}),
		)
		.await
		.unwrap();

	let err = Frame::navigation_result(waiter.wait().await.unwrap()).unwrap_err();
	assert_eq!(err.to_string(), "Error: net::ERR_NAME_NOT_RESOLVED");
}

#[tokio::test]
async fn detach_aborts_a_navigation_wait() {
	let (driver, page, iframe) = with_iframe().await;
	let before = page.events().total_listeners();

	let waiter = iframe.expect_navigation(None, WaitTimeout::Inherit).unwrap();
	driver
		.push("page@1", "frameDetached", json!({"frame": {"guid": "frame@ad"}}))
		.await
		.unwrap();

	let err = waiter.wait().await.unwrap_err();
	assert!(matches!(
		err,
		Error::HardFail { ref condition, ref message }
			if condition == "detached" && message == "Navigating frame was detached!"
	));
	assert_eq!(page.events().total_listeners(), before);

	let err = iframe.expect_navigation(None, WaitTimeout::Inherit).unwrap_err();
	assert!(matches!(err, Error::Detached { .. }));
}

#[tokio::test]
async fn page_crash_aborts_a_frame_wait() {
	let (driver, page, iframe) = with_iframe().await;

	let waiter = iframe.expect_navigation(None, WaitTimeout::Inherit).unwrap();
	driver.push("page@1", "crash", json!({})).await.unwrap();

	let err = waiter.wait().await.unwrap_err();
	assert_eq!(err.hard_fail_condition(), Some("crash"));
	assert!(!page.is_closed());
}

#[tokio::test]
async fn load_state_reached_earlier_returns_at_once() {
	let driver = Driver::start();
	driver.context("browser-context@1").await;
	driver
		.create(
			"browser-context@1",
			"Frame",
			"frame@main",
			json!({"url": "https://app.example/", "loadStates": ["domcontentloaded", "load"]}),
		)
		.await
		.unwrap();
	driver
		.create("browser-context@1", "Page", "page@1", json!({"mainFrame": {"guid": "frame@main"}}))
		.await
		.unwrap();
	let page: Page = driver.session.object("page@1").unwrap();

	page.wait_for_load_state(None, Duration::from_millis(10)).await.unwrap();
	page.wait_for_load_state(Some(LoadState::DomContentLoaded), Duration::from_millis(10))
		.await
		.unwrap();
	let err = page
		.wait_for_load_state(Some(LoadState::NetworkIdle), Duration::from_millis(10))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::EventTimeout { ref event, .. } if event == "loadstate"));
}

#[tokio::test]
async fn load_state_follows_add_and_remove() {
	let (driver, page, _iframe) = with_iframe().await;
	let main = page.main_frame();

	driver
		.push("frame@main", "loadstate", json!({"add": "load"}))
		.await
		.unwrap();
	assert!(main.has_load_state(LoadState::Load));

	driver
		.push("frame@main", "loadstate", json!({"remove": "load"}))
		.await
		.unwrap();
	assert!(!main.has_load_state(LoadState::Load));

	let wait = {
		let main = main.clone();
		tokio::spawn(async move { main.wait_for_load_state(Some(LoadState::Load), Duration::from_secs(5)).await })
	};
	tokio::time::timeout(Duration::from_secs(5), async {
		while main.events().listener_count(pw_mirror::FrameEventKind::LoadState) == 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	driver
		.push("frame@main", "loadstate", json!({"add": "domcontentloaded"}))
		.await
		.unwrap();
	assert!(!wait.is_finished());
	driver
		.push("frame@main", "loadstate", json!({"add": "load"}))
		.await
		.unwrap();
	wait.await.unwrap().unwrap();
}
