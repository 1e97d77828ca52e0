//! Edge case tests for fos-net
//!
//! Cache, cookie and request handling through the public API.

use std::sync::Arc;
use std::time::Duration;

use fos_net::*;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn cache_with_clock() -> (ResponseCache, ManualClock) {
    let clock = ManualClock::default();
    (ResponseCache::with_clock(Arc::new(clock.clone())), clock)
}

// ============================================================================
// REQUEST TESTS
// ============================================================================

#[test]
fn test_request_headers_case_insensitive() {
    let req = Request::get(url("https://example.com"))
        .with_header("Accept", "text/html")
        .with_header("ACCEPT", "application/json");

    assert_eq!(req.headers.len(), 1);
    assert_eq!(req.headers.get("accept"), Some("application/json"));
}

#[test]
fn test_credentials_same_origin() {
    let same = Request::get(url("https://a.test/x")).with_referrer(url("https://a.test/"), ReferrerPolicy::default());
    let cross = Request::get(url("https://b.test/x")).with_referrer(url("https://a.test/"), ReferrerPolicy::default());

    assert!(same.sends_cookies());
    assert!(!cross.sends_cookies());
    assert!(cross.with_credentials(CredentialsMode::Include).sends_cookies());
}

#[test]
fn test_referrer_policy_cross_origin() {
    let req = Request::get(url("https://b.test/x"))
        .with_referrer(url("https://a.test/private/page?q=1"), ReferrerPolicy::StrictOriginWhenCrossOrigin);
    assert_eq!(req.referrer_header().as_deref(), Some("https://a.test/"));

    let req = Request::get(url("https://b.test/x")).with_referrer(url("https://a.test/page"), ReferrerPolicy::NoReferrer);
    assert_eq!(req.referrer_header(), None);
}

// ============================================================================
// RESPONSE CACHE TESTS
// ============================================================================

#[test]
fn test_cache_method_is_part_of_key() {
    let (cache, _) = cache_with_clock();
    let get = Request::get(url("https://x.test/m"));
    let response = Response::new(url("https://x.test/m"), 200)
        .with_header("Cache-Control", "max-age=60")
        .with_body("get");
    cache.add(&get, &response).unwrap();

    assert!(cache.get(&Request::post(url("https://x.test/m"))).is_none());
    assert!(cache.get(&get).is_some());
}

#[test]
fn test_cache_virtual_time_scenario() {
    let (cache, clock) = cache_with_clock();
    let request = Request::get(url("https://x.test/a"));
    let response = Response::new(url("https://x.test/a"), 200)
        .with_header("Cache-Control", "max-age=60")
        .with_header("ETag", "\"v1\"")
        .with_body("hello");

    cache.add(&request, &response).unwrap();
    assert_eq!(cache.get(&request).unwrap().state, CacheState::Fresh);

    clock.advance(Duration::from_secs(61));
    let entry = cache.get(&request).unwrap();
    assert_eq!(entry.etag.as_deref(), Some("\"v1\""));
    assert!(entry.conditional_request(&request).headers.contains("If-None-Match"));

    let not_modified = Response::new(url("https://x.test/a"), 304).with_header("ETag", "X");
    let merged = cache.add(&request, &not_modified).unwrap();
    assert_eq!(merged.body(), Some(&b"hello"[..]));
    assert_eq!(merged.etag.as_deref(), Some("X"));
}

#[test]
fn test_cache_fragment_ignored() {
    let (cache, _) = cache_with_clock();
    let response = Response::new(url("https://x.test/doc"), 200)
        .with_header("Cache-Control", "max-age=60")
        .with_body("doc");
    cache.add(&Request::get(url("https://x.test/doc#one")), &response).unwrap();

    assert!(cache.get(&Request::get(url("https://x.test/doc#two"))).is_some());
}

#[test]
fn test_cache_handles_are_shared() {
    let (cache, _) = cache_with_clock();
    let other = cache.clone();
    let request = Request::get(url("https://x.test/shared"));
    let response = Response::new(url("https://x.test/shared"), 200).with_header("ETag", "\"s\"");
    cache.add(&request, &response).unwrap();

    assert_eq!(other.len(), 1);
    other.clear(ClearOptions::default());
    assert!(cache.is_empty());
}

// ============================================================================
// COOKIE TESTS
// ============================================================================

#[test]
fn test_cookie_container_shared_across_clones() {
    let jar = CookieContainer::new();
    let handle = jar.clone();
    handle.add_set_cookie(&url("https://example.com/"), "theme=dark; Path=/");

    let cookies = jar.get_cookies(&url("https://example.com/settings"), false);
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].serialize(), "theme=dark");
}

#[test]
fn test_cookie_malformed_headers_ignored() {
    let jar = CookieContainer::new();
    jar.add_set_cookie(&url("https://example.com/"), "no-equals-sign");
    jar.add_set_cookie(&url("https://example.com/"), "=value-without-name");
    assert!(jar.is_empty());
}

// ============================================================================
// ABORT TESTS
// ============================================================================

#[test]
fn test_abort_signal_shared() {
    let controller = AbortController::new();
    let a = controller.signal();
    let b = a.clone();
    controller.abort();
    assert!(a.is_aborted() && b.is_aborted());
    smol::block_on(b.aborted());
}

#[test]
fn test_net_error_messages() {
    assert_eq!(NetError::Aborted.to_string(), "The operation was aborted.");
    assert_eq!(NetError::Timeout(30000).to_string(), "The operation timed out after 30000 ms.");
}
