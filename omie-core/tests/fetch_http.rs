//! Fetcher tests against a local HTTP responder.

use chrono::NaiveDate;
use omie_core::config::SourceConfig;
use omie_core::data::{fetch_day, DataError, FetchOutcome, OmieProvider, PriceSource, RawArchive};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

const BODY: &str = "MARGINALPDBC;\r\n2024;01;03;1;50.00;50.00;\r\n*\r\n";

fn temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("omie_fetch_http_test_{}_{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Serve `route(path) -> (status, body)` on a random local port.
///
/// Returns the base URL and the list of request paths seen so far.
fn serve(route: fn(&str) -> (u16, &'static str)) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_server = Arc::clone(&seen);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();

            // Drain headers
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 2 {
                line.clear();
            }

            let (status, body) = route(&path);
            seen_by_server.lock().unwrap().push(path);

            let reason = if status == 200 { "OK" } else { "Not Found" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (format!("http://{addr}/file-download?filename="), seen)
}

fn provider(base_url: String) -> OmieProvider {
    OmieProvider::new(&SourceConfig {
        base_url,
        timeout_secs: 5,
        ..SourceConfig::default()
    })
    .unwrap()
}

fn variants() -> Vec<String> {
    vec!["1".into(), "2".into()]
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
}

#[test]
fn both_variants_404_leaves_no_file() {
    let (base_url, seen) = serve(|_| (404, "not found"));
    let dir = temp_dir();
    let archive = RawArchive::new(&dir);

    let err = fetch_day(&provider(base_url), &archive, date(), &variants(), false).unwrap_err();

    match &err {
        DataError::FetchFailed { reasons, .. } => {
            assert_eq!(reasons.len(), 2);
            assert!(reasons[0].contains("HTTP 404"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(archive.list().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn second_variant_is_saved_when_first_is_missing() {
    let (base_url, seen) = serve(|path| {
        if path.ends_with(".2") {
            (200, BODY)
        } else {
            (404, "not found")
        }
    });
    let dir = temp_dir();
    let archive = RawArchive::new(&dir);

    let outcome = fetch_day(&provider(base_url), &archive, date(), &variants(), false).unwrap();

    assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
    assert_eq!(
        outcome.path(),
        &dir.join("marginalpdbc_20240103.2")
    );
    assert_eq!(std::fs::read_to_string(outcome.path()).unwrap(), BODY);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "/file-download?filename=marginalpdbc_20240103.1".to_string(),
            "/file-download?filename=marginalpdbc_20240103.2".to_string(),
        ]
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn html_page_with_200_is_a_failure() {
    let (base_url, _) = serve(|_| (200, "<!DOCTYPE html><html><body>Not found</body></html>"));
    let dir = temp_dir();
    let archive = RawArchive::new(&dir);

    let err = fetch_day(&provider(base_url), &archive, date(), &variants(), false).unwrap_err();

    assert!(matches!(err, DataError::FetchFailed { .. }));
    assert!(archive.list().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unreachable_host_is_a_network_error() {
    // Bind then drop to get a port nothing listens on
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let source = provider(format!("http://127.0.0.1:{port}/?filename="));

    let err = source.fetch(date(), "1").unwrap_err();
    assert!(matches!(err, DataError::NetworkUnreachable(_)));
}
