//! Downloads: retries, allow-list enforcement and progress reporting.

use crate::common::{MockRegistry, test_config};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use upkeep::core::UpdateError;
use upkeep::update::{DownloadProgress, TransferEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_download_retries_transient_failures() {
    let registry = MockRegistry::start().await;
    let body: Vec<u8> = (0..=255u8).cycle().take(40_000).collect();
    Mock::given(method("GET"))
        .and(path("/download/app-linux-x86_64"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&registry.server)
        .await;
    registry.serve_asset("app-linux-x86_64", &body).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("2.0.0").join("app-linux-x86_64");
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();

    let written = engine
        .download_to_file(&registry.asset_url("app-linux-x86_64"), &dest, |_| {})
        .await
        .unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!temp.path().join("2.0.0").join("app-linux-x86_64.part").exists());
    assert_eq!(registry.hits("/download/app-linux-x86_64").await, 3);
}

#[tokio::test]
async fn test_download_gives_up_after_configured_attempts() {
    let registry = MockRegistry::start().await;
    Mock::given(method("GET"))
        .and(path("/download/app"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&registry.server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app");
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();

    let err = engine.download_to_file(&registry.asset_url("app"), &dest, |_| {}).await.unwrap_err();
    assert!(matches!(err, UpdateError::HttpStatus { status: 502, .. }), "{err:?}");
    assert!(!dest.exists());
    assert_eq!(registry.hits("/download/app").await, 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let registry = MockRegistry::start().await;
    Mock::given(method("GET"))
        .and(path("/download/app"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&registry.server)
        .await;

    let temp = TempDir::new().unwrap();
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();

    let err = engine
        .download_to_file(&registry.asset_url("app"), &temp.path().join("app"), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::HttpStatus { status: 404, .. }), "{err:?}");
    assert_eq!(registry.hits("/download/app").await, 1);
}

#[tokio::test]
async fn test_disallowed_host_is_rejected_before_connecting() {
    let registry = MockRegistry::start().await;
    registry.serve_asset("app", b"payload").await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging").join("app");
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();

    // Same server, but addressed through a host name that is not allow-listed.
    let url = registry.asset_url("app").replace("127.0.0.1", "localhost");
    let err = engine.download_to_file(&url, &dest, |_| {}).await.unwrap_err();

    assert!(matches!(err, UpdateError::Security { .. }), "{err:?}");
    assert_eq!(registry.hits("/download/app").await, 0);
    assert!(!temp.path().join("staging").exists());
}

#[tokio::test]
async fn test_redirect_to_disallowed_host_is_rejected() {
    let registry = MockRegistry::start().await;
    let target = registry.asset_url("real").replace("127.0.0.1", "localhost");
    Mock::given(method("GET"))
        .and(path("/download/app"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", target.as_str()))
        .mount(&registry.server)
        .await;
    registry.serve_asset("real", b"payload").await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app");
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();

    let err = engine.download_to_file(&registry.asset_url("app"), &dest, |_| {}).await.unwrap_err();

    assert!(matches!(err, UpdateError::Security { .. }), "{err:?}");
    assert_eq!(registry.hits("/download/real").await, 0);
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_redirect_within_allow_list_is_followed() {
    let registry = MockRegistry::start().await;
    Mock::given(method("GET"))
        .and(path("/download/app"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", registry.asset_url("real").as_str()),
        )
        .mount(&registry.server)
        .await;
    registry.serve_asset("real", b"redirected payload").await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app");
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();

    engine.download_to_file(&registry.asset_url("app"), &dest, |_| {}).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"redirected payload");
}

#[tokio::test]
async fn test_progress_is_reported_in_steps() {
    let registry = MockRegistry::start().await;
    let body = vec![7u8; 200_000];
    registry.serve_asset("app", &body).await;

    let temp = TempDir::new().unwrap();
    let engine = TransferEngine::new(&test_config(&registry.uri())).unwrap();
    let seen: Arc<Mutex<Vec<DownloadProgress>>> = Arc::default();
    let sink = Arc::clone(&seen);

    engine
        .download_to_file(&registry.asset_url("app"), &temp.path().join("app"), move |p| {
            sink.lock().unwrap().push(p);
        })
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let last = seen.last().expect("at least the final update");
    assert_eq!(last.downloaded, 200_000);
    assert_eq!(last.total, Some(200_000));
    assert_eq!(last.percent, Some(100));

    let percents: Vec<u8> = seen.iter().filter_map(|p| p.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] < w[1]), "{percents:?}");
    assert!(percents.windows(2).all(|w| w[1] - w[0] >= 5 || w[1] == 100), "{percents:?}");
}

/// Serve `body` over raw HTTP, cutting the first `truncated` responses off
/// halfway while still announcing the full `Content-Length`.
async fn serve_truncating(body: Vec<u8>, truncated: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/download/app", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            let sent = if attempt < truncated { &body[..body.len() / 2] } else { &body[..] };
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(sent).await;
            let _ = socket.shutdown().await;
        }
    });

    (url, hits)
}

#[tokio::test]
async fn test_truncated_body_is_discarded_and_retried() {
    let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let (url, hits) = serve_truncating(body.clone(), 1).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("2.0.0").join("app");
    let engine = TransferEngine::new(&test_config("http://127.0.0.1")).unwrap();

    let written = engine.download_to_file(&url, &dest, |_| {}).await.unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!temp.path().join("2.0.0").join("app.part").exists());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_persistently_truncated_body_fails_without_leftovers() {
    let body = vec![42u8; 10_000];
    let (url, hits) = serve_truncating(body, usize::MAX).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app");
    let engine = TransferEngine::new(&test_config("http://127.0.0.1")).unwrap();

    let err = engine.download_to_file(&url, &dest, |_| {}).await.unwrap_err();

    assert!(matches!(err, UpdateError::Network { .. }), "{err:?}");
    assert!(!dest.exists());
    assert!(!temp.path().join("app.part").exists());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
