//! End-to-end harvest tests against a local stand-in for the RAWG API
//!
//! A bare Tokio TCP listener answers `GET /api/games?key=..&page_size=..&page=N`
//! with scripted responses, so the real `RawgRestClient` and `Harvester` run
//! unmodified.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rawg_harvest::{
    CatalogSource, CheckpointStore, FetchError, HarvestConfig, HarvestOutcome, Harvester,
    RawgRestClient,
};
use serde_json::json;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone)]
enum Reply {
    Page { ids: Vec<i64>, has_next: bool },
    Status(u16, &'static str),
    /// 429, optionally carrying a `Retry-After` in seconds.
    Throttled { retry_after: Option<u64> },
    /// One reply per request for the page; the last one repeats.
    Sequence(Vec<Reply>),
}

struct StubServer {
    base_url: String,
    hits: Arc<Mutex<Vec<u32>>>,
}

async fn spawn_stub(script: HashMap<u32, Reply>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let hits_srv = hits.clone();
    let base_url = format!("http://{}/api/games", addr);
    let next_base = base_url.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 8192];
            let mut len = 0;
            while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf[len..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => len += n,
                }
            }
            let request = String::from_utf8_lossy(&buf[..len]).to_string();
            let page = page_param(&request);
            let seen = {
                let mut hits = hits_srv.lock().unwrap();
                let seen = hits.iter().filter(|&&p| p == page).count();
                hits.push(page);
                seen
            };

            let reply = match script.get(&page) {
                Some(Reply::Sequence(replies)) => replies
                    .get(seen)
                    .or_else(|| replies.last())
                    .cloned(),
                other => other.cloned(),
            };
            let response = render(reply, page, &next_base);
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    StubServer { base_url, hits }
}

fn render(reply: Option<Reply>, page: u32, next_base: &str) -> String {
    let mut headers = String::new();
    let (status, reason, body) = match reply {
        Some(Reply::Page { ids, has_next }) => {
            let results: Vec<_> = ids
                .iter()
                .map(|id| {
                    json!({
                        "id": id,
                        "slug": format!("game-{}", id),
                        "name": format!("Game {}", id),
                        "genres": [{"id": 4, "name": "Action"}],
                        "platforms": [{"platform": {"id": 4, "name": "PC"}}]
                    })
                })
                .collect();
            let next = has_next.then(|| format!("{}?page={}", next_base, page + 1));
            let body = json!({"count": 1000, "next": next, "previous": null, "results": results});
            (200, "OK", body.to_string())
        }
        Some(Reply::Status(code, reason)) => (code, reason, json!({"error": reason}).to_string()),
        Some(Reply::Throttled { retry_after }) => {
            if let Some(secs) = retry_after {
                headers.push_str(&format!("Retry-After: {}\r\n", secs));
            }
            (
                429,
                "Too Many Requests",
                json!({"error": "throttled"}).to_string(),
            )
        }
        Some(Reply::Sequence(_)) | None => (
            200,
            "OK",
            json!({"count": 0, "next": null, "results": []}).to_string(),
        ),
    };

    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        headers,
        body
    )
}

fn page_param(request: &str) -> u32 {
    let line = request.lines().next().unwrap_or_default();
    line.split(|c| c == '?' || c == '&' || c == ' ')
        .find_map(|kv| kv.strip_prefix("page="))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn config(base_url: &str, dir: &std::path::Path, start_page: u32) -> HarvestConfig {
    HarvestConfig {
        api_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        output_path: dir.join("games_dto.json"),
        page_size: 2,
        request_delay: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
        start_page,
        ..HarvestConfig::default()
    }
}

fn pages(range: std::ops::RangeInclusive<u32>, last: u32) -> HashMap<u32, Reply> {
    range
        .map(|p| {
            (
                p,
                Reply::Page {
                    ids: vec![p as i64 * 10, p as i64 * 10 + 1],
                    has_next: p < last,
                },
            )
        })
        .collect()
}

#[tokio::test]
async fn harvest_walks_all_pages_over_http() {
    let server = spawn_stub(pages(1..=7, 7)).await;
    let dir = tempdir().unwrap();
    let cfg = config(&server.base_url, dir.path(), 1);
    let client = RawgRestClient::new(&cfg).unwrap();

    let report = Harvester::new(client, cfg).run().await.unwrap();

    assert_eq!(report.outcome, HarvestOutcome::EndOfData);
    assert_eq!(report.pages_fetched, 7);
    assert_eq!(report.checkpoints_written, 1);
    assert!(report.final_flush);
    assert_eq!(*server.hits.lock().unwrap(), (1..=7).collect::<Vec<_>>());

    let saved = CheckpointStore::new(dir.path().join("games_dto.json"))
        .load()
        .unwrap();
    assert_eq!(saved.len(), 14);
    assert_eq!(saved[0].external_api_id, "rawg-10");
    assert_eq!(saved[0].platforms, vec!["PC"]);
    assert_eq!(saved[0].genres, vec!["Action"]);
    assert_eq!(saved[0].description.as_deref(), Some("game-10"));
}

#[tokio::test]
async fn unauthorized_is_fatal_and_not_retried() {
    let mut script = pages(1..=6, 20);
    script.insert(7, Reply::Status(401, "Unauthorized"));
    let server = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let cfg = config(&server.base_url, dir.path(), 1);
    let client = RawgRestClient::new(&cfg).unwrap();

    let report = Harvester::new(client, cfg).run().await.unwrap();

    match &report.outcome {
        HarvestOutcome::FatalAuth(msg) => assert!(msg.contains("401")),
        other => panic!("expected FatalAuth, got {:?}", other),
    }
    // Exactly one request for page 7, nothing after it.
    assert_eq!(*server.hits.lock().unwrap(), (1..=7).collect::<Vec<_>>());
    assert_eq!(report.records, 12);
    assert_eq!(report.saved_records, 10);
    assert_eq!(report.resume_page, 6);

    let saved = CheckpointStore::new(dir.path().join("games_dto.json"))
        .load()
        .unwrap();
    assert_eq!(saved.len(), 10);
}

#[tokio::test]
async fn server_error_is_transport_error() {
    let mut script = pages(1..=1, 5);
    script.insert(2, Reply::Status(500, "Internal Server Error"));
    let server = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let cfg = config(&server.base_url, dir.path(), 1);
    let client = RawgRestClient::new(&cfg).unwrap();

    let report = Harvester::new(client, cfg).run().await.unwrap();

    assert!(matches!(report.outcome, HarvestOutcome::TransportError(_)));
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(report.records, 2);
}

#[tokio::test]
async fn client_maps_statuses_to_fetch_errors() {
    let mut script = HashMap::new();
    script.insert(1, Reply::Status(401, "Unauthorized"));
    script.insert(2, Reply::Status(404, "Not Found"));
    let server = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let client = RawgRestClient::new(&config(&server.base_url, dir.path(), 1)).unwrap();

    let err = client.fetch_page(1).await.unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized(_)));

    let err = client.fetch_page(2).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
    assert!(!err.to_string().contains("test-key"));

    let page = client.fetch_page(3).await.unwrap();
    assert!(page.results.is_empty());
    assert!(!page.has_next());
}

#[tokio::test]
async fn resumed_run_continues_from_reported_page() {
    let server = spawn_stub(pages(1..=12, 12)).await;

    // Baseline over the whole catalog.
    let full_dir = tempdir().unwrap();
    let cfg = config(&server.base_url, full_dir.path(), 1);
    let client = RawgRestClient::new(&cfg).unwrap();
    Harvester::new(client, cfg).run().await.unwrap();
    let expected = CheckpointStore::new(full_dir.path().join("games_dto.json"))
        .load()
        .unwrap();

    // First run stops on a credential failure at page 8, second run resumes.
    let mut script = pages(1..=12, 12);
    script.insert(8, Reply::Status(401, "Unauthorized"));
    let flaky = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let cfg = config(&flaky.base_url, dir.path(), 1);
    let client = RawgRestClient::new(&cfg).unwrap();
    let first = Harvester::new(client, cfg).run().await.unwrap();
    assert!(matches!(first.outcome, HarvestOutcome::FatalAuth(_)));
    assert_eq!(first.resume_page, 6);

    let cfg = config(&server.base_url, dir.path(), first.resume_page);
    let client = RawgRestClient::new(&cfg).unwrap();
    let second = Harvester::new(client, cfg).run().await.unwrap();
    assert_eq!(second.outcome, HarvestOutcome::EndOfData);

    let actual = CheckpointStore::new(dir.path().join("games_dto.json"))
        .load()
        .unwrap();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn throttled_page_is_retried_after_the_advertised_delay() {
    let mut script = HashMap::new();
    script.insert(
        3,
        Reply::Sequence(vec![
            Reply::Throttled {
                retry_after: Some(1),
            },
            Reply::Page {
                ids: vec![30, 31],
                has_next: true,
            },
        ]),
    );
    let server = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let client = RawgRestClient::new(&config(&server.base_url, dir.path(), 3)).unwrap();

    let started = Instant::now();
    let page = client.fetch_page(3).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(page.results.len(), 2);
    assert!(page.has_next());
    assert_eq!(*server.hits.lock().unwrap(), vec![3, 3]);
}

#[tokio::test]
async fn persistent_throttling_gives_up_as_transport_error() {
    let mut script = HashMap::new();
    script.insert(4, Reply::Throttled { retry_after: Some(0) });
    let server = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let client = RawgRestClient::new(&config(&server.base_url, dir.path(), 4)).unwrap();

    let err = client.fetch_page(4).await.unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)));
    assert!(err.to_string().contains("429"));
    assert_eq!(*server.hits.lock().unwrap(), vec![4, 4, 4]);
}

#[tokio::test]
async fn harvest_survives_a_throttled_page() {
    let mut script = pages(1..=3, 3);
    script.insert(
        2,
        Reply::Sequence(vec![
            Reply::Throttled {
                retry_after: Some(0),
            },
            Reply::Page {
                ids: vec![20, 21],
                has_next: true,
            },
        ]),
    );
    let server = spawn_stub(script).await;
    let dir = tempdir().unwrap();
    let cfg = config(&server.base_url, dir.path(), 1);
    let client = RawgRestClient::new(&cfg).unwrap();

    let report = Harvester::new(client, cfg).run().await.unwrap();

    assert_eq!(report.outcome, HarvestOutcome::EndOfData);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.records, 6);
    assert_eq!(*server.hits.lock().unwrap(), vec![1, 2, 2, 3]);
}
