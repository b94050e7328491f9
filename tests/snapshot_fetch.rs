//! Snapshot fetch tests against a local stub of the kline endpoint

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

use market_relay::{
    BroadcastHub, Candle, Config, FetchOutcome, RelayMetrics, ServerEvent, SharedCache,
    SnapshotFetcher,
};

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    body: &'static str,
}

async fn kline(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let symbol_ok = params.get("symbol").map(String::as_str) == Some("SOLUSDT");
    let interval_ok = params.get("interval").map(String::as_str) == Some("15");
    if !symbol_ok || !interval_ok {
        return (StatusCode::BAD_REQUEST, String::new());
    }
    (stub.status, stub.body.to_string())
}

async fn spawn_stub(status: StatusCode, body: &'static str) -> String {
    let app = Router::new()
        .route("/v5/market/kline", get(kline))
        .with_state(Stub { status, body });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{}/v5/market/kline", addr)
}

struct Fixture {
    cache: Arc<SharedCache>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<RelayMetrics>,
    fetcher: SnapshotFetcher,
}

async fn fixture(status: StatusCode, body: &'static str) -> Fixture {
    let config = Config {
        rest_endpoint: spawn_stub(status, body).await,
        ..Config::default()
    };
    let metrics = Arc::new(RelayMetrics::new().unwrap());
    let cache = Arc::new(SharedCache::new());
    let hub = Arc::new(BroadcastHub::new(cache.clone(), metrics.clone(), 16));
    let fetcher = SnapshotFetcher::new(&config, cache.clone(), hub.clone(), metrics.clone());
    Fixture {
        cache,
        hub,
        metrics,
        fetcher,
    }
}

fn stale() -> Vec<Candle> {
    vec![Candle {
        timestamp: 1,
        open: 9.0,
        high: 9.0,
        low: 9.0,
        close: 9.0,
    }]
}

fn fetches(metrics: &RelayMetrics, outcome: &str) -> u64 {
    metrics
        .snapshot_fetches
        .with_label_values(&[outcome])
        .get()
}

#[tokio::test]
async fn test_successful_fetch_replaces_cache() {
    let f = fixture(
        StatusCode::OK,
        r#"{"retCode":0,"retMsg":"OK","result":{"list":[[1000,"1.0","2.0","0.5","1.5"]]}}"#,
    )
    .await;
    f.cache.replace_candles(stale()).await;

    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::Updated(1));
    assert_eq!(
        *f.cache.read().await.candles,
        vec![Candle {
            timestamp: 1000,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5
        }]
    );
    assert_eq!(fetches(&f.metrics, "updated"), 1);
}

#[tokio::test]
async fn test_fetch_broadcasts_to_early_subscribers() {
    let f = fixture(
        StatusCode::OK,
        r#"{"retCode":0,"retMsg":"OK","result":{"list":[[1000,"1.0","2.0","0.5","1.5"]]}}"#,
    )
    .await;
    let mut sub = f.hub.join().await;
    assert_eq!(sub.events.try_recv().unwrap().name(), "orderBookData");

    f.fetcher.fetch_snapshot().await;
    match sub.events.try_recv().unwrap() {
        ServerEvent::CandlestickData(candles) => assert_eq!(candles.len(), 1),
        other => panic!("unexpected {}", other.name()),
    }
}

#[tokio::test]
async fn test_rate_limited_keeps_stale_cache() {
    let f = fixture(StatusCode::TOO_MANY_REQUESTS, "").await;
    f.cache.replace_candles(stale()).await;

    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::RateLimited);
    assert_eq!(*f.cache.read().await.candles, stale());
    assert_eq!(fetches(&f.metrics, "rate_limited"), 1);
    assert_eq!(fetches(&f.metrics, "failed"), 0);
}

#[tokio::test]
async fn test_not_found_keeps_cache() {
    let f = fixture(StatusCode::NOT_FOUND, "").await;
    f.cache.replace_candles(stale()).await;

    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::NotFound);
    assert_eq!(*f.cache.read().await.candles, stale());
}

#[tokio::test]
async fn test_missing_list_is_no_data() {
    let f = fixture(StatusCode::OK, r#"{"retCode":0,"retMsg":"OK","result":{}}"#).await;
    f.cache.replace_candles(stale()).await;

    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::NoData);
    assert_eq!(*f.cache.read().await.candles, stale());
}

#[tokio::test]
async fn test_server_error_and_bad_body_keep_cache() {
    let f = fixture(StatusCode::INTERNAL_SERVER_ERROR, "").await;
    f.cache.replace_candles(stale()).await;
    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::Failed);
    assert_eq!(*f.cache.read().await.candles, stale());

    let f = fixture(StatusCode::OK, "<html>maintenance</html>").await;
    f.cache.replace_candles(stale()).await;
    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::Failed);
    assert_eq!(*f.cache.read().await.candles, stale());
}

#[tokio::test]
async fn test_upstream_rejection_keeps_cache() {
    let f = fixture(
        StatusCode::OK,
        r#"{"retCode":10001,"retMsg":"params error","result":{}}"#,
    )
    .await;
    f.cache.replace_candles(stale()).await;

    assert_eq!(f.fetcher.fetch_snapshot().await, FetchOutcome::Failed);
    assert_eq!(*f.cache.read().await.candles, stale());
}
