//! Benchmarks for wire parsing and hub fan-out

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_relay::{
    BroadcastHub, KlineResponse, ParsedMessage, RelayMetrics, ServerEvent, SharedCache,
};
use std::sync::Arc;

const TOPIC: &str = "tickers.SOLUSDT";

fn kline_body(records: usize) -> String {
    let list: Vec<String> = (0..records)
        .map(|i| {
            format!(
                r#"["{}","21.{}","21.9","20.1","21.5","1000.5","21500.2"]"#,
                1_670_608_800_000u64 + i as u64 * 900_000,
                i % 10
            )
        })
        .collect();
    format!(
        r#"{{"retCode":0,"retMsg":"OK","result":{{"symbol":"SOLUSDT","category":"spot","list":[{}]}}}}"#,
        list.join(",")
    )
}

fn ticker_message() -> String {
    r#"{"topic":"tickers.SOLUSDT","ts":1673853746003,"type":"snapshot","cs":2588407389,"data":{"symbol":"SOLUSDT","lastPrice":"21.109","highPrice24h":"21.426","lowPrice24h":"20.575","prevPrice24h":"20.704","volume24h":"6780.86","turnover24h":"141946.52","price24hPcnt":"0.0196","usdIndexPrice":"21.120"}}"#
        .to_string()
}

fn bench_kline_parse(c: &mut Criterion) {
    let body = kline_body(200);

    c.bench_function("kline_parse_200", |b| {
        b.iter(|| {
            let response = KlineResponse::parse(black_box(&body)).unwrap();
            black_box(response.into_candles().unwrap())
        })
    });
}

fn bench_stream_parse(c: &mut Criterion) {
    let raw = ticker_message();
    let other = raw.replace(TOPIC, "tickers.BTCUSDT");

    c.bench_function("stream_parse_ticker", |b| {
        b.iter(|| black_box(ParsedMessage::parse(black_box(&raw), TOPIC).unwrap()))
    });

    c.bench_function("stream_parse_other_topic", |b| {
        b.iter(|| black_box(ParsedMessage::parse(black_box(&other), TOPIC).unwrap()))
    });
}

fn bench_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = Arc::new(SharedCache::new());
    let metrics = Arc::new(RelayMetrics::new().unwrap());
    let hub = BroadcastHub::new(cache.clone(), metrics, 16);

    let mut subs = rt.block_on(async {
        let mut subs = Vec::new();
        for _ in 0..100 {
            subs.push(hub.join().await);
        }
        subs
    });
    let candles = rt.block_on(async {
        let body = kline_body(200);
        let candles = KlineResponse::parse(&body).unwrap().into_candles().unwrap().unwrap();
        cache.replace_candles(candles).await
    });

    c.bench_function("broadcast_100_subscribers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let delivered = hub
                    .broadcast(ServerEvent::CandlestickData(candles.clone()))
                    .await;
                for sub in subs.iter_mut() {
                    while sub.events.try_recv().is_ok() {}
                }
                black_box(delivered)
            })
        })
    });
}

criterion_group!(benches, bench_kline_parse, bench_stream_parse, bench_fanout);
criterion_main!(benches);
