//! Parser module for Bybit v5 wire formats
//!
//! Handles the kline snapshot response, stream envelopes filtered by topic,
//! ticker payloads, and the control messages exchanged on the stream.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::candles::{self, Candle};
use crate::error::{RelayError, Result};

/// Outbound control message (`subscribe`, `ping`)
#[derive(Debug, Clone, Serialize)]
pub struct ControlRequest {
    pub op: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ControlRequest {
    pub fn subscribe(topic: &str) -> Self {
        Self {
            op: "subscribe",
            args: vec![topic.to_string()],
        }
    }

    pub fn ping() -> Self {
        Self {
            op: "ping",
            args: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::SerializationError(e.to_string()))
    }
}

/// 24h ticker payload for a spot symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub last_price: Decimal,

    #[serde(rename = "highPrice24h", deserialize_with = "deserialize_decimal")]
    pub high_price_24h: Decimal,

    #[serde(rename = "lowPrice24h", deserialize_with = "deserialize_decimal")]
    pub low_price_24h: Decimal,

    #[serde(rename = "prevPrice24h", deserialize_with = "deserialize_decimal")]
    pub prev_price_24h: Decimal,

    #[serde(rename = "volume24h", deserialize_with = "deserialize_decimal")]
    pub volume_24h: Decimal,

    #[serde(rename = "turnover24h", deserialize_with = "deserialize_decimal")]
    pub turnover_24h: Decimal,

    #[serde(rename = "price24hPcnt", deserialize_with = "deserialize_decimal")]
    pub price_24h_pcnt: Decimal,
}

/// Ticker message on the subscribed topic, with its envelope metadata
#[derive(Debug, Clone)]
pub struct TickerUpdate {
    pub topic: String,
    pub ts: Option<u64>,
    pub kind: Option<String>,
    pub ticker: Ticker,
}

/// Reply to a control request
#[derive(Debug, Clone, Deserialize)]
pub struct ControlReply {
    pub op: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub ret_msg: Option<String>,
}

/// Stream envelope before topic filtering
#[derive(Debug, Clone, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    ts: Option<u64>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    op: Option<String>,
}

/// Parsed stream message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Ticker(TickerUpdate),
    /// Message for a topic other than the subscribed one
    OtherTopic(String),
    Control(ControlReply),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw stream message, keeping only data for `expected_topic`.
    ///
    /// Payloads on other topics are not decoded, so their shape can never
    /// cause an error.
    pub fn parse(raw: &str, expected_topic: &str) -> Result<Self> {
        let envelope: StreamEnvelope = serde_json::from_str(raw)?;

        if let Some(topic) = envelope.topic {
            if topic != expected_topic {
                return Ok(ParsedMessage::OtherTopic(topic));
            }

            let data = envelope
                .data
                .ok_or_else(|| RelayError::ParseError(format!("{} message without data", topic)))?;
            let ticker: Ticker = serde_json::from_value(data)?;

            return Ok(ParsedMessage::Ticker(TickerUpdate {
                topic,
                ts: envelope.ts,
                kind: envelope.kind,
                ticker,
            }));
        }

        if envelope.op.is_some() {
            let reply: ControlReply = serde_json::from_str(raw)?;
            return Ok(ParsedMessage::Control(reply));
        }

        Ok(ParsedMessage::Unknown(raw.to_string()))
    }
}

/// Kline snapshot response
#[derive(Debug, Clone, Deserialize)]
pub struct KlineResponse {
    #[serde(rename = "retCode", default)]
    pub ret_code: i64,

    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,

    #[serde(default)]
    pub result: Option<KlineResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KlineResult {
    #[serde(default)]
    pub symbol: Option<String>,

    #[serde(default)]
    pub list: Option<Vec<Vec<Value>>>,
}

impl KlineResponse {
    pub fn parse(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Normalized candles, `None` when the body carries no `result.list`
    pub fn into_candles(self) -> Result<Option<Vec<Candle>>> {
        if self.ret_code != 0 {
            return Err(RelayError::UpstreamRejected {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }

        match self.result.and_then(|r| r.list) {
            Some(list) => candles::normalize(&list).map(Some),
            None => Ok(None),
        }
    }
}

/// Custom deserializer for Decimal from string
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    // Owned: payloads come through `serde_json::Value`, which cannot lend &str
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TOPIC: &str = "tickers.SOLUSDT";

    fn ticker_message(topic: &str) -> String {
        format!(
            r#"{{
                "topic": "{}",
                "ts": 1673853746003,
                "type": "snapshot",
                "cs": 2588407389,
                "data": {{
                    "symbol": "SOLUSDT",
                    "lastPrice": "21.109",
                    "highPrice24h": "21.426",
                    "lowPrice24h": "20.575",
                    "prevPrice24h": "20.704",
                    "volume24h": "6780.86",
                    "turnover24h": "141946.52",
                    "price24hPcnt": "0.0196",
                    "usdIndexPrice": "21.120"
                }}
            }}"#,
            topic
        )
    }

    #[test]
    fn test_subscribe_request_shape() {
        let json = ControlRequest::subscribe(TOPIC).to_json().unwrap();
        assert_eq!(json, r#"{"op":"subscribe","args":["tickers.SOLUSDT"]}"#);
        assert_eq!(ControlRequest::ping().to_json().unwrap(), r#"{"op":"ping"}"#);
    }

    #[test]
    fn test_parse_ticker_on_expected_topic() {
        let msg = ParsedMessage::parse(&ticker_message(TOPIC), TOPIC).unwrap();
        if let ParsedMessage::Ticker(update) = msg {
            assert_eq!(update.ts, Some(1673853746003));
            assert_eq!(update.kind.as_deref(), Some("snapshot"));
            assert_eq!(update.ticker.last_price, dec!(21.109));
            assert_eq!(update.ticker.price_24h_pcnt, dec!(0.0196));
        } else {
            panic!("Expected Ticker");
        }
    }

    #[test]
    fn test_other_topic_is_not_decoded() {
        let raw = r#"{"topic":"orderbook.50.SOLUSDT","data":{"garbage":true}}"#;
        let msg = ParsedMessage::parse(raw, TOPIC).unwrap();
        assert!(matches!(msg, ParsedMessage::OtherTopic(t) if t == "orderbook.50.SOLUSDT"));
    }

    #[test]
    fn test_malformed_payload_on_expected_topic_is_error() {
        let raw = r#"{"topic":"tickers.SOLUSDT","data":{"symbol":"SOLUSDT","lastPrice":"x"}}"#;
        assert!(ParsedMessage::parse(raw, TOPIC).is_err());
        assert!(ParsedMessage::parse("not json", TOPIC).is_err());
    }

    #[test]
    fn test_parse_control_reply() {
        let raw = r#"{"success":false,"ret_msg":"error:handler not found,topic:tickers.NOPE","conn_id":"c1","op":"subscribe"}"#;
        let msg = ParsedMessage::parse(raw, TOPIC).unwrap();
        if let ParsedMessage::Control(reply) = msg {
            assert_eq!(reply.op, "subscribe");
            assert_eq!(reply.success, Some(false));
        } else {
            panic!("Expected Control");
        }
    }

    #[test]
    fn test_kline_response_to_candles() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"symbol":"SOLUSDT","list":[[1000,"1.0","2.0","0.5","1.5"]]}}"#;
        let candles = KlineResponse::parse(body).unwrap().into_candles().unwrap().unwrap();
        assert_eq!(
            candles,
            vec![Candle {
                timestamp: 1000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5
            }]
        );
    }

    #[test]
    fn test_kline_without_list_is_no_data() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{}}"#;
        assert!(KlineResponse::parse(body).unwrap().into_candles().unwrap().is_none());
        let body = r#"{"retCode":0,"retMsg":"OK"}"#;
        assert!(KlineResponse::parse(body).unwrap().into_candles().unwrap().is_none());
    }

    #[test]
    fn test_kline_rejected_by_upstream() {
        let body = r#"{"retCode":10001,"retMsg":"params error: symbol invalid","result":{}}"#;
        let err = KlineResponse::parse(body).unwrap().into_candles().unwrap_err();
        assert!(matches!(err, RelayError::UpstreamRejected { code: 10001, .. }));
    }
}
