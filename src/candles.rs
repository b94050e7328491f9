//! Candlestick points normalized from upstream kline records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Fields read from each record: timestamp, open, high, low, close
const RECORD_FIELDS: usize = 5;

/// One OHLC point. Timestamp unit is whatever the upstream uses (ms for Bybit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Build a candle from a `[timestamp, open, high, low, close, ...]` record.
    ///
    /// Numbers may arrive as JSON numbers or as decimal strings; trailing
    /// fields (volume, turnover) are ignored.
    pub fn from_record(record: &[Value]) -> Result<Self> {
        if record.len() < RECORD_FIELDS {
            return Err(RelayError::ParseError(format!(
                "kline record has {} fields, expected at least {}",
                record.len(),
                RECORD_FIELDS
            )));
        }

        Ok(Self {
            timestamp: parse_timestamp(&record[0])?,
            open: parse_price(&record[1])?,
            high: parse_price(&record[2])?,
            low: parse_price(&record[3])?,
            close: parse_price(&record[4])?,
        })
    }
}

/// Normalize raw records, preserving upstream order
pub fn normalize(records: &[Vec<Value>]) -> Result<Vec<Candle>> {
    records.iter().map(|r| Candle::from_record(r)).collect()
}

fn parse_timestamp(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| RelayError::ParseError(format!("invalid timestamp: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| RelayError::ParseError(format!("invalid timestamp: {:?}", s))),
        other => Err(RelayError::ParseError(format!("invalid timestamp: {}", other))),
    }
}

fn parse_price(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|p| p.is_finite())
        .ok_or_else(|| RelayError::ParseError(format!("invalid price: {}", value)))
}
