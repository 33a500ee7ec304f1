//! Candle — one OHLC observation keyed by (symbol, timeframe, timestamp).

use super::timeframe::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed OHLC(V) candle.
///
/// `timestamp` is the bar open time in milliseconds since the Unix epoch.
/// The triple (symbol, timeframe, timestamp) is the candle's identity in the
/// store. `volume` is `None` when the source does not report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Candle {
    /// Bar open time as a UTC datetime, if the timestamp is in range.
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A candle as persisted in the store, including its write generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCandle {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    pub updated_at: i64,
}

/// BLAKE3 over every candle field in sequence order.
///
/// Two parses of the same unchanged file produce the same hash.
pub fn content_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(c.symbol.as_bytes());
        hasher.update(c.timeframe.code().as_bytes());
        hasher.update(&c.timestamp.to_le_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        match c.volume {
            Some(v) => {
                hasher.update(&[1]);
                hasher.update(&v.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Earliest and latest open time in a candle sequence.
///
/// Sequences follow file order, so this scans rather than reading the ends.
pub fn time_span(candles: &[Candle]) -> Option<(i64, i64)> {
    let first = candles.iter().map(|c| c.timestamp).min()?;
    let last = candles.iter().map(|c| c.timestamp).max()?;
    Some((first, last))
}
