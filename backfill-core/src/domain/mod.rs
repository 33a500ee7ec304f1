//! Domain types for the candle backfill

pub mod candle;
pub mod source;
pub mod timeframe;

pub use candle::{content_hash, time_span, Candle, StoredCandle};
pub use source::SourceFile;
pub use timeframe::{Timeframe, UnknownTimeframe};
