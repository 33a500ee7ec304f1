//! Backfill Core — domain types and the pure stages of the candle backfill.
//!
//! - Domain types (candles, timeframes, source file descriptors)
//! - Source resolver with its two immutable mapping tables
//! - CSV candle parser (all-or-nothing per file)
//! - Upsert statement builder and the store schema contract
//!
//! Nothing here touches the network or the store; execution lives in
//! `backfill-runner`.

pub mod domain;
pub mod parser;
pub mod resolver;
pub mod schema;
pub mod statement;

pub use domain::{Candle, SourceFile, StoredCandle, Timeframe};
pub use parser::{parse_file, parse_reader, ParseError, ParseErrorKind};
pub use resolver::{PrefixRule, Resolution, SourceResolver, SourceTables, TableError};
pub use statement::{StatementBuilder, UpsertStatement};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: pipeline types cross threads freely.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Candle>();
        require_sync::<Candle>();
        require_send::<SourceFile>();
        require_sync::<SourceFile>();
        require_send::<UpsertStatement>();
        require_sync::<UpsertStatement>();
        require_send::<SourceResolver>();
        require_sync::<SourceResolver>();
        require_send::<ParseError>();
        require_sync::<ParseError>();
    }
}
