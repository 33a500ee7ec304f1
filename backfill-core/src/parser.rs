//! Candle parser — reads one export CSV into canonical candles.
//!
//! Expected header (case-insensitive): `time, open, high, low, close`, with an
//! optional `Volume` column. `time` is Unix seconds at bar open.
//!
//! A file is accepted or rejected as a whole: the first missing or
//! non-numeric required field fails the file and no candles are returned.
//! Volume is optional: a blank or unreadable value becomes `None`.
//! Rows come back in file order.

use crate::domain::{Candle, SourceFile, Timeframe};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIME_COLUMNS: &[&str] = &["time", "timestamp"];
const VOLUME_COLUMNS: &[&str] = &["volume", "vol"];

#[derive(Debug, Error)]
#[error("{}: {kind}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("open failed: {0}")]
    Open(String),

    #[error("malformed CSV: {0}")]
    Malformed(String),

    #[error("missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("row {row}: missing value for '{column}'")]
    MissingField { row: usize, column: &'static str },

    #[error("row {row}: non-numeric value {value:?} in '{column}'")]
    NotNumeric {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row}: timestamp {value} out of range")]
    TimestampOutOfRange { row: usize, value: i64 },
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Self, ParseErrorKind> {
        let names: Vec<String> = header
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));
        let require = |aliases: &[&str], column: &'static str| {
            find(aliases).ok_or(ParseErrorKind::MissingColumn { column })
        };

        Ok(Self {
            time: require(TIME_COLUMNS, "time")?,
            open: require(&["open"], "open")?,
            high: require(&["high"], "high")?,
            low: require(&["low"], "low")?,
            close: require(&["close"], "close")?,
            volume: find(VOLUME_COLUMNS),
        })
    }
}

/// Parse the file behind a source descriptor.
pub fn parse_file(source: &SourceFile) -> Result<Vec<Candle>, ParseError> {
    let file = File::open(&source.path).map_err(|e| ParseError {
        path: source.path.clone(),
        kind: ParseErrorKind::Open(e.to_string()),
    })?;
    parse_reader(file, &source.symbol, source.timeframe, &source.path)
}

/// Parse CSV text from any reader. `origin` only labels errors.
pub fn parse_reader<R: Read>(
    reader: R,
    symbol: &str,
    timeframe: Timeframe,
    origin: &Path,
) -> Result<Vec<Candle>, ParseError> {
    let fail = |kind| ParseError {
        path: origin.to_path_buf(),
        kind,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header = rdr
        .headers()
        .map_err(|e| fail(ParseErrorKind::Malformed(e.to_string())))?
        .clone();
    let cols = Columns::from_header(&header).map_err(fail)?;

    let mut candles = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| fail(ParseErrorKind::Malformed(e.to_string())))?;
        candles.push(parse_row(&record, row, &cols, symbol, timeframe).map_err(fail)?);
    }

    Ok(candles)
}

fn parse_row(
    record: &csv::StringRecord,
    row: usize,
    cols: &Columns,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Candle, ParseErrorKind> {
    let raw_time = required(record, row, cols.time, "time")?;
    let seconds: i64 = raw_time.parse().map_err(|_| ParseErrorKind::NotNumeric {
        row,
        column: "time",
        value: raw_time.to_string(),
    })?;
    let timestamp = seconds
        .checked_mul(1000)
        .ok_or(ParseErrorKind::TimestampOutOfRange { row, value: seconds })?;

    let volume = match cols.volume.and_then(|idx| record.get(idx)) {
        None | Some("") => None,
        Some(raw) => match number(raw, row, "volume") {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(symbol, "dropping volume: {e}");
                None
            }
        },
    };

    Ok(Candle {
        symbol: symbol.to_string(),
        timeframe,
        timestamp,
        open: number(required(record, row, cols.open, "open")?, row, "open")?,
        high: number(required(record, row, cols.high, "high")?, row, "high")?,
        low: number(required(record, row, cols.low, "low")?, row, "low")?,
        close: number(required(record, row, cols.close, "close")?, row, "close")?,
        volume,
    })
}

fn required<'r>(
    record: &'r csv::StringRecord,
    row: usize,
    idx: usize,
    column: &'static str,
) -> Result<&'r str, ParseErrorKind> {
    match record.get(idx) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ParseErrorKind::MissingField { row, column }),
    }
}

/// Finite f64 or a non-numeric error. `NaN` and `inf` count as non-numeric.
fn number(raw: &str, row: usize, column: &'static str) -> Result<f64, ParseErrorKind> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseErrorKind::NotNumeric {
            row,
            column,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Vec<Candle>, ParseError> {
        parse_reader(
            text.as_bytes(),
            "RTY1!",
            Timeframe::Min5,
            Path::new("test.csv"),
        )
    }

    #[test]
    fn parses_rows_in_file_order() {
        let text = "time,open,high,low,close\n\
                    1704200000,10,11,9,10.5\n\
                    1704100000,20,21,19,20.5\n";
        let candles = parse(text).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_704_200_000_000);
        assert_eq!(candles[1].timestamp, 1_704_100_000_000);
        assert_eq!(candles[0].symbol, "RTY1!");
        assert_eq!(candles[0].timeframe, Timeframe::Min5);
        assert_eq!(candles[1].close, 20.5);
    }

    #[test]
    fn volume_absent_from_format_is_none() {
        let candles = parse("time,open,high,low,close\n1704067200,1,2,0.5,1.5\n").unwrap();
        assert_eq!(candles[0].volume, None);
    }

    #[test]
    fn volume_column_is_read_when_present() {
        let text = "time,open,high,low,close,Volume\n\
                    1704067200,1,2,0.5,1.5,1200\n\
                    1704067500,1,2,0.5,1.5,\n";
        let candles = parse(text).unwrap();
        assert_eq!(candles[0].volume, Some(1200.0));
        assert_eq!(candles[1].volume, None);
    }

    #[test]
    fn unreadable_volume_is_dropped_not_fatal() {
        let text = "time,open,high,low,close,Volume\n\
                    1704067200,1,2,0.5,1.5,n/a\n\
                    1704067500,1,2,0.5,1.5,NaN\n\
                    1704067800,1,2,0.5,1.5,300\n";
        let candles = parse(text).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].volume, None);
        assert_eq!(candles[1].volume, None);
        assert_eq!(candles[2].volume, Some(300.0));
        assert_eq!(candles[0].close, 1.5);
    }

    #[test]
    fn header_match_is_case_insensitive_and_trimmed() {
        let text = " Time , Open,HIGH,low , Close\n1704067200,1,2,0.5,1.5\n";
        assert_eq!(parse(text).unwrap().len(), 1);
    }

    #[test]
    fn non_numeric_close_fails_whole_file() {
        let text = "time,open,high,low,close\n\
                    1704067200,1,2,0.5,1.5\n\
                    1704067500,1,2,0.5,1.5\n\
                    1704067800,1,2,0.5,oops\n\
                    1704068100,1,2,0.5,1.5\n";
        let err = parse(text).unwrap_err();
        match err.kind {
            ParseErrorKind::NotNumeric { row, column, value } => {
                assert_eq!(row, 3);
                assert_eq!(column, "close");
                assert_eq!(value, "oops");
            }
            other => panic!("expected NotNumeric, got {other:?}"),
        }
    }

    #[test]
    fn empty_required_field_fails() {
        let err = parse("time,open,high,low,close\n1704067200,1,,0.5,1.5\n").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::MissingField { row: 1, column: "high" }
        ));
    }

    #[test]
    fn short_row_fails() {
        let err = parse("time,open,high,low,close\n1704067200,1,2\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Malformed(_)));
    }

    #[test]
    fn missing_column_fails() {
        let err = parse("time,open,high,close\n1704067200,1,2,1.5\n").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::MissingColumn { column: "low" }
        ));
    }

    #[test]
    fn nan_and_infinity_are_not_numeric() {
        assert!(parse("time,open,high,low,close\n1704067200,NaN,2,0.5,1.5\n").is_err());
        assert!(parse("time,open,high,low,close\n1704067200,1,inf,0.5,1.5\n").is_err());
    }

    #[test]
    fn fractional_seconds_are_rejected() {
        let err = parse("time,open,high,low,close\n1704067200.5,1,2,0.5,1.5\n").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::NotNumeric { column: "time", .. }
        ));
    }

    #[test]
    fn header_only_is_empty_not_error() {
        assert!(parse("time,open,high,low,close\n").unwrap().is_empty());
    }

    #[test]
    fn error_names_the_file() {
        let err = parse("time,open,high,low,close\nx,1,2,0.5,1.5\n").unwrap_err();
        assert!(err.to_string().starts_with("test.csv: row 1"));
    }
}
