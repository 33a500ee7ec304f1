//! Source resolver — maps an export filename to a canonical (symbol, timeframe).
//!
//! TradingView names its exports `EXCHANGE_TICKER, TF_hash.csv`, for example
//! `CME_MINI_RTY1!, 5_c43af.csv`. Two immutable tables drive resolution:
//!
//! - an ordered prefix table (`CME_MINI_RTY1!` -> `RTY1!`), first match wins
//! - a timeframe table from raw export tokens to canonical codes (`1D` -> `D`)
//!
//! The tables can be loaded from TOML:
//!
//! ```toml
//! [[symbols]]
//! prefix = "CME_MINI_RTY1!"
//! symbol = "RTY1!"
//!
//! [timeframes]
//! "5" = "5"
//! "1D" = "D"
//! ```

use crate::domain::{SourceFile, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Separator between the exchange/ticker prefix and the timeframe token.
const PREFIX_SEPARATOR: char = ',';

/// Delimiter that ends the timeframe token.
const TOKEN_DELIMITER: char = '_';

/// One entry of the ordered symbol-prefix table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub symbol: String,
}

impl PrefixRule {
    pub fn new(prefix: &str, symbol: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

/// The two lookup tables, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTables {
    pub symbols: Vec<PrefixRule>,
    pub timeframes: BTreeMap<String, Timeframe>,
}

impl SourceTables {
    /// Parse tables from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, TableError> {
        toml::from_str(content).map_err(|e| TableError::Parse(e.to_string()))
    }

    /// Serialize the tables to TOML.
    pub fn to_toml(&self) -> Result<String, TableError> {
        toml::to_string_pretty(self).map_err(|e| TableError::Parse(e.to_string()))
    }

    /// Tables matching TradingView's export naming for the tracked futures and ETFs.
    pub fn tradingview() -> Self {
        let symbols = [
            ("CME_MINI_RTY1!", "RTY1!"),
            ("CBOT_MINI_YM1!", "YM1!"),
            ("AMEX_DIA", "DIA"),
            ("CME_MINI_ES1!", "ES1!"),
            ("CME_MINI_NQ1!", "NQ1!"),
            ("CME_MINI_MES1!", "ES1!"),
            ("CME_MINI_MNQ1!", "NQ1!"),
            ("CAPITALCOM_US500", "US500"),
            ("TVC_VIX", "VIX"),
            ("TVC_GOLD", "GC1!"),
            ("TVC_SILVER", "SI1!"),
            ("COMEX_GC1!", "GC1!"),
            ("COMEX_SI1!", "SI1!"),
            ("OANDA_XAUUSD", "GC1!"),
        ]
        .into_iter()
        .map(|(prefix, symbol)| PrefixRule::new(prefix, symbol))
        .collect();

        let timeframes = [
            ("1", Timeframe::Min1),
            ("3", Timeframe::Min3),
            ("5", Timeframe::Min5),
            ("10", Timeframe::Min10),
            ("15", Timeframe::Min15),
            ("30", Timeframe::Min30),
            ("60", Timeframe::Min60),
            ("240", Timeframe::Min240),
            ("1D", Timeframe::Day),
            ("1W", Timeframe::Week),
            ("1M", Timeframe::Month),
        ]
        .into_iter()
        .map(|(token, tf)| (token.to_string(), tf))
        .collect();

        Self {
            symbols,
            timeframes,
        }
    }
}

impl Default for SourceTables {
    fn default() -> Self {
        Self::tradingview()
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("parse mapping tables: {0}")]
    Parse(String),

    #[error("empty prefix in symbol table (symbol '{symbol}')")]
    EmptyPrefix { symbol: String },

    #[error("empty symbol for prefix '{prefix}'")]
    EmptySymbol { prefix: String },
}

/// Outcome of resolving one file in a directory scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(SourceFile),
    Unmatched { file_name: String },
}

/// Immutable filename resolver built once at startup.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    tables: SourceTables,
}

impl SourceResolver {
    pub fn new(tables: SourceTables) -> Result<Self, TableError> {
        for rule in &tables.symbols {
            if rule.prefix.is_empty() {
                return Err(TableError::EmptyPrefix {
                    symbol: rule.symbol.clone(),
                });
            }
            if rule.symbol.trim().is_empty() {
                return Err(TableError::EmptySymbol {
                    prefix: rule.prefix.clone(),
                });
            }
        }
        Ok(Self { tables })
    }

    pub fn tradingview() -> Self {
        Self {
            tables: SourceTables::tradingview(),
        }
    }

    pub fn tables(&self) -> &SourceTables {
        &self.tables
    }

    /// Resolve a bare filename to `(symbol, timeframe)`.
    ///
    /// The extension is ignored. Only the first prefix that matches is
    /// considered; if its timeframe token is unknown the whole name is a miss.
    pub fn resolve_name(&self, file_name: &str) -> Option<(&str, Timeframe)> {
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => file_name,
        };

        let rule = self
            .tables
            .symbols
            .iter()
            .find(|rule| stem.starts_with(rule.prefix.as_str()))?;

        let rest = stem[rule.prefix.len()..]
            .trim_start_matches(PREFIX_SEPARATOR)
            .trim();
        let token = rest
            .split(TOKEN_DELIMITER)
            .next()
            .unwrap_or_default()
            .trim();

        let timeframe = self.tables.timeframes.get(token)?;
        Some((rule.symbol.as_str(), *timeframe))
    }

    /// Resolve a path into a source file descriptor.
    pub fn resolve(&self, path: &Path) -> Option<SourceFile> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let (symbol, timeframe) = self.resolve_name(&file_name)?;
        Some(SourceFile {
            symbol: symbol.to_string(),
            timeframe,
            path: path.to_path_buf(),
            file_name,
        })
    }

    /// Resolve every `.csv` file in a directory, in sorted filename order.
    ///
    /// Non-CSV entries and subdirectories are ignored entirely.
    pub fn scan_dir(&self, dir: &Path) -> std::io::Result<Vec<Resolution>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| match self.resolve(&path) {
                Some(source) => Resolution::Matched(source),
                None => Resolution::Unmatched {
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                },
            })
            .collect())
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::tradingview()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_hashed_export_name() {
        let r = SourceResolver::tradingview();
        assert_eq!(
            r.resolve_name("CME_MINI_RTY1!, 5_c43af.csv"),
            Some(("RTY1!", Timeframe::Min5))
        );
        assert_eq!(
            r.resolve_name("CBOT_MINI_YM1!, 1D_724af.csv"),
            Some(("YM1!", Timeframe::Day))
        );
        assert_eq!(
            r.resolve_name("AMEX_DIA, 1M_0a1b2.csv"),
            Some(("DIA", Timeframe::Month))
        );
    }

    #[test]
    fn resolves_name_without_hash_suffix() {
        let r = SourceResolver::tradingview();
        assert_eq!(
            r.resolve_name("TVC_VIX, 240.csv"),
            Some(("VIX", Timeframe::Min240))
        );
    }

    #[test]
    fn unknown_prefix_is_a_miss() {
        let r = SourceResolver::tradingview();
        assert_eq!(r.resolve_name("NASDAQ_AAPL, 1D_abcd1.csv"), None);
        assert_eq!(r.resolve_name("notes.csv"), None);
    }

    #[test]
    fn unknown_timeframe_token_is_a_miss() {
        let r = SourceResolver::tradingview();
        assert_eq!(r.resolve_name("CME_MINI_RTY1!, 2H_c43af.csv"), None);
        // lowercase tokens are not in the table
        assert_eq!(r.resolve_name("CME_MINI_RTY1!, 1d_c43af.csv"), None);
    }

    #[test]
    fn first_matching_prefix_wins_without_fallback() {
        let tables = SourceTables {
            symbols: vec![
                PrefixRule::new("CME_MINI", "BROAD"),
                PrefixRule::new("CME_MINI_ES1!", "ES1!"),
            ],
            timeframes: [("1D".to_string(), Timeframe::Day)].into_iter().collect(),
        };
        let r = SourceResolver::new(tables).unwrap();
        // "CME_MINI" matches first; its remainder "_ES1!, 1D_x" yields an
        // empty token, and the later, longer prefix is never tried.
        assert_eq!(r.resolve_name("CME_MINI_ES1!, 1D_abc12.csv"), None);
    }

    #[test]
    fn micro_contracts_map_to_full_size_symbol() {
        let r = SourceResolver::tradingview();
        assert_eq!(
            r.resolve_name("CME_MINI_MES1!, 15_ffff0.csv"),
            Some(("ES1!", Timeframe::Min15))
        );
    }

    #[test]
    fn tables_toml_roundtrip_preserves_order() {
        let tables = SourceTables::tradingview();
        let text = tables.to_toml().unwrap();
        let parsed = SourceTables::from_toml(&text).unwrap();
        assert_eq!(parsed, tables);
    }

    #[test]
    fn toml_rejects_unknown_canonical_code() {
        let text = r#"
symbols = []

[timeframes]
"2H" = "120"
"#;
        assert!(SourceTables::from_toml(text).is_err());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let tables = SourceTables {
            symbols: vec![PrefixRule::new("", "X")],
            timeframes: BTreeMap::new(),
        };
        assert!(matches!(
            SourceResolver::new(tables),
            Err(TableError::EmptyPrefix { .. })
        ));
    }

    #[test]
    fn scan_dir_sorts_and_filters_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("TVC_VIX, 1D_bbbbb.csv"), "time,open,high,low,close\n").unwrap();
        fs::write(dir.path().join("AMEX_DIA, 5_aaaaa.csv"), "time,open,high,low,close\n").unwrap();
        fs::write(dir.path().join("readme.txt"), "ignore me").unwrap();
        fs::write(dir.path().join("random.csv"), "").unwrap();

        let r = SourceResolver::tradingview();
        let scanned = r.scan_dir(dir.path()).unwrap();

        assert_eq!(scanned.len(), 3);
        match &scanned[0] {
            Resolution::Matched(s) => {
                assert_eq!(s.symbol, "DIA");
                assert_eq!(s.timeframe, Timeframe::Min5);
                assert_eq!(s.file_name, "AMEX_DIA, 5_aaaaa.csv");
            }
            other => panic!("expected match, got {other:?}"),
        }
        assert!(matches!(&scanned[1], Resolution::Matched(s) if s.symbol == "VIX"));
        assert_eq!(
            scanned[2],
            Resolution::Unmatched {
                file_name: "random.csv".into()
            }
        );
    }
}
