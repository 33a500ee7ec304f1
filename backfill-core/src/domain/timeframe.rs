//! Timeframe — the canonical bar interval code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Canonical bar interval.
///
/// Intraday intervals are minute counts; the rest are calendar bars. The
/// canonical code is what lands in the store's `tf` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    Min1,
    Min3,
    Min5,
    Min10,
    Min15,
    Min30,
    Min60,
    Min240,
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub const ALL: [Timeframe; 11] = [
        Timeframe::Min1,
        Timeframe::Min3,
        Timeframe::Min5,
        Timeframe::Min10,
        Timeframe::Min15,
        Timeframe::Min30,
        Timeframe::Min60,
        Timeframe::Min240,
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
    ];

    /// Canonical code stored in the `tf` column.
    pub fn code(self) -> &'static str {
        match self {
            Timeframe::Min1 => "1",
            Timeframe::Min3 => "3",
            Timeframe::Min5 => "5",
            Timeframe::Min10 => "10",
            Timeframe::Min15 => "15",
            Timeframe::Min30 => "30",
            Timeframe::Min60 => "60",
            Timeframe::Min240 => "240",
            Timeframe::Day => "D",
            Timeframe::Week => "W",
            Timeframe::Month => "M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timeframe code '{0}'")]
pub struct UnknownTimeframe(pub String);

impl FromStr for Timeframe {
    type Err = UnknownTimeframe;

    /// Parses a canonical code only. Raw export tokens such as `1D` go through
    /// the resolver's timeframe table instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.code() == s)
            .ok_or_else(|| UnknownTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = UnknownTimeframe;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_parse_back() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.code().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn raw_tokens_are_not_canonical() {
        assert!("1D".parse::<Timeframe>().is_err());
        assert!("d".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn serializes_as_code() {
        let json = serde_json::to_string(&Timeframe::Day).unwrap();
        assert_eq!(json, "\"D\"");
        let tf: Timeframe = serde_json::from_str("\"240\"").unwrap();
        assert_eq!(tf, Timeframe::Min240);
    }
}
