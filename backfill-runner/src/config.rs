//! Run configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) describes the
//! reference run: `TV Exports/` into `ticker_candles` through wrangler, 500
//! statements per batch, 120 s per batch.
//!
//! ```toml
//! input_dir = "TV Exports"
//! batch_size = 250
//!
//! [target]
//! kind = "sqlite"
//! path = "candles.db"
//!
//! [[symbols]]
//! prefix = "CME_MINI_RTY1!"
//! symbol = "RTY1!"
//! ```

use crate::executor::ExecutorSettings;
use crate::remote::{
    D1HttpExecutor, DryRunExecutor, ExecError, RemoteExecutor, SqliteStore, WranglerExecutor,
};
use backfill_core::domain::Timeframe;
use backfill_core::resolver::{PrefixRule, SourceResolver, SourceTables, TableError};
use backfill_core::schema::{is_valid_table_name, DEFAULT_TABLE};
use backfill_core::statement::StatementBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INPUT_DIR: &str = "TV Exports";
pub const DEFAULT_DATABASE: &str = "timed-trading-ledger";

/// Configuration problems. All of them are fatal before any file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse config: {0}")]
    Parse(String),

    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,

    #[error("timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("timeframe token '{token}' maps to unknown code '{code}'")]
    UnknownTimeframe { token: String, code: String },

    #[error(transparent)]
    Tables(#[from] TableError),

    #[error("input directory not found: {0}")]
    InputDirMissing(PathBuf),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("cannot open target: {0}")]
    Target(#[from] ExecError),
}

/// Where batches are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Target {
    /// `npx wrangler d1 execute` subprocess.
    Wrangler {
        #[serde(default = "default_database")]
        database: String,
        #[serde(default = "default_remote")]
        remote: bool,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
    /// Cloudflare D1 REST API. The token is never read from the config file.
    D1Http {
        #[serde(default)]
        account_id: Option<String>,
        #[serde(default)]
        database_id: Option<String>,
    },
    /// Local SQLite file.
    Sqlite { path: PathBuf },
}

impl Default for Target {
    fn default() -> Self {
        Target::Wrangler {
            database: default_database(),
            remote: true,
            working_dir: None,
        }
    }
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Wrangler { .. } => "wrangler",
            Target::D1Http { .. } => "d1-http",
            Target::Sqlite { .. } => "sqlite",
        }
    }
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_remote() -> bool {
    true
}

/// Secrets supplied by the caller (flags or environment), never by the file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub account_id: Option<String>,
    pub database_id: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub input_dir: PathBuf,
    pub table: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub dry_run: bool,
    pub target: Target,
    /// Replaces the built-in prefix table when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<PrefixRule>>,
    /// Replaces the built-in timeframe table when present (token -> canonical code).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframes: Option<BTreeMap<String, String>>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            table: DEFAULT_TABLE.to_string(),
            batch_size: crate::batch::DEFAULT_BATCH_SIZE.get(),
            timeout_secs: crate::executor::DEFAULT_TIMEOUT.as_secs(),
            dry_run: false,
            target: Target::default(),
            symbols: None,
            timeframes: None,
        }
    }
}

impl BackfillConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Check everything that can be checked without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings()?;
        if !is_valid_table_name(&self.table) {
            return Err(ConfigError::InvalidTable(self.table.clone()));
        }
        self.resolver()?;
        Ok(())
    }

    /// Fail unless the input directory exists.
    pub fn require_input_dir(&self) -> Result<&Path, ConfigError> {
        if self.input_dir.is_dir() {
            Ok(&self.input_dir)
        } else {
            Err(ConfigError::InputDirMissing(self.input_dir.clone()))
        }
    }

    /// Mapping tables: built-in TradingView tables with configured overrides.
    pub fn tables(&self) -> Result<SourceTables, ConfigError> {
        let mut tables = SourceTables::tradingview();
        if let Some(symbols) = &self.symbols {
            tables.symbols = symbols.clone();
        }
        if let Some(timeframes) = &self.timeframes {
            tables.timeframes = timeframes
                .iter()
                .map(|(token, code)| {
                    code.parse::<Timeframe>()
                        .map(|tf| (token.clone(), tf))
                        .map_err(|_| ConfigError::UnknownTimeframe {
                            token: token.clone(),
                            code: code.clone(),
                        })
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(tables)
    }

    pub fn resolver(&self) -> Result<SourceResolver, ConfigError> {
        Ok(SourceResolver::new(self.tables()?)?)
    }

    pub fn settings(&self) -> Result<ExecutorSettings, ConfigError> {
        let capacity = NonZeroUsize::new(self.batch_size).ok_or(ConfigError::ZeroBatchSize)?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(ExecutorSettings {
            capacity,
            timeout: Duration::from_secs(self.timeout_secs),
            dry_run: self.dry_run,
        })
    }

    pub fn statement_builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.table.as_str())
    }

    /// Construct the configured remote executor. A dry run gets a stand-in
    /// that leaves the target untouched.
    pub fn build_executor(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteExecutor>, ConfigError> {
        if self.dry_run {
            tracing::debug!(target_kind = self.target.kind(), "dry run, target not opened");
            return Ok(Box::new(DryRunExecutor::new(self.target.kind())));
        }

        let executor: Box<dyn RemoteExecutor> = match &self.target {
            Target::Wrangler {
                database,
                remote,
                working_dir,
            } => {
                let mut exec = WranglerExecutor::new(database.as_str());
                if !remote {
                    exec = exec.local();
                }
                if let Some(dir) = working_dir {
                    exec = exec.working_dir(dir);
                }
                Box::new(exec)
            }
            Target::D1Http {
                account_id,
                database_id,
            } => {
                let account = credentials
                    .account_id
                    .as_deref()
                    .or(account_id.as_deref())
                    .ok_or(ConfigError::MissingCredential("CLOUDFLARE_ACCOUNT_ID"))?;
                let database = credentials
                    .database_id
                    .as_deref()
                    .or(database_id.as_deref())
                    .ok_or(ConfigError::MissingCredential("D1_DATABASE_ID"))?;
                let token = credentials
                    .api_token
                    .as_deref()
                    .ok_or(ConfigError::MissingCredential("CLOUDFLARE_API_TOKEN"))?;
                Box::new(D1HttpExecutor::new(account, database, token)?)
            }
            Target::Sqlite { path } => Box::new(SqliteStore::open(path, &self.table)?),
        };
        tracing::debug!(target_kind = self.target.kind(), executor = executor.name(), "executor ready");
        Ok(executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_the_reference_run() {
        let cfg = BackfillConfig::from_toml("").unwrap();
        assert_eq!(cfg, BackfillConfig::default());
        assert_eq!(cfg.input_dir, PathBuf::from("TV Exports"));
        assert_eq!(cfg.table, "ticker_candles");
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.timeout_secs, 120);
        assert_eq!(
            cfg.target,
            Target::Wrangler {
                database: "timed-trading-ledger".into(),
                remote: true,
                working_dir: None,
            }
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn sqlite_target_and_overrides() {
        let cfg = BackfillConfig::from_toml(
            r#"
            batch_size = 50
            dry_run = true

            [target]
            kind = "sqlite"
            path = "candles.db"

            [[symbols]]
            prefix = "BINANCE_BTCUSDT"
            symbol = "BTCUSD"

            [timeframes]
            "1H" = "60"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.target.kind(), "sqlite");
        let settings = cfg.settings().unwrap();
        assert_eq!(settings.capacity.get(), 50);
        assert!(settings.dry_run);

        let resolver = cfg.resolver().unwrap();
        assert_eq!(
            resolver.resolve_name("BINANCE_BTCUSDT, 1H_aa.csv"),
            Some(("BTCUSD", Timeframe::Min60))
        );
        assert_eq!(resolver.resolve_name("CME_MINI_RTY1!, 5_c43af.csv"), None);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = BackfillConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroBatchSize)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = BackfillConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn unknown_timeframe_code_is_rejected() {
        let cfg = BackfillConfig::from_toml("[timeframes]\n\"2H\" = \"120\"\n").unwrap();
        match cfg.validate() {
            Err(ConfigError::UnknownTimeframe { token, code }) => {
                assert_eq!(token, "2H");
                assert_eq!(code, "120");
            }
            other => panic!("expected UnknownTimeframe, got {other:?}"),
        }
    }

    #[test]
    fn bad_table_name_is_rejected() {
        let cfg = BackfillConfig {
            table: "candles; DROP TABLE x".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTable(_))));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let cfg =
            BackfillConfig::from_toml("[[symbols]]\nprefix = \"\"\nsymbol = \"X\"\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Tables(_))));
    }

    #[test]
    fn missing_input_dir() {
        let cfg = BackfillConfig {
            input_dir: PathBuf::from("/definitely/not/here"),
            ..Default::default()
        };
        assert!(matches!(
            cfg.require_input_dir(),
            Err(ConfigError::InputDirMissing(_))
        ));
    }

    #[test]
    fn d1_http_needs_token() {
        let cfg = BackfillConfig {
            target: Target::D1Http {
                account_id: Some("acct".into()),
                database_id: Some("db".into()),
            },
            ..Default::default()
        };
        let err = cfg.build_executor(&Credentials::default()).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::MissingCredential("CLOUDFLARE_API_TOKEN")
        ));

        let creds = Credentials {
            api_token: Some("t".into()),
            ..Default::default()
        };
        let exec = cfg.build_executor(&creds).unwrap();
        assert_eq!(exec.name(), "d1 http db");
    }

    #[test]
    fn unknown_target_kind_fails_to_parse() {
        let err = BackfillConfig::from_toml("[target]\nkind = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn dry_run_leaves_sqlite_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.db");
        let cfg = BackfillConfig {
            dry_run: true,
            target: Target::Sqlite { path: path.clone() },
            ..Default::default()
        };

        let exec = cfg.build_executor(&Credentials::default()).unwrap();
        assert_eq!(exec.name(), "dry run (sqlite)");
        assert!(!path.exists());
    }

    #[test]
    fn dry_run_needs_no_credentials() {
        let cfg = BackfillConfig {
            dry_run: true,
            target: Target::D1Http {
                account_id: None,
                database_id: None,
            },
            ..Default::default()
        };
        assert!(cfg.build_executor(&Credentials::default()).is_ok());
    }
}
