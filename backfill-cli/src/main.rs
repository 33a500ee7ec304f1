//! Backfill CLI — load TradingView candle exports into the candle store.
//!
//! Commands:
//! - `run` — backfill every export in the input directory
//! - `file` — backfill one export, optionally with an explicit symbol/timeframe
//! - `resolve` — preview how each export filename resolves
//! - `schema` — print the candle table DDL

use anyhow::{bail, Context, Result};
use backfill_core::domain::{SourceFile, Timeframe};
use backfill_core::schema::{create_table_sql, DEFAULT_TABLE};
use backfill_core::Resolution;
use backfill_runner::{
    config_id, save_report, BackfillConfig, BackfillProgress, Credentials, Pipeline, RunReport,
    StdoutProgress, Target,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "backfill",
    about = "Backfill TradingView CSV exports into the ticker_candles store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill every resolvable export in the input directory.
    Run {
        #[command(flatten)]
        exec: ExecArgs,

        /// Write a JSON run report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Backfill a single export file.
    File {
        /// Path to the CSV export.
        path: PathBuf,

        /// Symbol to store under (skips filename resolution; needs --timeframe).
        #[arg(long, requires = "timeframe")]
        symbol: Option<String>,

        /// Timeframe code or export token, e.g. 5, 240, D, 1D (needs --symbol).
        #[arg(long, requires = "symbol")]
        timeframe: Option<String>,

        #[command(flatten)]
        exec: ExecArgs,

        /// Write a JSON run report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show how each export in the input directory resolves, without writing.
    Resolve {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding the exports. Defaults to "TV Exports".
        #[arg(long)]
        input_dir: Option<PathBuf>,
    },
    /// Print the candle table DDL.
    Schema {
        /// Table name.
        #[arg(long, default_value = DEFAULT_TABLE)]
        table: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetKind {
    Wrangler,
    D1Http,
    Sqlite,
}

/// Flags shared by the commands that write.
#[derive(Args)]
struct ExecArgs {
    /// Path to a TOML config file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the exports. Defaults to "TV Exports".
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Parse and build everything but skip remote writes.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Statements per batch. Defaults to 500.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Per-batch timeout in seconds. Defaults to 120.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Where batches are applied. Defaults to wrangler.
    #[arg(long, value_enum)]
    target: Option<TargetKind>,

    /// D1 database name for the wrangler target.
    #[arg(long)]
    database: Option<String>,

    /// Database file for the sqlite target.
    #[arg(long)]
    sqlite_path: Option<PathBuf>,

    /// Candle table name. Defaults to ticker_candles.
    #[arg(long)]
    table: Option<String>,

    /// Cloudflare account id for the d1-http target.
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// D1 database id for the d1-http target.
    #[arg(long, env = "D1_DATABASE_ID")]
    database_id: Option<String>,

    /// Cloudflare API token for the d1-http target.
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
}

impl ExecArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            account_id: self.account_id.clone(),
            database_id: self.database_id.clone(),
            api_token: self.api_token.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { exec, report } => run_dir_cmd(&exec, report),
        Commands::File {
            path,
            symbol,
            timeframe,
            exec,
            report,
        } => run_file_cmd(path, symbol, timeframe, &exec, report),
        Commands::Resolve { config, input_dir } => run_resolve(config, input_dir),
        Commands::Schema { table } => run_schema(&table),
    }
}

fn base_config(path: Option<&PathBuf>) -> Result<BackfillConfig> {
    match path {
        Some(p) => BackfillConfig::from_file(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(BackfillConfig::default()),
    }
}

/// Config file (or defaults) with command-line overrides applied, validated.
fn load_config(args: &ExecArgs) -> Result<BackfillConfig> {
    let mut config = base_config(args.config.as_ref())?;

    if let Some(dir) = &args.input_dir {
        config.input_dir = dir.clone();
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(n) = args.batch_size {
        config.batch_size = n;
    }
    if let Some(s) = args.timeout_secs {
        config.timeout_secs = s;
    }
    if let Some(table) = &args.table {
        config.table = table.clone();
    }

    if let Some(kind) = args.target {
        let current = match config.target {
            Target::Wrangler { .. } => TargetKind::Wrangler,
            Target::D1Http { .. } => TargetKind::D1Http,
            Target::Sqlite { .. } => TargetKind::Sqlite,
        };
        if kind != current {
            config.target = match kind {
                TargetKind::Wrangler => Target::default(),
                TargetKind::D1Http => Target::D1Http {
                    account_id: None,
                    database_id: None,
                },
                TargetKind::Sqlite => match &args.sqlite_path {
                    Some(path) => Target::Sqlite { path: path.clone() },
                    None => bail!("--target sqlite requires --sqlite-path"),
                },
            };
        }
    }
    match &mut config.target {
        Target::Wrangler { database, .. } => {
            if let Some(name) = &args.database {
                *database = name.clone();
            }
        }
        Target::Sqlite { path } => {
            if let Some(p) = &args.sqlite_path {
                *path = p.clone();
            }
        }
        Target::D1Http { .. } => {}
    }

    config.validate()?;
    Ok(config)
}

fn run_dir_cmd(args: &ExecArgs, report_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(args)?;
    let input_dir = config.require_input_dir()?.to_path_buf();

    let remote = config.build_executor(&args.credentials())?;
    let pipeline = Pipeline::from_config(&config, remote.as_ref())?;
    info!(
        target_kind = config.target.kind(),
        executor = remote.name(),
        dry_run = config.dry_run,
        "backfilling {}",
        input_dir.display()
    );

    let mut report = pipeline.run_dir(&input_dir, &StdoutProgress)?;
    report.config_id = Some(config_id(&config)?);
    finish(&report, report_path)
}

fn run_file_cmd(
    path: PathBuf,
    symbol: Option<String>,
    timeframe: Option<String>,
    args: &ExecArgs,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(args)?;
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }

    let remote = config.build_executor(&args.credentials())?;
    let pipeline = Pipeline::from_config(&config, remote.as_ref())?;
    let started_at = Utc::now();

    let file_report = match (symbol, timeframe) {
        (Some(symbol), Some(tf)) => {
            let timeframe = parse_timeframe(&config, &tf)?;
            let source = SourceFile::with_override(&path, &symbol, timeframe);
            pipeline.run_file(&source, &StdoutProgress)
        }
        _ => pipeline.run_path(&path, &StdoutProgress)?,
    };

    let mut report = pipeline.report_for(file_report, started_at);
    report.config_id = Some(config_id(&config)?);
    StdoutProgress.on_run_complete(&report.summary);
    finish(&report, report_path)
}

fn run_resolve(config_path: Option<PathBuf>, input_dir: Option<PathBuf>) -> Result<()> {
    let mut config = base_config(config_path.as_ref())?;
    if let Some(dir) = input_dir {
        config.input_dir = dir;
    }
    let resolver = config.resolver()?;
    let dir = config.require_input_dir()?;

    let mut matched = 0;
    let resolutions = resolver
        .scan_dir(dir)
        .with_context(|| format!("scanning {}", dir.display()))?;
    for r in &resolutions {
        match r {
            Resolution::Matched(s) => {
                matched += 1;
                println!("{:<48} -> {} tf={}", s.file_name, s.symbol, s.timeframe);
            }
            Resolution::Unmatched { file_name } => println!("{file_name:<48} -> (no match)"),
        }
    }
    println!("\n{matched}/{} files resolved", resolutions.len());
    Ok(())
}

fn run_schema(table: &str) -> Result<()> {
    if !backfill_core::schema::is_valid_table_name(table) {
        bail!("invalid table name '{table}'");
    }
    println!("{};", create_table_sql(table));
    Ok(())
}

/// Accept a canonical code (`D`) or a raw export token from the mapping table (`1D`).
fn parse_timeframe(config: &BackfillConfig, raw: &str) -> Result<Timeframe> {
    if let Ok(tf) = raw.parse::<Timeframe>() {
        return Ok(tf);
    }
    match config.tables()?.timeframes.get(raw) {
        Some(tf) => Ok(*tf),
        None => bail!("unknown timeframe '{raw}'"),
    }
}

fn finish(report: &RunReport, report_path: Option<PathBuf>) -> Result<()> {
    if let Some(path) = report_path {
        save_report(report, &path)?;
        println!("Report written to {}", path.display());
    }

    if report.summary.has_failures() {
        for file in report.files.iter().filter(|f| f.is_failure()) {
            eprintln!("Failures in {}", file.file_name);
        }
        std::process::exit(1);
    }
    Ok(())
}
