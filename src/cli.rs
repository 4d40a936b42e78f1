//! CLI argument definitions using clap derive macros.
//!
//! Every scan option can also come from the environment (or a `.env` file
//! in the working directory), so existing env-style deployments keep working.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use idscan_core::fetch::{DEFAULT_NAME_FIELD, DEFAULT_USER_AGENT};
use idscan_core::{DEFAULT_FETCH_ATTEMPTS, DEFAULT_MAX_WORKERS, DEFAULT_PLACEHOLDER_PREFIX};

/// Durable sink backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// SQLite database file with a `records` table.
    Sqlite,
    /// Append-only CSV file with an `id,display_name` header.
    Csv,
}

/// Sweep a numeric ID range against an HTTP endpoint and persist the
/// display names it returns.
///
/// Runs are resumable: a new run starts after the highest ID already
/// stored in the output.
#[derive(Parser, Debug)]
#[command(name = "idscan")]
#[command(author, version, about)]
pub struct Args {
    /// Endpoint URL template with one `{}` or `{id}` placeholder
    #[arg(short = 'u', long = "url-template", env = "USER_DATA")]
    pub url_template: String,

    /// Output location (`.csv` selects the CSV sink, anything else SQLite)
    #[arg(short, long, env = "OUTPUT")]
    pub output: PathBuf,

    /// Force the sink backend instead of inferring it from the extension
    #[arg(long, value_enum, env = "OUTPUT_FORMAT")]
    pub format: Option<OutputFormat>,

    /// First ID of the range (inclusive)
    #[arg(short = 's', long, env = "START_ID", allow_negative_numbers = true)]
    pub start_id: i64,

    /// Last ID of the range (inclusive)
    #[arg(short = 'e', long, env = "END_ID", allow_negative_numbers = true)]
    pub end_id: i64,

    /// Flush to the output after this many accepted records
    #[arg(long, env = "SAVE_EVERY", value_parser = clap::value_parser!(u32).range(1..))]
    pub save_every: u32,

    /// Maximum concurrent lookups (1-256)
    #[arg(short = 'w', long, env = "MAX_WORKERS", default_value_t = DEFAULT_MAX_WORKERS as u16, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub max_workers: u16,

    /// Names starting with this prefix are treated as placeholders and skipped
    #[arg(long, env = "PLACEHOLDER_PREFIX", default_value = DEFAULT_PLACEHOLDER_PREFIX)]
    pub placeholder_prefix: String,

    /// JSON field holding the display name
    #[arg(long, env = "NAME_FIELD", default_value = DEFAULT_NAME_FIELD)]
    pub name_field: String,

    /// User-Agent header sent with every lookup
    #[arg(long, env = "USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Skip TLS certificate verification
    #[arg(long, env = "INSECURE_TLS")]
    pub insecure_tls: bool,

    /// Per-request timeout in seconds (1-300)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub request_timeout_secs: u64,

    /// Attempts per lookup for transient failures (1-10)
    #[arg(long, env = "FETCH_ATTEMPTS", default_value_t = DEFAULT_FETCH_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub fetch_attempts: u32,

    /// Milliseconds in-flight lookups may keep completing after Ctrl+C (max 600000)
    #[arg(long, env = "DRAIN_GRACE_MS", default_value_t = 5000, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub drain_grace_ms: u64,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable ANSI colors in log output
    #[arg(long)]
    pub no_color: bool,
}
