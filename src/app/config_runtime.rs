//! Turns parsed CLI arguments into library configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use idscan_core::fetch::UrlTemplate;
use idscan_core::{LookupConfig, NameFilter, RetryPolicy, ScanConfig};

use crate::cli::{Args, OutputFormat};

pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// `-v`/`-q` given on the command line override `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(args: &Args) -> bool {
    args.verbose > 0 || args.quiet
}

/// Picks the sink backend: explicit `--format`, else `.csv` extension, else SQLite.
pub(crate) fn resolve_output_format(output: &Path, explicit: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = explicit {
        return format;
    }
    let is_csv = output
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        OutputFormat::Csv
    } else {
        OutputFormat::Sqlite
    }
}

pub(crate) fn build_scan_config(args: &Args) -> Result<ScanConfig> {
    if args.start_id > args.end_id {
        bail!(
            "Invalid range: start id {} is greater than end id {}",
            args.start_id,
            args.end_id
        );
    }
    if args.save_every == 0 {
        bail!("Invalid save_every value: 0. Expected at least 1");
    }

    let config = ScanConfig::new(args.start_id, args.end_id, args.save_every as usize)
        .with_max_workers(usize::from(args.max_workers))
        .with_drain_grace(Duration::from_millis(args.drain_grace_ms));
    config.validate()?;
    Ok(config)
}

pub(crate) fn build_lookup_config(args: &Args) -> Result<LookupConfig> {
    UrlTemplate::parse(&args.url_template)?;

    let mut config = LookupConfig::new(args.url_template.clone());
    config.name_field = args.name_field.clone();
    config.user_agent = args.user_agent.clone();
    config.accept_invalid_certs = args.insecure_tls;
    config.timeout = Duration::from_secs(args.request_timeout_secs);
    config.retry_policy = RetryPolicy::with_max_attempts(args.fetch_attempts);
    Ok(config)
}

pub(crate) fn build_name_filter(args: &Args) -> NameFilter {
    NameFilter::new(args.placeholder_prefix.clone())
}
