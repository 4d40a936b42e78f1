use std::fs;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use idscan_core::{
    BatchSink, CsvStore, LookupClient, RecordLookup, RecordStore, ScanCoordinator, ScanError,
    ScanReport, SqliteStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ProcessExit;
use crate::app::{config_runtime, exit_handler, interrupt, progress_manager, summary, terminal};
use crate::cli::{Args, OutputFormat};

pub(crate) async fn run_scan() -> Result<ProcessExit> {
    // Values from .env fill in anything not already set in the environment.
    let _ = dotenv::dotenv();

    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let default_level = config_runtime::resolve_default_log_level(&args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&args);
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);

    debug!(?args, "CLI arguments parsed");

    let scan_config = config_runtime::build_scan_config(&args)?;
    let lookup_config = config_runtime::build_lookup_config(&args)?;
    let filter = config_runtime::build_name_filter(&args);
    let format = config_runtime::resolve_output_format(&args.output, args.format);

    info!(output = %args.output.display(), ?format, "ID scanner starting");

    let store = open_store(&args.output, format).await?;
    let lookup: Arc<dyn RecordLookup> =
        Arc::new(LookupClient::new(lookup_config).context("Failed to build HTTP client")?);
    let sink = BatchSink::new(Arc::clone(&store));
    let coordinator = ScanCoordinator::new(scan_config, lookup, filter, sink)?;

    let cancel = CancellationToken::new();
    interrupt::spawn_ctrl_c_listener(cancel.clone());

    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) =
        progress_manager::spawn_progress_ui(show_progress, coordinator.stats());

    let outcome = coordinator.run(cancel).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = match outcome {
        Ok(report) => report,
        Err(ScanError::FinalFlush { report, source }) => {
            error!(
                unwritten = source.unwritten,
                error = %source,
                "Records remain unwritten after the final flush"
            );
            *report
        }
        Err(other) => return Err(other.into()),
    };

    finish(&report, store.as_ref()).await;
    Ok(exit_handler::determine_exit_outcome(&report))
}

async fn open_store(output: &Path, format: OutputFormat) -> Result<Arc<dyn RecordStore>> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        info!(dir = %parent.display(), "Created output directory");
    }

    let store: Arc<dyn RecordStore> = match format {
        OutputFormat::Csv => Arc::new(CsvStore::new(output)),
        OutputFormat::Sqlite => Arc::new(
            SqliteStore::open(output)
                .await
                .with_context(|| format!("Failed to open database {}", output.display()))?,
        ),
    };
    Ok(store)
}

async fn finish(report: &ScanReport, store: &dyn RecordStore) {
    let stored = match store.record_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "Could not count stored records");
            None
        }
    };
    summary::print_completion_summary(report, stored);
}
