use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use snapscout_lib::discovery::NoopBrowser;
use snapscout_lib::logging::LogStore;
use snapscout_lib::output::{DryRunEntry, DryRunOutput, SCOUT_OUTPUT_VERSION};
use snapscout_lib::{
    gather, Discovery, GatherContext, RawOptions, ScoutError, ScoutOutput, WidthList,
};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};
use crate::settings::{apply_overrides, load_config, load_snapshot_file, with_base_url};

/// Run the dry-run command.
pub async fn run_dry_run(
    config_path: Option<PathBuf>,
    logs: LogStore,
    file: PathBuf,
    base_url: Option<String>,
    widths: Option<WidthList>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => apply_overrides(cfg, widths),
        Err(err) => return render_error(err, format, output),
    };
    config.discovery.dry_run = true;
    let discovery_config = config.discovery.clone();
    let options = match load_snapshot_file(&file) {
        Ok(options) => with_base_url(options, base_url),
        Err(err) => return render_error(err, format, output),
    };

    let ctx = match GatherContext::new(config) {
        Ok(ctx) => ctx,
        Err(err) => return render_error(err, format, output),
    };
    let snapshots = match gather(&ctx, RawOptions::from_value(options)).await {
        Ok(snapshots) => snapshots,
        Err(err) => return render_error(err, format, output),
    };

    let discovery = Discovery::new(Arc::new(NoopBrowser), logs).with_config(&discovery_config);
    let mut found = Vec::new();
    for snapshot in &snapshots {
        let result = discovery
            .discover(snapshot, |capture, _| found.push(DryRunEntry::from_spec(capture)))
            .await;
        if let Err(err) = result {
            return render_error(err, format, output);
        }
    }
    debug!(count = found.len(), "Dry run finished");

    let body = ScoutOutput::DryRun(DryRunOutput {
        version: SCOUT_OUTPUT_VERSION.to_string(),
        snapshots: found,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ScoutError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
