use std::path::PathBuf;
use std::process::ExitCode;

use snapscout_lib::output::ResolveOutput;
use snapscout_lib::{gather, GatherContext, RawOptions, ScoutError, ScoutOutput, WidthList};
use tracing::{debug, info};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};
use crate::settings::{apply_overrides, load_config, load_snapshot_file, with_base_url};

/// Run the resolve command.
pub async fn run_resolve(
    config_path: Option<PathBuf>,
    file: PathBuf,
    base_url: Option<String>,
    widths: Option<WidthList>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => apply_overrides(cfg, widths),
        Err(err) => return render_error(err, format, output),
    };
    let options = match load_snapshot_file(&file) {
        Ok(options) => with_base_url(options, base_url),
        Err(err) => return render_error(err, format, output),
    };
    debug!(file = %file.display(), "Loaded snapshot options");

    let ctx = match GatherContext::new(config) {
        Ok(ctx) => ctx,
        Err(err) => return render_error(err, format, output),
    };
    let snapshots = match gather(&ctx, RawOptions::from_value(options)).await {
        Ok(snapshots) => snapshots,
        Err(err) => return render_error(err, format, output),
    };
    info!(count = snapshots.len(), "Resolved snapshots");

    let body = ScoutOutput::Resolve(ResolveOutput::new(snapshots));
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ScoutError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
