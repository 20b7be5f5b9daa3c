mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_dry_run, run_resolve, run_sitemap};
use snapscout_lib::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    let logs = init_logging(args.log_format.into(), args.verbose);

    match args.command {
        Commands::Resolve {
            file,
            base_url,
            widths,
            output,
            format,
        } => run_resolve(args.config, file, base_url, widths, format, output).await,
        Commands::Sitemap {
            url,
            output,
            format,
        } => run_sitemap(url, format, output).await,
        Commands::DryRun {
            file,
            base_url,
            widths,
            output,
            format,
        } => run_dry_run(args.config, logs, file, base_url, widths, format, output).await,
    }
}
