use std::path::PathBuf;
use std::process::ExitCode;

use snapscout_lib::output::{SitemapOutput, SCOUT_OUTPUT_VERSION};
use snapscout_lib::{gather_sitemap_urls, HttpSitemapFetcher, ScoutError, ScoutOutput};
use tracing::info;

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};

/// Run the sitemap command.
pub async fn run_sitemap(url: String, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let fetcher = match HttpSitemapFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(err) => return render_error(err, format, output),
    };
    let urls = match gather_sitemap_urls(&fetcher, &url).await {
        Ok(urls) => urls,
        Err(err) => return render_error(err, format, output),
    };
    info!(sitemap = %url, count = urls.len(), "Fetched sitemap");

    let body = ScoutOutput::Sitemap(SitemapOutput {
        version: SCOUT_OUTPUT_VERSION.to_string(),
        sitemap: url,
        urls,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ScoutError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
