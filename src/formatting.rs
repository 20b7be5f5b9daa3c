use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use snapscout_lib::output::SCOUT_OUTPUT_VERSION;
use snapscout_lib::{ErrorOutput, ScoutError, ScoutOutput};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &ScoutOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the fatal exit code.
pub fn render_error(err: ScoutError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let error_payload = err.to_payload();
    let payload = ScoutOutput::Error(ErrorOutput {
        version: SCOUT_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    ExitCode::from(2)
}

fn write_json_output(
    body: &ScoutOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Human text on a terminal, indented JSON everywhere else.
fn write_pretty_output(body: &ScoutOutput, output: Option<&Path>) -> io::Result<()> {
    let use_human = output.is_none() && io::stdout().is_terminal();

    if use_human {
        println!("{}", format_pretty(body, true));
        return Ok(());
    }

    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &ScoutOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        ScoutOutput::Resolve(out) => {
            let header = color("[RESOLVE]", "36", colorize);
            writeln!(buf, "{} {} snapshot(s)", header, out.count).ok();
            for spec in &out.snapshots {
                let widths: Vec<String> = spec.widths.iter().map(u32::to_string).collect();
                writeln!(buf, "- {} ({})", spec.name, spec.url).ok();
                writeln!(
                    buf,
                    "  widths {} / minHeight {}",
                    widths.join(","),
                    spec.min_height
                )
                .ok();
                for additional in &spec.additional_snapshots {
                    if let Some(name) = &additional.name {
                        writeln!(buf, "  + {}", name).ok();
                    }
                }
            }
        }
        ScoutOutput::Sitemap(out) => {
            let header = color("[SITEMAP]", "34", colorize);
            writeln!(buf, "{} {} ({} urls)", header, out.sitemap, out.urls.len()).ok();
            for url in &out.urls {
                writeln!(buf, "- {url}").ok();
            }
        }
        ScoutOutput::DryRun(out) => {
            let header = color("[DRY RUN]", "33", colorize);
            writeln!(buf, "{} {} snapshot(s) found", header, out.snapshots.len()).ok();
            for entry in &out.snapshots {
                let viewports: Vec<String> =
                    entry.viewports.iter().map(ToString::to_string).collect();
                writeln!(buf, "- {} [{}]", entry.name, viewports.join(" ")).ok();
            }
        }
        ScoutOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or(out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
        }
    }
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapscout_lib::output::{DryRunEntry, DryRunOutput, ResolveOutput, SitemapOutput};
    use snapscout_lib::{ErrorCategory, ErrorPayload, SnapshotSpec, Viewport};

    fn spec(name: &str) -> SnapshotSpec {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "url": format!("https://example.com{name}"),
            "widths": [375, 1280],
            "minHeight": 1024
        }))
        .expect("spec")
    }

    #[test]
    fn render_error_always_returns_fatal_exit_code() {
        let code = render_error(ScoutError::NoSnapshots, OutputFormat::Json, None);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn format_pretty_lists_resolved_snapshots() {
        let output = ScoutOutput::Resolve(ResolveOutput::new(vec![spec("/"), spec("/about")]));
        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[RESOLVE] 2 snapshot(s)"));
        assert!(pretty.contains("- /about (https://example.com/about)"));
        assert!(pretty.contains("widths 375,1280 / minHeight 1024"));
    }

    #[test]
    fn format_pretty_lists_sitemap_urls() {
        let output = ScoutOutput::Sitemap(SitemapOutput {
            version: SCOUT_OUTPUT_VERSION.to_string(),
            sitemap: "https://example.com/sitemap.xml".into(),
            urls: vec!["https://example.com/".into()],
        });
        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("(1 urls)"));
        assert!(pretty.contains("- https://example.com/"));
    }

    #[test]
    fn format_pretty_shows_dry_run_viewports() {
        let output = ScoutOutput::DryRun(DryRunOutput {
            version: SCOUT_OUTPUT_VERSION.to_string(),
            snapshots: vec![DryRunEntry {
                name: "/".into(),
                url: "https://example.com/".into(),
                viewports: vec![Viewport::new(375, 1024)],
            }],
        });
        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[DRY RUN] 1 snapshot(s) found"));
        assert!(pretty.contains("- / [375x1024]"));
    }

    #[test]
    fn format_pretty_handles_errors() {
        let output = ScoutOutput::Error(ErrorOutput {
            version: SCOUT_OUTPUT_VERSION.to_string(),
            message: Some("bad input".to_string()),
            error: ErrorPayload::new(ErrorCategory::Config, "bad input".into(), "check flags"),
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[ERROR] bad input"));
        assert!(pretty.contains("Hint: check flags"));
    }
}
