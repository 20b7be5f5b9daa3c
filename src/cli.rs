use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use snapscout_lib::logging::LogFormat;
use snapscout_lib::WidthList;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snapscout")]
#[command(
    version,
    about = "Snapscout - Resolve snapshot requests and discover their assets",
    long_about = "Snapscout\n\nModes:\n- resolve: validate a snapshot file (YAML/JSON) and print the fully merged snapshots.\n- sitemap: fetch a sitemap and print its deduplicated URLs.\n- dry-run: gather snapshots and report what discovery would capture, without a browser.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity (-v debug, -vv trace)"
    )]
    pub verbose: u8,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "human",
        help = "Log format on stderr"
    )]
    pub log_format: LogFormatArg,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) with snapshot and discovery defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a snapshot file into fully merged snapshots
    Resolve {
        #[arg(help = "Snapshot options file (.yml, .yaml or .json)")]
        file: PathBuf,

        #[arg(long, help = "Base URL for relative snapshot paths")]
        base_url: Option<String>,

        #[arg(long, help = "Override configured widths (comma-separated, e.g. 375,1280)")]
        widths: Option<WidthList>,

        #[arg(long, short, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },

    /// Fetch a sitemap and list its URLs
    Sitemap {
        #[arg(help = "Sitemap URL")]
        url: String,

        #[arg(long, short, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },

    /// Gather snapshots and run discovery without a browser
    DryRun {
        #[arg(help = "Snapshot options file (.yml, .yaml or .json)")]
        file: PathBuf,

        #[arg(long, help = "Base URL for relative snapshot paths")]
        base_url: Option<String>,

        #[arg(long, help = "Override configured widths (comma-separated, e.g. 375,1280)")]
        widths: Option<WidthList>,

        #[arg(long, short, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum LogFormatArg {
    #[default]
    Human,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Human => LogFormat::Human,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
