use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "transcript-api",
    about = "TubeChat Transcript API - YouTube captions as plain text through rotating proxies",
    version,
    long_about = "Serves YouTube caption tracks as plain text over HTTP. Requests go out through a pool of proxies (or a rotating gateway) and rate-limited or blocked attempts are retried with exponential backoff."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP transcript endpoint
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long, env = "LISTEN_ADDR", value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },

    /// Fetch one transcript and print or save it
    Fetch {
        /// Video ID or full YouTube URL
        #[arg(value_name = "VIDEO_ID_OR_URL")]
        video: String,

        /// Preferred language, repeatable, highest priority first (defaults to config)
        #[arg(short, long = "language", value_name = "LANG")]
        languages: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show or initialise configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON object with videoId and text, as served over HTTP
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
