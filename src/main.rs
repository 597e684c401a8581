use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubechat_transcript_api::{
    cli::{Cli, Commands},
    config::Config,
    output, server,
    server::TranscriptResponse,
    utils,
};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tubechat_transcript_api=debug,tower_http=debug"
    } else {
        "tubechat_transcript_api=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load()?;

    match cli.command {
        Commands::Serve { listen } => {
            if let Some(addr) = listen {
                config.server.listen_addr = addr;
            }
            let state = server::build_state(&config);
            server::serve(state, &config).await?;
        }
        Commands::Fetch {
            video,
            languages,
            format,
            output: output_path,
        } => {
            let video_id = utils::extract_video_id(&video)?;
            let languages = if languages.is_empty() {
                config.fetch.languages.clone()
            } else {
                languages
            };

            let state = server::build_state(&config);

            let progress = if cli.quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new_spinner()
            };
            progress.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            progress.set_message(format!("Fetching transcript for {}...", video_id));
            progress.enable_steady_tick(Duration::from_millis(120));

            let result = state
                .orchestrator
                .fetch_with_retry(&video_id, &languages)
                .await;
            progress.finish_and_clear();

            let result = TranscriptResponse {
                video_id,
                text: result?,
            };

            match output_path {
                Some(path) => {
                    output::save_to_file(&result, &path, &format)?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&result, &format)?;
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = config.save()?;
                println!("Configuration written to: {}", path.display());
                println!("Proxy password is not stored; set PROXY_PASSWORD in the environment.");
            }
        }
    }

    Ok(())
}
