mod cli;
mod uploader;

use std::process;
use std::time::Duration;

use clap::Parser;
use cdn_common::{LoggingOptions, init_logging};
use tracing::error;

use crate::cli::Args;
use crate::uploader::{Uploader, find_videos, load_targets};

/// Exit code when any upload failed or the configuration is unusable.
const EXIT_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        "cdn_origin=debug,cdn_common=debug"
    } else {
        "cdn_origin=info,cdn_common=info"
    };
    if let Err(e) = init_logging(&LoggingOptions::new(filter, "cdn-origin")) {
        eprintln!("Error: {}", e);
    }

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_FAILURE),
        Err(e) => {
            error!("Upload aborted: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_FAILURE);
        }
    }
}

/// Returns whether every upload succeeded.
async fn run(args: Args) -> anyhow::Result<bool> {
    let replicas = load_targets(&args.config)?;
    let videos = find_videos(&args.videos_dir).await?;

    println!(
        "Using replicas: {}",
        replicas
            .iter()
            .map(|r| r.url.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if videos.is_empty() {
        println!("No .mp4 files found in {}", args.videos_dir.display());
        return Ok(true);
    }

    let uploader = Uploader::new(Duration::from_secs(args.timeout_secs.max(1)))?;
    let report = uploader.push_all(&replicas, &videos).await;

    println!(
        "Uploaded {}/{} (videos: {}, replicas: {})",
        report.succeeded(),
        report.outcomes.len(),
        videos.len(),
        replicas.len()
    );
    for failure in report.failed() {
        println!(
            "  FAILED {} -> {}: {}",
            failure.video,
            failure.replica,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(report.is_success())
}
