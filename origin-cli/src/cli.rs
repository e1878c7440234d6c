use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cdn-origin",
    version,
    about = "Push every .mp4 in a directory to every CDN replica"
)]
pub struct Args {
    /// Replica list file (a JSON list, or an object with a `replicas` key)
    #[arg(short, long, env = "REPLICAS_FILE", default_value = "config/replicas.json")]
    pub config: PathBuf,

    /// Directory holding the videos to upload
    #[arg(short, long, env = "VIDEOS_DIR", default_value = "videos")]
    pub videos_dir: PathBuf,

    /// Per-upload timeout in seconds
    #[arg(short, long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}
