use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ytsearch", about = "Offline full-text search over cached video metadata and captions", version)]
pub struct Cli {
    /// Directory holding the local cache (kv store + shard indexes).
    #[arg(long, env = "YTSEARCH_CACHE_DIR", default_value = "./.ytsearch-cache")]
    pub cache_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search a channel, playlist, or explicit video list.
    Search {
        /// Channel handle/id/slug/user, or a playlist id, depending on --kind.
        alias: String,
        query: String,
        #[arg(long, default_value = "channel", value_parser = ["channel", "playlist"])]
        kind: String,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 50)]
        take: usize,
        #[arg(long, default_value_t = 24)]
        cache_hours: i64,
        #[arg(long, default_value_t = 40)]
        padding: usize,
        #[arg(long, value_parser = ["score", "uploaded"])]
        order_by: Option<String>,
        #[arg(long)]
        asc: bool,
    },
    /// List keywords (and their video counts) across a channel or playlist.
    ListKeywords {
        alias: String,
        #[arg(long, default_value = "channel", value_parser = ["channel", "playlist"])]
        kind: String,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 50)]
        take: usize,
        #[arg(long, default_value_t = 24)]
        cache_hours: i64,
    },
}
