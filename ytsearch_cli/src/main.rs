use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytsearch_core::{Config, Services};

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytsearch_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::default();
    config.cache_dir = cli.cache_dir.clone();

    let services = match Services::build(&cli.cache_dir, config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Search {
            alias,
            query,
            kind,
            skip,
            take,
            cache_hours,
            padding,
            order_by,
            asc,
        } => {
            let order_by = commands::parse_order_by(order_by.as_deref(), asc);
            commands::run_search(
                &services, &alias, &query, &kind, skip, take, cache_hours, padding, order_by,
            )
            .await
        }
        Commands::ListKeywords {
            alias,
            kind,
            skip,
            take,
            cache_hours,
        } => commands::run_list_keywords(&services, &alias, &kind, skip, take, cache_hours).await,
    };

    let _ = services.alias_map.flush_now();
    services.shutdown.cancel();

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}
