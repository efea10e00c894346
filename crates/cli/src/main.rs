//! geofeed operator CLI.
//!
//! Connects to the configured database and prints what a given user would
//! see: their feed, friend lists, a post's comment thread or the heatmap.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use geofeed_common::{AppError, AppResult, Config};
use geofeed_core::{
    CommentService, FeedService, PostService, ProfileService, SocialGraphCache, Stores,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "geofeed", about = "Inspect and maintain a geofeed database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Print one feed page as seen by a user.
    Feed {
        #[arg(long)]
        viewer: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Defaults to the configured page size.
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Print a user's friends and pending requests.
    Friends {
        #[arg(long)]
        viewer: String,
    },
    /// Print the laid-out comment thread of a post.
    Thread {
        #[arg(long)]
        post: String,
    },
    /// Print heatmap cells over a user's visible posts.
    Heatmap {
        #[arg(long)]
        viewer: String,
    },
    /// Search users and show the viewer's relationship to each.
    Search {
        #[arg(long)]
        viewer: String,
        query: String,
    },
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "geofeed=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print<T: Serialize>(value: &T) -> AppResult<()> {
    let out = serde_json::to_string_pretty(value).map_err(|e| AppError::Internal(e.to_string()))?;
    println!("{out}");
    Ok(())
}

async fn run(command: Command, config: &Config, stores: &Stores) -> AppResult<()> {
    match command {
        Command::Migrate => {}
        Command::Feed {
            viewer,
            offset,
            limit,
        } => {
            let mut graph = SocialGraphCache::new(viewer.as_str());
            let friend_ids = graph.ensure_fresh(stores).await.friend_ids();
            let page = FeedService::new(stores)
                .load_page(
                    &viewer,
                    &friend_ids,
                    offset,
                    limit.unwrap_or(config.feed.page_size),
                )
                .await?;
            print(&page)?;
        }
        Command::Friends { viewer } => {
            let mut cache = SocialGraphCache::new(viewer.as_str());
            if !cache.refresh(stores).await {
                return Err(AppError::NetworkFailure(format!(
                    "could not load the social graph for {viewer}"
                )));
            }
            let graph = cache.graph();
            print(&json!({
                "friends": graph.friends(),
                "friendCount": graph.friend_count(),
                "incoming": graph.incoming_requests(),
                "outgoing": graph.outgoing_requests(),
            }))?;
        }
        Command::Thread { post } => {
            let thread = CommentService::new(stores).thread(&post).await?;
            print(&thread)?;
        }
        Command::Heatmap { viewer } => {
            let mut graph = SocialGraphCache::new(viewer.as_str());
            let friend_ids = graph.ensure_fresh(stores).await.friend_ids();
            let cells = PostService::new(stores, &config.feed)
                .heatmap(&viewer, &friend_ids)
                .await?;
            print(&cells)?;
        }
        Command::Search { viewer, query } => {
            let results = ProfileService::new(stores)
                .search_users(&viewer, &query, ProfileService::SEARCH_LIMIT)
                .await?;
            print(&results)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config);

    let db = Arc::new(geofeed_db::init(&config).await?);
    info!("Connected to database");

    if matches!(cli.command, Command::Migrate) {
        geofeed_db::migrate(&db).await?;
        info!("Migrations completed");
        return Ok(());
    }

    let stores = Stores::from_connection(&db);
    if let Err(err) = run(cli.command, &config, &stores).await {
        err.log("geofeed-cli");
        return Err(err.into());
    }

    Ok(())
}
