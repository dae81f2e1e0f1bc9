use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chat_block_bot::block::{
    BlockHandle, BlockService, BlockTracker, ChannelOutgoing, HttpBlockSource,
};
use chat_block_bot::chat::{HistoryHandle, HistoryService, HistoryWindow};
use chat_block_bot::common::{ChatMessage, FeedEvent, OutgoingMessage};
use chat_block_bot::config;
use chat_block_bot::storage::{MemoryStore, SqliteStore, Store};
use clap::Parser;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

#[derive(Parser)]
#[command(
    name = "chat_block_bot",
    version,
    about = "Chat history keeper and block notifier"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// SQLite database, overrides `database_path` from the config
    #[arg(long, value_name = "FILE")]
    database: Option<String>,
    /// Read newline-delimited JSON feed events from stdin
    #[arg(long)]
    stdin_feed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if let Some(database) = cli.database {
        app_config.database_path = Some(database);
    }

    let store: Arc<dyn Store> = match &app_config.database_path {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => {
            log::warn!("No database configured; chat and block state will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let window = HistoryWindow::load(store.clone(), app_config.chat_history).await;
    let tracker = BlockTracker::load(store.clone()).await;

    let (outgoing, outgoing_rx) = ChannelOutgoing::new(app_config.queue_capacity);
    let (history_service, history) = HistoryService::new(window, app_config.queue_capacity);
    let (block_service, blocks) =
        BlockService::new(tracker, Some(Arc::new(outgoing)), app_config.queue_capacity);

    tokio::spawn(history_service.run());
    tokio::spawn(block_service.run());
    tokio::spawn(deliver_outgoing(outgoing_rx));
    tokio::spawn(log_new_messages(history.subscribe().await?));

    if let Some(url) = &app_config.block_source_url {
        let source = HttpBlockSource::new(
            url.clone(),
            Duration::from_secs(app_config.block_poll_secs.max(1)),
            Duration::from_secs(app_config.block_timeout_secs.max(1)),
        )?;
        tokio::spawn(source.run(blocks.clone()));
    }

    log::info!("Bot started");

    tokio::select! {
        result = run_feed(history, blocks), if cli.stdin_feed => {
            match result {
                Ok(()) => log::info!("Feed closed, shutting down"),
                Err(err) => log::error!("Feed terminated: {err}"),
            }
        }
        _ = signal::ctrl_c() => {
            log::info!("Received shutdown signal, stopping bot...");
        }
    }

    Ok(())
}

/// Stand-in for the platform connection: prints what the bot would say.
async fn deliver_outgoing(mut outgoing: mpsc::Receiver<OutgoingMessage>) {
    while let Some(message) = outgoing.recv().await {
        println!("[{}] {}", message.channel, message.text);
    }
}

async fn log_new_messages(mut events: broadcast::Receiver<ChatMessage>) {
    loop {
        match events.recv().await {
            Ok(msg) => log::info!("<{}> {}", msg.username, msg.message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Message log fell behind by {skipped} messages");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_feed(history: HistoryHandle, blocks: BlockHandle) -> Result<(), Box<dyn Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event = match serde_json::from_str::<FeedEvent>(&line) {
            Ok(event) => event,
            Err(err) => {
                log::warn!("Ignoring malformed feed line: {err}");
                continue;
            }
        };

        match event {
            FeedEvent::History { messages } => {
                let report = history.merge(messages).await?;
                log::info!(
                    "Merged chat batch: {} imported, {} appended, {} stray",
                    report.imported,
                    report.appended,
                    report.stray
                );
            }
            FeedEvent::BlockCommand { username, channel } => {
                blocks.register(&username, &channel).await?;
            }
            FeedEvent::Block(event) => {
                let height = event.height;
                let outcome = blocks.on_block(event).await?;
                log::debug!("Block #{height} from feed: {outcome:?}");
            }
            FeedEvent::Query { username, after } => {
                let found = history.query(&username, after).await?;
                log::info!("{} messages from {username} since {after}", found.len());
                for msg in found {
                    println!("{}", serde_json::to_string(&msg)?);
                }
            }
        }
    }

    Ok(())
}
