//! hub2 command line entry point

use hub2::config::BridgeConfig;
use hub2::dispatch::{Dispatcher, TelegramConfig, TelegramSink};
use hub2::hub::{ConnectionManager, ReconnectPolicy};
use hub2::observability::init_default_logging;
use hub2::protocol::{Envelope, MessageBody, PayloadKind};
use hub2::reconcile::Reconciler;
use hub2::store::{parse_topic_list, JsonFilePersistence, RecipientKey, SubscriptionStore, TopicStore};
use hub2::transport::{HttpPublisher, HubConnector, HubLink, WsConnector};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Bridge between a topic pub/sub hub and Telegram chats
#[derive(Parser)]
#[command(name = "hub2")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "HUB2_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until SIGINT/SIGTERM
    Run,
    /// Publish one message to the hub
    Publish {
        /// Target topic; repeat for several, none means the global topic
        #[arg(long = "topic", short = 't')]
        topics: Vec<String>,
        /// Payload kind (PLAIN, MARKDOWN, HTML, JSON, MEDIA-IMAGE, MEDIA-VIDEO)
        #[arg(long, default_value = "PLAIN")]
        kind: String,
        #[arg(long)]
        caption: Option<String>,
        /// Disable (false) or force (true) link previews
        #[arg(long)]
        preview: Option<bool>,
        /// Use the one-shot HTTP endpoint instead of the websocket
        #[arg(long)]
        http: bool,
        data: String,
    },
    /// Inspect or edit the local subscription store
    Topics {
        #[command(flatten)]
        key: KeyArgs,
        #[command(subcommand)]
        action: TopicsAction,
    },
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args)]
struct KeyArgs {
    /// Originator user id
    #[arg(long = "from")]
    originator: Option<String>,
    /// Originator display name
    #[arg(long, default_value = "")]
    name: String,
    /// Destination chat id, defaults to the originator
    #[arg(long = "chat")]
    destination: Option<String>,
}

impl KeyArgs {
    fn key(&self) -> Result<RecipientKey, Box<dyn std::error::Error>> {
        let originator = self
            .originator
            .as_deref()
            .ok_or("--from is required for this command")?;
        let destination = self.destination.as_deref().unwrap_or(originator);
        Ok(RecipientKey::new(originator, self.name.as_str(), destination)?)
    }
}

#[derive(Subcommand)]
enum TopicsAction {
    /// Show the recipient's topics
    List,
    /// Add comma-separated topics
    Add { topics: String },
    /// Remove comma-separated topics
    Remove { topics: String },
    /// Replace the recipient's topics
    Set { topics: String },
    /// Remove every topic of the recipient
    Clear,
    /// Show desired topics, upstream snapshot and recipient count
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match BridgeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Publish {
            topics,
            kind,
            caption,
            preview,
            http,
            data,
        } => {
            let mut body = MessageBody::new(PayloadKind::from(kind), data);
            if let Some(caption) = caption {
                body = body.with_caption(caption);
            }
            if let Some(preview) = preview {
                body = body.with_preview(preview);
            }
            publish(&config, Envelope::publish(topics, body), http).await
        }
        Commands::Topics { key, action } => handle_topics(&config, &key, action),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn open_store(config: &BridgeConfig) -> Arc<dyn SubscriptionStore> {
    Arc::new(TopicStore::new(JsonFilePersistence::new(
        config.store.path.clone(),
        config.store.lock_timeout(),
    )))
}

async fn run_bridge(config: BridgeConfig) -> CliResult {
    info!("Starting hub2 v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config);
    let sink = TelegramSink::new(TelegramConfig {
        token: config.telegram_token()?,
        base_url: config.telegram.base_url.clone(),
        timeout: Duration::from_secs(config.telegram.timeout_secs),
    })?;
    let dispatcher = Dispatcher::new(store.clone(), Arc::new(sink));
    let connector = WsConnector::new(
        &config.hub.url,
        config.hub.connect_timeout(),
        config.hub.heartbeat(),
    )?;

    let manager = ConnectionManager::new(
        connector,
        store,
        dispatcher,
        Reconciler::new(config.hub.drift_threshold),
        ReconnectPolicy::new(config.hub.backoff()),
    );

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        let _ = shutdown_tx.send(true);
    });

    info!(hub = %config.hub.url, "Bridge running");
    manager.run(shutdown_rx).await;
    info!("Bridge shutdown complete");
    Ok(())
}

async fn publish(config: &BridgeConfig, envelope: Envelope, http: bool) -> CliResult {
    if http {
        let publisher = HttpPublisher::new(&config.hub.http_url, config.hub.connect_timeout())?;
        let reply = publisher.publish(&envelope).await?;
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    let connector = WsConnector::new(
        &config.hub.url,
        config.hub.connect_timeout(),
        config.hub.heartbeat(),
    )?;
    let mut link = connector.connect().await?;
    let sent = link.send_envelope(&envelope).await;
    link.close().await;
    sent?;
    info!(topics = ?envelope.topics, "Published");
    Ok(())
}

fn handle_topics(config: &BridgeConfig, key: &KeyArgs, action: TopicsAction) -> CliResult {
    let store = open_store(config);

    let topics = match action {
        TopicsAction::Status => {
            let desired = store.all_topics()?;
            let upstream = store.upstream_snapshot()?;
            let recipients = store.key_topics_map()?.len();
            println!("recipients: {recipients}");
            println!("desired:    {}", desired.join(", "));
            println!("upstream:   {}", upstream.join(", "));
            return Ok(());
        }
        TopicsAction::List => store.get_topics(&key.key()?)?,
        TopicsAction::Add { topics } => store.add_topics(&key.key()?, &parse_topic_list(&topics))?,
        TopicsAction::Remove { topics } => {
            store.remove_topics(&key.key()?, &parse_topic_list(&topics))?
        }
        TopicsAction::Set { topics } => store.set_topics(&key.key()?, &parse_topic_list(&topics))?,
        TopicsAction::Clear => store.clear_topics(&key.key()?)?,
    };

    if topics.is_empty() {
        println!("(no topics)");
    } else {
        println!("{}", topics.join(", "));
    }
    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> CliResult {
    info!("Configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
