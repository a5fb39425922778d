use clap::{Parser, Subcommand};
use relay::backend::MemoryBackend;
use relay::dispatch::Dispatcher;
use relay::msg::{MsgId, OutgoingMessage};
use relay::urn::Urn;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay messaging gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (provider webhooks, /send and health on one port).
    Gateway {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// List registered handlers and configured channels.
    Channels {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Send one message through a configured channel and print the resulting status.
    Send {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Channel uuid (must be listed in the config)
        #[arg(long, value_name = "UUID")]
        channel: uuid::Uuid,

        /// Recipient URN, e.g. tel:+12065550100
        #[arg(long)]
        urn: String,

        /// Backend message id reported in the resulting status
        #[arg(long, value_name = "ID", default_value_t = 1)]
        msg_id: i64,

        /// Attachment as content-type:url (repeatable)
        #[arg(long, value_name = "ATTACHMENT")]
        attachment: Vec<String>,

        /// Message text
        text: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Channels { config }) => {
            if let Err(e) = run_channels(config) {
                log::error!("channels failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send {
            config,
            channel,
            urn,
            msg_id,
            attachment,
            text,
        }) => {
            if let Err(e) = run_send(config, channel, urn, MsgId(msg_id), attachment, text).await {
                log::error!("send failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    relay::gateway::run_gateway(config).await
}

fn run_channels(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = relay::config::load_config(config_path)?;
    let registry = relay::registry::global();
    println!("handlers:");
    for code in registry.channel_types() {
        let handler = registry.get(code.as_str())?;
        println!("  {:<6} {}", code, handler.name());
    }
    println!("channels:");
    if config.channels.is_empty() {
        println!("  (none configured)");
    }
    for ch in &config.channels {
        let known = if registry.get(ch.channel_type.as_str()).is_ok() {
            ""
        } else {
            " (no handler)"
        };
        println!("  {} {:<6} {}{}", ch.uuid, ch.channel_type, ch.name, known);
    }
    Ok(())
}

async fn run_send(
    config_path: Option<PathBuf>,
    channel_uuid: uuid::Uuid,
    urn: String,
    msg_id: MsgId,
    attachments: Vec<String>,
    text: String,
) -> anyhow::Result<()> {
    let (config, path) = relay::config::load_config(config_path)?;
    let channel = config
        .channels
        .iter()
        .find(|c| c.uuid == channel_uuid)
        .ok_or_else(|| anyhow::anyhow!("channel {} not found in {}", channel_uuid, path.display()))?;
    let channel_type = channel.channel_type.clone();

    let urn: Urn = urn.parse()?;
    let mut builder = OutgoingMessage::builder(msg_id, channel_uuid, urn).text(text);
    for a in &attachments {
        builder = builder.attachment(a);
    }
    let msg = builder.build();

    let backend = Arc::new(MemoryBackend::new(config.channels.iter().cloned()));
    let dispatcher = Dispatcher::new(
        relay::registry::global(),
        backend,
        relay::config::resolve_send_timeout(&config),
    );
    let update = dispatcher
        .send(&dispatcher.send_context(), channel_type.as_str(), &msg)
        .await?;
    println!("{}", serde_json::to_string_pretty(&update)?);
    Ok(())
}
