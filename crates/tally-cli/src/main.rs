use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tally_common::{APP_NAME, BotConfig, DeliveryMode, logging};
use tally_sync::{NotificationSuppressor, TitleSynchronizer, UpdateSource};
use tally_telegram::TelegramGateway;

const REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Parser)]
#[command(name = "tally", about = "Channel member-count title bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the bot: title synchronizer plus notification suppressor.
    Run,
    /// Validate the bot token and resolve the configured channel.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Run) => run(),
        Some(Command::Status) => status(),
        None => {
            println!("{APP_NAME} keeps a channel title in step with its member count.");
            println!("Run `tally run` to start the bot or `tally status` to validate the setup.");
            Ok(())
        }
    }
}

fn run() -> Result<()> {
    let config = BotConfig::from_env().with_context(|| "invalid configuration")?;
    logging::init(config.debug);

    let gateway = TelegramGateway::new(&config.token, REQUEST_TIMEOUT_MS)?;

    let chat = gateway
        .get_chat(config.channel_id)
        .with_context(|| format!("cannot resolve channel {}", config.channel_id))?;
    tracing::info!(
        channel = chat.username.as_deref().unwrap_or("<private>"),
        title = chat.title.as_deref().unwrap_or(""),
        "resolved channel"
    );

    let synchronizer = TitleSynchronizer::new(
        gateway.clone(),
        config.channel_id,
        config.title_prefix.clone(),
        config.poll_interval,
    );
    thread::Builder::new()
        .name("title-sync".to_string())
        .spawn(move || synchronizer.run())
        .with_context(|| "failed to spawn title synchronizer")?;

    let source = match config.delivery {
        DeliveryMode::Webhook => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| anyhow!("webhook mode requires a public base url"))?;
            let channel = tally_webhook::start(&gateway, &base_url, &config.listen_addr)?;
            UpdateSource::webhook(channel.updates, channel.keepalive)
        }
        DeliveryMode::LongPolling => {
            UpdateSource::long_polling(gateway.clone(), config.poll_timeout_secs())
        }
    };
    tracing::info!(mode = config.delivery.as_str(), "consuming channel updates");

    NotificationSuppressor::new(gateway).run(source);
    Ok(())
}

fn status() -> Result<()> {
    let config = BotConfig::from_env().with_context(|| "invalid configuration")?;
    logging::init(config.debug);

    let gateway = TelegramGateway::new(&config.token, REQUEST_TIMEOUT_MS)?;
    let me = gateway.get_me()?;
    let chat = gateway.get_chat(config.channel_id)?;

    println!("bot: {} ({})", me.username, me.id);
    println!(
        "channel: {}",
        chat.username.clone().unwrap_or_else(|| chat.id.to_string())
    );
    println!("title: {}", chat.title.unwrap_or_default());
    println!("delivery: {}", config.delivery.as_str());
    println!("interval_ms: {}", config.poll_interval.as_millis());
    Ok(())
}
