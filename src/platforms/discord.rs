//! Discord adaptor.
//!
//! Reads one configured channel through the gateway and posts relays to it
//! over REST.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use parking_lot::Mutex;
use serenity::gateway::ShardManager;
use serenity::http::{Http, HttpBuilder};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::{AdaptorError, AdaptorResult, ConfigError, MessageEvent, Platform, ServerChangeEvent};
use crate::config::{DiscordConfig, Policy};
use crate::hub::{Adaptor, ChatLine, EventHub};
use crate::platforms::formatter::{split_message, PlatformFormatter};

/// Longest message Discord accepts.
pub const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an exponential backoff iterator for Discord reconnection.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(MAX_RECONNECT_DELAY)
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Gateway event handler feeding the hub.
struct RelayHandler {
    hub: Arc<EventHub>,
    channel_id: ChannelId,
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.channel_id != self.channel_id {
            return;
        }
        if msg.author.bot || msg.author.id == ctx.cache.current_user().id {
            return;
        }

        let author = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let Some(content) = relay_content(&msg.content, msg.attachments.iter().map(|a| a.url.as_str()))
        else {
            debug!("Empty Discord message from {}, not relayed", author);
            return;
        };

        self.hub
            .on_user_chat(MessageEvent::new(Platform::Discord, "", author, content));
    }
}

/// Message text with attachment URLs appended, or `None` if there is nothing to relay.
fn relay_content<'a>(content: &str, attachments: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut full_content = content.to_string();
    for url in attachments {
        if !full_content.is_empty() {
            full_content.push(' ');
        }
        full_content.push_str(url);
    }

    if full_content.trim().is_empty() {
        None
    } else {
        Some(full_content)
    }
}

fn parse_channel_id(raw: &str) -> Result<ChannelId, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(ChannelId::new)
        .ok_or_else(|| ConfigError::ValidationError {
            message: format!("discord.channelId '{}' is not a valid channel id", raw),
        })
}

/// REST client with timeouts, routed through the configured proxy if any.
///
/// Only REST requests use it; serenity opens the gateway websocket itself.
fn http_client(config: &DiscordConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT);
    if config.proxy.enable {
        let url = config.proxy.url();
        info!("Routing Discord requests through proxy {}", url);
        builder = builder.proxy(reqwest::Proxy::all(url)?);
    }
    builder.build()
}

fn build_http(token: &str, client: &reqwest::Client) -> Http {
    HttpBuilder::new(token).client(client.clone()).build()
}

async fn build_client(
    token: &str,
    client: &reqwest::Client,
    handler: RelayHandler,
) -> Result<Client, serenity::Error> {
    let intents =
        GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILDS;

    serenity::client::ClientBuilder::new_with_http(build_http(token, client), intents)
        .event_handler(handler)
        .await
}

pub struct DiscordAdaptor {
    token: String,
    channel_id: ChannelId,
    client: reqwest::Client,
    http: Arc<Http>,
    formatter: PlatformFormatter,
    shard_manager: Arc<Mutex<Option<Arc<ShardManager>>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl DiscordAdaptor {
    pub fn new(config: &DiscordConfig, policy: Arc<Policy>) -> AdaptorResult<Self> {
        let channel_id = parse_channel_id(&config.channel_id)?;
        let client = http_client(config)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            token: config.token.clone(),
            channel_id,
            http: Arc::new(build_http(&config.token, &client)),
            client,
            formatter: PlatformFormatter::new(Platform::Discord, policy),
            shard_manager: Arc::new(Mutex::new(None)),
            shutdown_tx,
        })
    }

    async fn send(&self, text: String) {
        for chunk in split_message(&text, DISCORD_MAX_MESSAGE_LENGTH) {
            if let Err(e) = self.channel_id.say(&self.http, chunk).await {
                error!(channel = %self.channel_id, "Failed to send message to Discord: {}", e);
                return;
            }
        }
    }
}

#[async_trait]
impl Adaptor for DiscordAdaptor {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn start(&self, hub: Arc<EventHub>) -> AdaptorResult<()> {
        let handler = RelayHandler {
            hub: Arc::clone(&hub),
            channel_id: self.channel_id,
        };
        let client = build_client(&self.token, &self.client, handler)
            .await
            .map_err(AdaptorError::Discord)?;

        tokio::spawn(run_connection(
            Some(client),
            self.token.clone(),
            self.client.clone(),
            hub,
            self.channel_id,
            Arc::clone(&self.shard_manager),
            self.shutdown_tx.subscribe(),
        ));
        Ok(())
    }

    async fn send_public_message(&self, text: &str) {
        self.send(text.to_string()).await;
    }

    async fn on_user_chat(&self, line: &ChatLine) {
        self.send(self.formatter.format_user_chat(line)).await;
    }

    async fn on_join_server(&self, event: &ServerChangeEvent) {
        self.send(self.formatter.format_join(event)).await;
    }

    async fn on_leave_server(&self, event: &ServerChangeEvent) {
        self.send(self.formatter.format_leave(event)).await;
    }

    async fn on_switch_server(&self, event: &ServerChangeEvent) {
        self.send(self.formatter.format_switch(event)).await;
    }

    async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let manager = self.shard_manager.lock().take();
        if let Some(manager) = manager {
            info!("Initiating graceful Discord shutdown...");
            manager.shutdown_all().await;
            info!("Discord shutdown complete");
        }
    }
}

/// Keep a gateway connection up until shutdown.
///
/// serenity resumes dropped sessions itself; this loop only rebuilds the
/// client after `start` gives up.
async fn run_connection(
    mut client: Option<Client>,
    token: String,
    http_client: reqwest::Client,
    hub: Arc<EventHub>,
    channel_id: ChannelId,
    shard_slot: Arc<Mutex<Option<Arc<ShardManager>>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = discord_backoff();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        info!("Connecting to Discord...");

        let mut current = match client.take() {
            Some(current) => current,
            None => {
                let handler = RelayHandler {
                    hub: Arc::clone(&hub),
                    channel_id,
                };
                match build_client(&token, &http_client, handler).await {
                    Ok(current) => {
                        backoff = discord_backoff();
                        current
                    }
                    Err(e) => {
                        error!("Failed to rebuild Discord client: {}", e);
                        let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                        warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                        if wait_or_shutdown(delay, &mut shutdown_rx).await {
                            break;
                        }
                        continue;
                    }
                }
            }
        };

        let manager = Arc::clone(&current.shard_manager);
        *shard_slot.lock() = Some(Arc::clone(&manager));

        tokio::select! {
            result = current.start() => match result {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    break;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    if wait_or_shutdown(delay, &mut shutdown_rx).await {
                        break;
                    }
                }
            },

            _ = shutdown_rx.changed() => {
                manager.shutdown_all().await;
                break;
            }
        }
    }
    info!("Discord task ended");
}

/// Sleep for `delay`. Returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(delay) => *shutdown_rx.borrow(),
        _ = shutdown_rx.changed() => true,
    }
}
