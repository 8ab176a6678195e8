//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `CHATHUB_DISCORD_TOKEN` - Discord bot token
//! - `CHATHUB_DISCORD_CHANNEL_ID` - Discord channel to bridge
//! - `CHATHUB_MINECRAFT_LINK_LISTEN` - Address the proxy plugin connects to
//! - `CHATHUB_MINECRAFT_TAKEOVER` - `true`/`false` for complete takeover mode

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "CHATHUB";

/// Apply environment variable overrides to a config.
///
/// This allows secrets like the bot token to be provided via
/// environment variables instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }
    if let Ok(channel_id) = env::var(format!("{}_DISCORD_CHANNEL_ID", ENV_PREFIX)) {
        config.discord.channel_id = channel_id;
    }

    if let Ok(listen) = env::var(format!("{}_MINECRAFT_LINK_LISTEN", ENV_PREFIX)) {
        config.minecraft.link.listen = listen;
    }
    if let Ok(takeover) = env::var(format!("{}_MINECRAFT_TAKEOVER", ENV_PREFIX)) {
        if let Ok(takeover) = takeover.parse() {
            config.minecraft.complete_takeover_mode = takeover;
        }
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `CHATHUB_CONFIG` environment variable, otherwise returns "config.toml".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "config.toml".to_string())
}
