//! Configuration validation.
//!
//! Hub-wide settings are validated once and are fatal on error. Platform
//! sections are validated one at a time so a broken section only disables
//! that platform.

use std::net::SocketAddr;

use crate::common::error::ConfigError;
use crate::common::Platform;
use crate::config::types::Config;

const TOKEN_PLACEHOLDER: &str = "YOUR_DISCORD_TOKEN_HERE";

/// Validate hub-wide settings.
pub fn validate_core(config: &Config) -> Result<(), ConfigError> {
    if config.core.queue_capacity == 0 {
        return Err(ConfigError::ValidationError {
            message: "core.queueCapacity must be non-zero".to_string(),
        });
    }
    Ok(())
}

/// Validate the section of one platform and return every problem found.
pub fn validate_platform(config: &Config, platform: Platform) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    match platform {
        Platform::Minecraft => {
            let listen = &config.minecraft.link.listen;
            if listen.parse::<SocketAddr>().is_err() {
                errors.push(format!(
                    "minecraft.link.listen '{}' is not a socket address",
                    listen
                ));
            }
        }
        Platform::Discord => {
            let discord = &config.discord;
            if discord.token.is_empty() {
                errors.push("discord.token is required".to_string());
            }
            if discord.token == TOKEN_PLACEHOLDER {
                errors.push("discord.token has not been configured (still using placeholder)".to_string());
            }
            match discord.channel_id.parse::<u64>() {
                Ok(0) => errors.push("discord.channelId must be non-zero".to_string()),
                Ok(_) => {}
                Err(_) => errors.push(format!(
                    "discord.channelId '{}' is not a numeric channel id",
                    discord.channel_id
                )),
            }
            if discord.proxy.enable {
                if discord.proxy.proxy_host.is_empty() {
                    errors.push("discord.proxy.proxyHost is required when the proxy is enabled".to_string());
                }
                if discord.proxy.proxy_port == 0 {
                    errors.push("discord.proxy.proxyPort must be non-zero".to_string());
                }
            }
        }
        Platform::Kook => {
            if config.kook.token.is_empty() {
                errors.push("kook.token is required".to_string());
            }
            if config.kook.channel_id.is_empty() {
                errors.push("kook.channelId is required".to_string());
            }
        }
        Platform::Qq => {
            if config.qq.group_id.is_empty() {
                errors.push("qq.groupId is required".to_string());
            }
            if config.qq.api.host.is_empty() {
                errors.push("qq.api.host is required".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
