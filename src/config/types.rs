//! Configuration type definitions.

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::Platform;

/// Default capacity of each adaptor's relay queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default address the proxy plugin connects to.
pub const DEFAULT_LINK_LISTEN: &str = "127.0.0.1:25580";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    /// Display name overrides keyed by sub-server id.
    #[serde(default)]
    pub servername: HashMap<String, String>,
    #[serde(default)]
    pub minecraft: MinecraftConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub kook: KookConfig,
    #[serde(default)]
    pub qq: QqConfig,
}

impl Config {
    /// Whether the `enable` flag of a platform is set.
    pub fn is_platform_enabled(&self, platform: Platform) -> bool {
        match platform {
            Platform::Minecraft => self.minecraft.enable,
            Platform::Discord => self.discord.enable,
            Platform::Kook => self.kook.enable,
            Platform::Qq => self.qq.enable,
        }
    }

    /// Message templates configured for a platform.
    pub fn templates(&self, platform: Platform) -> &MessageTemplates {
        match platform {
            Platform::Minecraft => &self.minecraft.message,
            Platform::Discord => &self.discord.message,
            Platform::Kook => &self.kook.message,
            Platform::Qq => &self.qq.message,
        }
    }
}

/// Hub-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Capacity of each adaptor's relay queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_true() -> bool {
    true
}

/// Proxy platform settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Suppress native proxy chat and let the hub deliver it everywhere.
    #[serde(default)]
    pub complete_takeover_mode: bool,
    /// Chat lines matching any of these patterns are never relayed.
    #[serde(default)]
    pub ignore_chat_message_re: Vec<String>,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub message: MessageTemplates,
}

impl Default for MinecraftConfig {
    fn default() -> Self {
        Self {
            enable: true,
            complete_takeover_mode: false,
            ignore_chat_message_re: Vec::new(),
            link: LinkConfig::default(),
            message: MessageTemplates::default(),
        }
    }
}

/// Socket the proxy plugin connects to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    #[serde(default = "default_link_listen")]
    pub listen: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            listen: default_link_listen(),
        }
    }
}

fn default_link_listen() -> String {
    DEFAULT_LINK_LISTEN.to_string()
}

/// Discord bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub token: String,
    /// Channel the bridge reads from and posts to.
    #[serde(default)]
    pub channel_id: String,
    /// HTTP proxy for Discord REST requests.
    #[serde(default)]
    pub proxy: DiscordProxyConfig,
    #[serde(default)]
    pub message: MessageTemplates,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordProxyConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub proxy_host: String,
    #[serde(default)]
    pub proxy_port: u16,
}

impl DiscordProxyConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.proxy_host, self.proxy_port)
    }
}

/// KOOK bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KookConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub message: MessageTemplates,
}

/// QQ (OneBot) configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QqConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub api: QqApiConfig,
    #[serde(default)]
    pub message: MessageTemplates,
}

/// OneBot endpoint settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QqApiConfig {
    #[serde(default)]
    pub host: String,
    pub ws_reverse_port: Option<u16>,
}

/// Kinds of text an adaptor renders from a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    UserChat,
    JoinServer,
    LeaveServer,
    SwitchServer,
}

/// Per-platform format templates (`<platform>.message.<messageType>`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplates {
    pub user_chat: Option<String>,
    pub join_server: Option<String>,
    pub leave_server: Option<String>,
    pub switch_server: Option<String>,
}

impl MessageTemplates {
    /// Template for a message type, if one is configured and non-empty.
    pub fn get(&self, message_type: MessageType) -> Option<&str> {
        let template = match message_type {
            MessageType::UserChat => &self.user_chat,
            MessageType::JoinServer => &self.join_server,
            MessageType::LeaveServer => &self.leave_server,
            MessageType::SwitchServer => &self.switch_server,
        };
        template.as_deref().filter(|t| !t.is_empty())
    }
}
