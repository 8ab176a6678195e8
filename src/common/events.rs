//! Event values exchanged between platform adaptors and the hub.
//!
//! Events are built by a platform binding when it observes local activity
//! and are handed to the hub by value. Nothing mutates them afterwards.

use std::fmt;

/// Platforms the hub can relay between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// The game-server proxy. Its chat is split across sub-servers.
    Minecraft,
    Discord,
    Kook,
    Qq,
}

impl Platform {
    /// Every platform, in registration order.
    pub const ALL: [Platform; 4] = [
        Platform::Minecraft,
        Platform::Discord,
        Platform::Kook,
        Platform::Qq,
    ];

    /// Human readable name used in logs and as the fallback server label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minecraft => "Minecraft",
            Self::Discord => "Discord",
            Self::Kook => "KOOK",
            Self::Qq => "QQ",
        }
    }

    /// Table name of this platform in the config file.
    pub fn config_namespace(&self) -> &'static str {
        match self {
            Self::Minecraft => "minecraft",
            Self::Discord => "discord",
            Self::Kook => "kook",
            Self::Qq => "qq",
        }
    }

    /// Whether this is the proxy platform with internal sub-servers.
    ///
    /// Exactly one platform answers `true`; the hub's takeover rule relies on it.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Minecraft)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A chat message observed on one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Platform the message originated on.
    pub platform: Platform,
    /// Origin sub-server. Empty for platforms without sub-servers.
    pub server: String,
    /// Display name of the author.
    pub user: String,
    /// Raw text, possibly spanning several lines.
    pub content: String,
}

impl MessageEvent {
    pub fn new(
        platform: Platform,
        server: impl Into<String>,
        user: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            server: server.into(),
            user: user.into(),
            content: content.into(),
        }
    }

    /// Lines of the content that carry text, in order.
    ///
    /// Splits on `\n`, strips a trailing `\r` and skips blank lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
    }
}

/// Kind of a proxy connection transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerChangeKind {
    Join,
    Leave,
    Switch,
}

/// A player joining, leaving or moving between sub-servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChangeEvent {
    pub kind: ServerChangeKind,
    /// Platform that observed the transition.
    pub platform: Platform,
    /// Player name.
    pub player: String,
    /// Destination sub-server. Empty for [`ServerChangeKind::Leave`].
    pub server: String,
    /// Sub-server the player came from. Only set for [`ServerChangeKind::Switch`].
    pub server_prev: Option<String>,
}

impl ServerChangeEvent {
    pub fn join(platform: Platform, player: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            kind: ServerChangeKind::Join,
            platform,
            player: player.into(),
            server: server.into(),
            server_prev: None,
        }
    }

    pub fn leave(platform: Platform, player: impl Into<String>) -> Self {
        Self {
            kind: ServerChangeKind::Leave,
            platform,
            player: player.into(),
            server: String::new(),
            server_prev: None,
        }
    }

    pub fn switch(
        platform: Platform,
        player: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            kind: ServerChangeKind::Switch,
            platform,
            player: player.into(),
            server: to.into(),
            server_prev: Some(from.into()),
        }
    }
}
