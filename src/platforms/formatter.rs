//! Message formatting for display.
//!
//! Each platform renders relayed events from a template keyed by message
//! type. Supported placeholders: %time, %server, %user, %message, %player,
//! %from, %to.

use std::sync::Arc;

use chrono::Local;

use crate::common::{Platform, ServerChangeEvent};
use crate::config::{MessageType, Policy};
use crate::hub::ChatLine;

/// Default format for relayed chat.
pub const DEFAULT_USER_CHAT_FORMAT: &str = "[%server] <%user> %message";

/// Default format for a player joining a sub-server.
pub const DEFAULT_JOIN_SERVER_FORMAT: &str = "%player joined %server";

/// Default format for a player leaving the proxy.
pub const DEFAULT_LEAVE_SERVER_FORMAT: &str = "%player left the game";

/// Default format for a player moving between sub-servers.
pub const DEFAULT_SWITCH_SERVER_FORMAT: &str = "%player: %from -> %to";

const PLACEHOLDERS: [&str; 7] = ["time", "server", "user", "message", "player", "from", "to"];

/// Default template for a message type.
pub fn default_format(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::UserChat => DEFAULT_USER_CHAT_FORMAT,
        MessageType::JoinServer => DEFAULT_JOIN_SERVER_FORMAT,
        MessageType::LeaveServer => DEFAULT_LEAVE_SERVER_FORMAT,
        MessageType::SwitchServer => DEFAULT_SWITCH_SERVER_FORMAT,
    }
}

/// Message formatter that substitutes placeholders in a format string.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    format: String,
}

impl MessageFormatter {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    /// Format with the given context.
    ///
    /// Substitution is a single pass over the template, so placeholder-like
    /// text inside substituted values is left alone. Unknown placeholders
    /// are kept verbatim.
    pub fn format(&self, ctx: &FormatContext) -> String {
        let mut out = String::with_capacity(self.format.len() + ctx.message.len());
        let mut rest = self.format.as_str();

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            match PLACEHOLDERS.iter().find(|name| after.starts_with(*name)) {
                Some(name) => {
                    out.push_str(&ctx.value(name));
                    rest = &after[name.len()..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Values for placeholder substitution.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    pub server: String,
    pub user: String,
    pub message: String,
    pub player: String,
    pub from: String,
    pub to: String,
}

impl FormatContext {
    pub fn chat(server: impl Into<String>, user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn player(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            ..Default::default()
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_move(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = from.into();
        self.to = to.into();
        self
    }

    fn value(&self, placeholder: &str) -> String {
        match placeholder {
            "time" => get_time(),
            "server" => self.server.clone(),
            "user" => self.user.clone(),
            "message" => self.message.clone(),
            "player" => self.player.clone(),
            "from" => self.from.clone(),
            "to" => self.to.clone(),
            _ => String::new(),
        }
    }
}

/// Get the current time as HH:MM:SS string.
fn get_time() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Renders hub events with one platform's templates.
#[derive(Debug, Clone)]
pub struct PlatformFormatter {
    platform: Platform,
    policy: Arc<Policy>,
}

impl PlatformFormatter {
    pub fn new(platform: Platform, policy: Arc<Policy>) -> Self {
        Self { platform, policy }
    }

    fn formatter(&self, message_type: MessageType) -> MessageFormatter {
        self.policy
            .message_template(self.platform, message_type)
            .map(MessageFormatter::new)
            .unwrap_or_else(|| MessageFormatter::new(default_format(message_type)))
    }

    /// Label for the origin of a chat line.
    ///
    /// Platforms without sub-servers are labelled with the platform name.
    fn origin_label(&self, line: &ChatLine) -> String {
        if line.server.is_empty() {
            line.platform.name().to_string()
        } else {
            self.policy.servername(&line.server)
        }
    }

    pub fn format_user_chat(&self, line: &ChatLine) -> String {
        let ctx = FormatContext::chat(self.origin_label(line), &line.user, &line.text);
        self.formatter(MessageType::UserChat).format(&ctx)
    }

    pub fn format_join(&self, event: &ServerChangeEvent) -> String {
        let ctx = FormatContext::player(&event.player).with_server(self.policy.servername(&event.server));
        self.formatter(MessageType::JoinServer).format(&ctx)
    }

    pub fn format_leave(&self, event: &ServerChangeEvent) -> String {
        let ctx = FormatContext::player(&event.player);
        self.formatter(MessageType::LeaveServer).format(&ctx)
    }

    pub fn format_switch(&self, event: &ServerChangeEvent) -> String {
        let from = event
            .server_prev
            .as_deref()
            .map(|s| self.policy.servername(s))
            .unwrap_or_default();
        let to = self.policy.servername(&event.server);
        let ctx = FormatContext::player(&event.player)
            .with_server(to.clone())
            .with_move(from, to);
        self.formatter(MessageType::SwitchServer).format(&ctx)
    }
}

/// Find the last UTF-8 char boundary at or before `byte_index` in `s`.
fn floor_char_boundary(s: &str, byte_index: usize) -> usize {
    if byte_index >= s.len() {
        return s.len();
    }
    let mut i = byte_index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a message into chunks of at most `max_len` bytes.
///
/// Prefers word boundaries and never splits inside a UTF-8 character.
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        remaining = remaining.trim_start();
        if remaining.is_empty() {
            break;
        }

        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = floor_char_boundary(remaining, max_len);

        // A limit smaller than the first character still has to make progress.
        if split_at == 0 {
            let first_char_end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
            chunks.push(remaining[..first_char_end].to_string());
            remaining = &remaining[first_char_end..];
            continue;
        }

        let chunk = &remaining[..split_at];
        match chunk.rfind(' ') {
            Some(space_idx) if space_idx > 0 => {
                chunks.push(remaining[..space_idx].to_string());
                remaining = &remaining[space_idx + 1..];
            }
            _ => {
                chunks.push(chunk.to_string());
                remaining = &remaining[split_at..];
            }
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hub::ServerScope;

    fn formatter(platform: Platform, config: &Config) -> PlatformFormatter {
        PlatformFormatter::new(platform, Arc::new(Policy::from_config(config)))
    }

    fn line(platform: Platform, server: &str, text: &str) -> ChatLine {
        ChatLine {
            platform,
            server: server.to_string(),
            user: "alice".to_string(),
            text: text.to_string(),
            scope: ServerScope::All,
        }
    }

    #[test]
    fn test_basic_format() {
        let formatter = MessageFormatter::new("[%user]: %message");
        let ctx = FormatContext::chat("lobby", "Player", "Hello world!");

        assert_eq!(formatter.format(&ctx), "[Player]: Hello world!");
    }

    #[test]
    fn test_substituted_values_not_expanded() {
        let formatter = MessageFormatter::new("<%user> %message");
        let ctx = FormatContext::chat("lobby", "%message", "costs 5%user");

        assert_eq!(formatter.format(&ctx), "<%message> costs 5%user");
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let formatter = MessageFormatter::new("100% %rank %player");
        let ctx = FormatContext::player("Steve");

        assert_eq!(formatter.format(&ctx), "100% %rank Steve");
    }

    #[test]
    fn test_format_with_time() {
        let formatter = MessageFormatter::new("[%time] %user: %message");
        let result = formatter.format(&FormatContext::chat("", "Player", "Test"));

        assert!(result.ends_with("Player: Test"));
        // [HH:MM:SS]
        assert_eq!(result.find(']'), Some(9));
    }

    #[test]
    fn test_default_templates_used_when_absent() {
        let f = formatter(Platform::Discord, &Config::default());

        assert_eq!(
            f.format_user_chat(&line(Platform::Minecraft, "lobby", "hi")),
            "[lobby] <alice> hi"
        );
        assert_eq!(
            f.format_leave(&ServerChangeEvent::leave(Platform::Minecraft, "Steve")),
            "Steve left the game"
        );
    }

    #[test]
    fn test_platform_name_labels_serverless_origin() {
        let f = formatter(Platform::Minecraft, &Config::default());

        assert_eq!(
            f.format_user_chat(&line(Platform::Discord, "", "hi")),
            "[Discord] <alice> hi"
        );
    }

    #[test]
    fn test_configured_template_and_servername() {
        let mut config = Config::default();
        config.servername.insert("lobby".to_string(), "Lobby".to_string());
        config.discord.message.switch_server = Some("%player moved %from => %to".to_string());
        config.discord.message.join_server = Some("+ %player @ %server".to_string());
        let f = formatter(Platform::Discord, &config);

        let switch = ServerChangeEvent::switch(Platform::Minecraft, "Steve", "lobby", "arena");
        assert_eq!(f.format_switch(&switch), "Steve moved Lobby => arena");

        let join = ServerChangeEvent::join(Platform::Minecraft, "Steve", "lobby");
        assert_eq!(f.format_join(&join), "+ Steve @ Lobby");
    }

    #[test]
    fn test_split_message_short() {
        let chunks = split_message("Hello world", 50);
        assert_eq!(chunks, vec!["Hello world"]);
    }

    #[test]
    fn test_split_message_on_space() {
        let chunks = split_message("Hello beautiful world", 15);
        assert_eq!(chunks, vec!["Hello", "beautiful world"]);
    }

    #[test]
    fn test_split_message_no_space() {
        let chunks = split_message("HelloBeautifulWorld", 10);
        assert_eq!(chunks, vec!["HelloBeaut", "ifulWorld"]);
    }

    #[test]
    fn test_split_message_multibyte_utf8() {
        // 'é' is 2 bytes; a limit of 4 lands inside it.
        let chunks = split_message("café rest", 4);
        assert_eq!(chunks, vec!["caf", "é", "rest"]);
    }

    #[test]
    fn test_split_message_all_multibyte() {
        let chunks = split_message("ééé", 3);
        assert_eq!(chunks, vec!["é", "é", "é"]);
    }

    #[test]
    fn test_split_message_discord_limit() {
        let message = "word ".repeat(600);
        let chunks = split_message(message.trim_end(), 2000);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 2000));
        assert_eq!(chunks.join(" "), message.trim_end());
    }
}
