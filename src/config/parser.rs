//! Configuration file parsing (TOML format).

use std::fs;
use std::path::Path;

use tracing::info;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Configuration written on first start when no file exists.
pub const DEFAULT_CONFIG: &str = include_str!("../../resources/config.toml");

/// Load configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;

    load_config_str(&content)
}

/// Load configuration from a TOML string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write the bundled default configuration if `path` does not exist yet.
///
/// Returns `true` when a new file was created.
pub fn ensure_config_file(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }

    let io_error = |source| ConfigError::IoError {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, DEFAULT_CONFIG).map_err(io_error)?;

    info!("Wrote default configuration to {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Platform;
    use crate::config::types::MessageType;

    #[test]
    fn test_default_config_parses() {
        let config = load_config_str(DEFAULT_CONFIG).unwrap();
        assert!(config.minecraft.enable);
        assert!(!config.discord.enable);
        assert_eq!(config.core.queue_capacity, 256);
        assert_eq!(config.minecraft.ignore_chat_message_re, vec!["^/"]);
        assert_eq!(config.qq.api.ws_reverse_port, Some(8080));
        assert!(!config.discord.proxy.enable);
        assert_eq!(config.discord.proxy.url(), "http://127.0.0.1:7890");
    }

    #[test]
    fn test_camel_case_keys() {
        let config = load_config_str(
            r#"
            [servername]
            lobby = "Lobby"

            [minecraft]
            completeTakeoverMode = true
            ignoreChatMessageRe = ["^!", "spam"]

            [discord.message]
            userChat = "<%user> %message"
            "#,
        )
        .unwrap();

        assert!(config.minecraft.complete_takeover_mode);
        assert_eq!(config.minecraft.ignore_chat_message_re.len(), 2);
        assert_eq!(config.servername.get("lobby").map(String::as_str), Some("Lobby"));
        assert_eq!(
            config.templates(Platform::Discord).get(MessageType::UserChat),
            Some("<%user> %message")
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = load_config_str("").unwrap();
        assert!(config.is_platform_enabled(Platform::Minecraft));
        assert!(!config.is_platform_enabled(Platform::Discord));
        assert_eq!(config.minecraft.link.listen, "127.0.0.1:25580");
    }

    #[test]
    fn test_malformed_config_is_parse_error() {
        let result = load_config_str("[minecraft\nenable = ");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_ensure_config_file_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(ensure_config_file(&path).unwrap());
        assert!(!ensure_config_file(&path).unwrap());

        let config = load_config(&path).unwrap();
        assert!(config.minecraft.enable);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
