//! Relay policy: ignore patterns, takeover mode and platform switches.
//!
//! The policy is read on every dispatch and written only on reload or when a
//! platform is switched off at runtime. Readers take an `Arc` to the current
//! immutable [`PolicySnapshot`]; writers build a new snapshot and swap it in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fancy_regex::Regex;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::common::Platform;
use crate::config::types::{Config, MessageType};

/// A compiled regex pattern with its original string for debugging.
#[derive(Debug, Clone)]
struct CompiledPattern {
    original: String,
    regex: Regex,
}

/// Immutable view of the policy at one point in time.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    ignore_patterns: Vec<CompiledPattern>,
    complete_takeover: bool,
    enabled: HashSet<Platform>,
    servernames: HashMap<String, String>,
    templates: HashMap<(Platform, MessageType), String>,
}

impl PolicySnapshot {
    /// Build a snapshot from configuration.
    ///
    /// Empty or invalid ignore patterns are logged and skipped.
    pub fn from_config(config: &Config) -> Self {
        let enabled = Platform::ALL
            .into_iter()
            .filter(|p| config.is_platform_enabled(*p))
            .collect();

        let mut templates = HashMap::new();
        for platform in Platform::ALL {
            for message_type in [
                MessageType::UserChat,
                MessageType::JoinServer,
                MessageType::LeaveServer,
                MessageType::SwitchServer,
            ] {
                if let Some(template) = config.templates(platform).get(message_type) {
                    templates.insert((platform, message_type), template.to_string());
                }
            }
        }

        Self {
            ignore_patterns: compile_patterns(&config.minecraft.ignore_chat_message_re),
            complete_takeover: config.minecraft.complete_takeover_mode,
            enabled,
            servernames: config.servername.clone(),
            templates,
        }
    }

    /// Returns `true` if any ignore pattern matches somewhere in `line`.
    pub fn is_ignored(&self, line: &str) -> bool {
        self.ignore_patterns.iter().any(|p| {
            p.regex.is_match(line).unwrap_or_else(|e| {
                warn!("Regex match error for pattern '{}': {}", p.original, e);
                false
            })
        })
    }

    pub fn is_complete_takeover(&self) -> bool {
        self.complete_takeover
    }

    pub fn is_platform_enabled(&self, platform: Platform) -> bool {
        self.enabled.contains(&platform)
    }

    /// Display name of a sub-server, falling back to its id.
    pub fn servername(&self, server: &str) -> String {
        self.servernames
            .get(server)
            .cloned()
            .unwrap_or_else(|| server.to_string())
    }

    /// Configured template for a platform and message type.
    pub fn message_template(&self, platform: Platform, message_type: MessageType) -> Option<&str> {
        self.templates
            .get(&(platform, message_type))
            .map(String::as_str)
    }

    /// Number of ignore patterns that compiled.
    pub fn ignore_pattern_count(&self) -> usize {
        self.ignore_patterns.len()
    }
}

/// Process-wide policy shared by the hub and the adaptors.
#[derive(Debug)]
pub struct Policy {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl Policy {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(PolicySnapshot::from_config(config))
    }

    /// The current snapshot. Hold it for the duration of one decision.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn is_ignored(&self, line: &str) -> bool {
        self.snapshot().is_ignored(line)
    }

    pub fn is_complete_takeover(&self) -> bool {
        self.snapshot().is_complete_takeover()
    }

    pub fn is_platform_enabled(&self, platform: Platform) -> bool {
        self.snapshot().is_platform_enabled(platform)
    }

    pub fn servername(&self, server: &str) -> String {
        self.snapshot().servername(server)
    }

    pub fn message_template(&self, platform: Platform, message_type: MessageType) -> Option<String> {
        self.snapshot()
            .message_template(platform, message_type)
            .map(String::from)
    }

    /// Replace the policy with one built from `config`.
    ///
    /// A platform switched off at runtime stays off: its adaptor is not
    /// running and a reload does not restart it.
    pub fn reload(&self, config: &Config) {
        let mut snapshot = PolicySnapshot::from_config(config);
        let mut current = self.current.write();
        snapshot.enabled.retain(|p| current.enabled.contains(p));
        info!(
            ignore_patterns = snapshot.ignore_pattern_count(),
            complete_takeover = snapshot.complete_takeover,
            "Policy reloaded"
        );
        *current = Arc::new(snapshot);
    }

    /// Switch a platform on or off.
    pub fn set_platform_enabled(&self, platform: Platform, enabled: bool) {
        self.update(|snapshot| {
            if enabled {
                snapshot.enabled.insert(platform);
            } else {
                snapshot.enabled.remove(&platform);
            }
        });
    }

    fn update(&self, change: impl FnOnce(&mut PolicySnapshot)) {
        let mut current = self.current.write();
        let mut next = PolicySnapshot::clone(&current);
        change(&mut next);
        *current = Arc::new(next);
    }
}

/// Compile a list of regex pattern strings, skipping empty and invalid ones.
fn compile_patterns(patterns: &[String]) -> Vec<CompiledPattern> {
    patterns
        .iter()
        .filter_map(|pattern| {
            if pattern.is_empty() {
                warn!("Ignore chat regex is empty and will be skipped");
                return None;
            }
            match Regex::new(pattern) {
                Ok(regex) => Some(CompiledPattern {
                    original: pattern.clone(),
                    regex,
                }),
                Err(e) => {
                    warn!("Ignore chat regex '{}' is invalid and will be skipped: {}", pattern, e);
                    None
                }
            }
        })
        .collect()
}
