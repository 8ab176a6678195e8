//! Platform bindings and their construction from configuration.

pub mod discord;
pub mod formatter;
pub mod minecraft;

use std::sync::Arc;

use tracing::{error, info};

use crate::common::{AdaptorError, AdaptorResult, Platform};
use crate::config::validate::validate_platform;
use crate::config::{Config, Policy};
use crate::hub::SharedAdaptor;

pub use discord::DiscordAdaptor;
pub use minecraft::MinecraftAdaptor;

/// Build one adaptor per enabled platform.
///
/// A platform whose section is invalid, or that has no binding, is logged
/// and switched off in the policy. It never prevents the others from running.
pub fn build_adaptors(config: &Config, policy: &Arc<Policy>) -> Vec<SharedAdaptor> {
    let mut adaptors = Vec::new();

    for platform in Platform::ALL {
        if !config.is_platform_enabled(platform) {
            continue;
        }
        match build_adaptor(config, policy, platform) {
            Ok(adaptor) => {
                info!(%platform, "Platform enabled");
                adaptors.push(adaptor);
            }
            Err(e) => {
                error!(%platform, "Platform disabled: {}", e);
                policy.set_platform_enabled(platform, false);
            }
        }
    }

    adaptors
}

fn build_adaptor(config: &Config, policy: &Arc<Policy>, platform: Platform) -> AdaptorResult<SharedAdaptor> {
    validate_platform(config, platform)?;

    let adaptor: SharedAdaptor = match platform {
        Platform::Minecraft => Arc::new(MinecraftAdaptor::new(&config.minecraft, Arc::clone(policy))),
        Platform::Discord => Arc::new(DiscordAdaptor::new(&config.discord, Arc::clone(policy))?),
        Platform::Kook | Platform::Qq => return Err(AdaptorError::Unsupported { platform }),
    };
    Ok(adaptor)
}
