//! Minecraft proxy platform: a plugin on the proxy talks to the hub over a TCP link.

pub mod adaptor;
pub mod codec;
pub mod state;

pub use adaptor::MinecraftAdaptor;
