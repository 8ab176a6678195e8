//! The contract every platform binding implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{AdaptorResult, Platform, ServerChangeEvent};
use crate::hub::EventHub;

/// Which proxy sub-servers should receive a relayed chat line.
///
/// Only the proxy adaptor looks at this; every other platform relays
/// unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerScope {
    /// Every sub-server.
    All,
    /// Every sub-server except the named one, which already shows the line.
    AllExcept(String),
}

impl ServerScope {
    pub fn includes(&self, server: &str) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != server,
        }
    }
}

/// One line of a chat message, ready for an adaptor to format and send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Platform the message came from.
    pub platform: Platform,
    /// Origin sub-server, empty for platforms without sub-servers.
    pub server: String,
    pub user: String,
    pub text: String,
    pub scope: ServerScope,
}

/// A platform binding.
///
/// Outbound methods are called by the hub's delivery worker for this adaptor,
/// one at a time and in enqueue order. None of them may fail past their own
/// boundary: transport errors are logged inside the adaptor.
#[async_trait]
pub trait Adaptor: Send + Sync {
    /// Platform this adaptor binds.
    fn platform(&self) -> Platform;

    /// Connect to the underlying transport and start feeding the hub.
    ///
    /// Called once. An error disables this platform only.
    async fn start(&self, hub: Arc<EventHub>) -> AdaptorResult<()>;

    /// Broadcast text to every reachable recipient on this platform.
    async fn send_public_message(&self, text: &str);

    async fn on_user_chat(&self, line: &ChatLine);

    async fn on_join_server(&self, event: &ServerChangeEvent);

    async fn on_leave_server(&self, event: &ServerChangeEvent);

    async fn on_switch_server(&self, event: &ServerChangeEvent);

    /// Disconnect from the transport.
    async fn shutdown(&self) {}
}

/// A shared adaptor trait object.
pub type SharedAdaptor = Arc<dyn Adaptor>;
