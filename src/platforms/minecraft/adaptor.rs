//! Minecraft proxy adaptor.
//!
//! The proxy plugin connects to a TCP listener owned by this adaptor. One
//! plugin session is served at a time; a new connection replaces the old one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::common::{AdaptorError, AdaptorResult, MessageEvent, Platform, ServerChangeEvent};
use crate::config::{MinecraftConfig, Policy};
use crate::hub::{Adaptor, ChatLine, EventHub, ServerScope};
use crate::platforms::formatter::PlatformFormatter;
use crate::platforms::minecraft::codec::{new_link_connection, InboundFrame, OutboundFrame};
use crate::platforms::minecraft::state::{Presence, ProxyState};

/// Frames kept for a proxy session that is not reading.
pub const SESSION_QUEUE_CAPACITY: usize = 256;

/// State shared between the adaptor and its link tasks.
struct Link {
    policy: Arc<Policy>,
    state: Mutex<ProxyState>,
    session: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    session_capacity: usize,
    dropped: AtomicU64,
}

impl Link {
    fn new(policy: Arc<Policy>, session_capacity: usize) -> Self {
        Self {
            policy,
            state: Mutex::new(ProxyState::default()),
            session: Mutex::new(None),
            session_capacity: session_capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Install a new session, replacing any previous one.
    ///
    /// Returns the receiving half and whether a session was replaced.
    fn open_session(&self) -> (mpsc::Receiver<OutboundFrame>, bool) {
        let (tx, rx) = mpsc::channel(self.session_capacity);
        let replaced = self.session.lock().replace(tx).is_some();
        self.state.lock().clear();
        (rx, replaced)
    }

    fn close_session(&self) {
        self.session.lock().take();
    }

    /// Turn one inbound frame into hub events, returning the reply if any.
    fn handle_frame(&self, hub: &EventHub, frame: InboundFrame) -> Option<OutboundFrame> {
        match frame {
            InboundFrame::Chat {
                id,
                server,
                player,
                message,
            } => {
                // The verdict and the hub's scope must agree on takeover mode.
                let policy = self.policy.snapshot();

                if policy.is_ignored(&message) {
                    debug!(%server, "Ignored native chat from {}", player);
                    return Some(OutboundFrame::Verdict { id, allow: true });
                }

                let allow = !policy.is_complete_takeover();
                hub.on_user_chat_with(
                    MessageEvent::new(Platform::Minecraft, server, player, message),
                    &policy,
                );
                Some(OutboundFrame::Verdict { id, allow })
            }
            InboundFrame::Connected { player, server } => {
                let presence = self.state.lock().connected(&player, &server);
                match presence {
                    Presence::Joined => {
                        hub.on_join_server(ServerChangeEvent::join(Platform::Minecraft, player, server))
                    }
                    Presence::Switched { from } => hub.on_switch_server(ServerChangeEvent::switch(
                        Platform::Minecraft,
                        player,
                        from,
                        server,
                    )),
                    Presence::Unchanged => {}
                }
                None
            }
            InboundFrame::Disconnect { player } => {
                if self.state.lock().disconnect(&player).is_none() {
                    debug!("Disconnect for untracked player {}", player);
                }
                hub.on_leave_server(ServerChangeEvent::leave(Platform::Minecraft, player));
                None
            }
        }
    }

    /// Queue a broadcast for the current session without waiting.
    fn broadcast(&self, except: Option<String>, text: String) {
        let session = self.session.lock();
        let Some(tx) = session.as_ref() else {
            debug!("Proxy not connected, dropping broadcast");
            return;
        };

        match tx.try_send(OutboundFrame::Broadcast { except, text }) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "Proxy not reading, dropping {:?}", frame);
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Proxy session closed, dropping broadcast");
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct MinecraftAdaptor {
    listen: String,
    link: Arc<Link>,
    formatter: PlatformFormatter,
    local_addr: OnceLock<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
}

impl MinecraftAdaptor {
    pub fn new(config: &MinecraftConfig, policy: Arc<Policy>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            listen: config.link.listen.clone(),
            formatter: PlatformFormatter::new(Platform::Minecraft, Arc::clone(&policy)),
            link: Arc::new(Link::new(policy, SESSION_QUEUE_CAPACITY)),
            local_addr: OnceLock::new(),
            shutdown_tx,
        }
    }

    /// Address the link listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

#[async_trait]
impl Adaptor for MinecraftAdaptor {
    fn platform(&self) -> Platform {
        Platform::Minecraft
    }

    async fn start(&self, hub: Arc<EventHub>) -> AdaptorResult<()> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .map_err(|e| AdaptorError::Start {
                platform: Platform::Minecraft,
                message: format!("cannot listen on {}: {}", self.listen, e),
            })?;
        let addr = listener.local_addr()?;
        // start is called once; a second set would be a no-op anyway.
        let _ = self.local_addr.set(addr);
        info!(%addr, "Waiting for proxy plugin");

        tokio::spawn(accept_loop(
            Arc::clone(&self.link),
            hub,
            listener,
            self.shutdown_tx.subscribe(),
        ));
        Ok(())
    }

    async fn send_public_message(&self, text: &str) {
        self.link.broadcast(None, text.to_string());
    }

    async fn on_user_chat(&self, line: &ChatLine) {
        let except = match &line.scope {
            ServerScope::All => None,
            ServerScope::AllExcept(server) => Some(server.clone()),
        };
        self.link.broadcast(except, self.formatter.format_user_chat(line));
    }

    async fn on_join_server(&self, event: &ServerChangeEvent) {
        self.send_public_message(&self.formatter.format_join(event)).await;
    }

    async fn on_leave_server(&self, event: &ServerChangeEvent) {
        self.send_public_message(&self.formatter.format_leave(event)).await;
    }

    async fn on_switch_server(&self, event: &ServerChangeEvent) {
        self.send_public_message(&self.formatter.format_switch(event)).await;
    }

    async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.link.close_session();
        let dropped = self.link.dropped();
        if dropped > 0 {
            warn!(dropped, "Broadcasts dropped on the proxy link");
        }
    }
}

async fn accept_loop(
    link: Arc<Link>,
    hub: Arc<EventHub>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let (rx, replaced) = link.open_session();
                    if replaced {
                        info!(%peer, "Proxy reconnected, replacing previous session");
                    } else {
                        info!(%peer, "Proxy connected");
                    }
                    tokio::spawn(run_session(Arc::clone(&link), Arc::clone(&hub), stream, peer, rx));
                }
                Err(e) => {
                    error!("Failed to accept proxy connection: {}", e);
                }
            },
        }
    }
    debug!("Proxy link listener stopped");
}

async fn run_session(
    link: Arc<Link>,
    hub: Arc<EventHub>,
    stream: TcpStream,
    peer: SocketAddr,
    mut outbound: mpsc::Receiver<OutboundFrame>,
) {
    let mut connection = new_link_connection(stream);

    loop {
        tokio::select! {
            frame = connection.next() => match frame {
                Some(Ok(frame)) => {
                    if let Some(reply) = link.handle_frame(&hub, frame) {
                        if let Err(e) = connection.send(reply).await {
                            warn!(%peer, "Failed to reply to proxy: {}", e);
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(%peer, "Proxy link error: {}", e);
                    break;
                }
                None => {
                    info!(%peer, "Proxy disconnected");
                    break;
                }
            },

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = connection.send(frame).await {
                        warn!(%peer, "Failed to send to proxy: {}", e);
                        break;
                    }
                }
                // Replaced by a newer session or shutting down.
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hub::testing::{Recorder, Relay};
    use tokio_util::codec::{Framed, LinesCodec};

    struct Harness {
        hub: Arc<EventHub>,
        discord: Arc<Recorder>,
        addr: SocketAddr,
        client: Framed<TcpStream, LinesCodec>,
    }

    async fn harness(config: Config) -> Harness {
        let policy = Arc::new(Policy::from_config(&config));
        let mut mc_config = config.minecraft.clone();
        mc_config.link.listen = "127.0.0.1:0".to_string();

        let minecraft = Arc::new(MinecraftAdaptor::new(&mc_config, Arc::clone(&policy)));
        let discord = Recorder::new(Platform::Discord);
        let hub = EventHub::builder(policy)
            .register(minecraft.clone())
            .register(discord.clone())
            .build();
        hub.start().await;

        let addr = minecraft.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let client = Framed::new(stream, LinesCodec::new());
        Harness {
            hub,
            discord,
            addr,
            client,
        }
    }

    impl Harness {
        async fn reconnect(&mut self) {
            let stream = TcpStream::connect(self.addr).await.unwrap();
            self.client = Framed::new(stream, LinesCodec::new());
        }

        async fn send(&mut self, json: &str) {
            self.client.send(json.to_string()).await.unwrap();
        }

        async fn recv(&mut self) -> OutboundFrame {
            let line = self.client.next().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn chat(&mut self, id: u64, server: &str, message: &str) -> OutboundFrame {
            self.send(&format!(
                "{{\"type\":\"chat\",\"id\":{},\"server\":\"{}\",\"player\":\"Steve\",\"message\":\"{}\"}}",
                id, server, message
            ))
            .await;
            self.recv().await
        }
    }

    #[tokio::test]
    async fn test_chat_allowed_without_takeover() {
        let mut h = harness(Config::default()).await;

        let verdict = h.chat(1, "lobby", "hello").await;
        assert_eq!(verdict, OutboundFrame::Verdict { id: 1, allow: true });
        h.hub.shutdown().await;

        assert_eq!(
            h.discord.relays(),
            vec![Relay::Chat(ChatLine {
                platform: Platform::Minecraft,
                server: "lobby".to_string(),
                user: "Steve".to_string(),
                text: "hello".to_string(),
                scope: ServerScope::All,
            })]
        );
    }

    #[tokio::test]
    async fn test_chat_denied_in_takeover() {
        let mut config = Config::default();
        config.minecraft.complete_takeover_mode = true;
        let mut h = harness(config).await;

        // The hub relays the line back to every sub-server, the origin included.
        let verdict = h.chat(2, "lobby", "hello").await;
        assert_eq!(verdict, OutboundFrame::Verdict { id: 2, allow: false });
        assert_eq!(
            h.recv().await,
            OutboundFrame::Broadcast {
                except: None,
                text: "[lobby] <Steve> hello".to_string(),
            }
        );
        h.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_ignored_chat_stays_native() {
        let mut config = Config::default();
        config.minecraft.complete_takeover_mode = true;
        config.minecraft.ignore_chat_message_re = vec!["^/".to_string()];
        let mut h = harness(config).await;

        let verdict = h.chat(3, "lobby", "/spawn").await;
        assert_eq!(verdict, OutboundFrame::Verdict { id: 3, allow: true });
        h.hub.shutdown().await;

        assert!(h.discord.relays().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_origin_excludes_origin_server_after_reconnect() {
        let mut h = harness(Config::default()).await;

        let verdict = h.chat(4, "lobby", "one").await;
        assert_eq!(verdict, OutboundFrame::Verdict { id: 4, allow: true });
        assert_eq!(
            h.recv().await,
            OutboundFrame::Broadcast {
                except: Some("lobby".to_string()),
                text: "[lobby] <Steve> one".to_string(),
            }
        );

        // A fresh plugin session knows nothing about sub-servers yet.
        h.reconnect().await;
        let verdict = h.chat(5, "lobby", "two").await;
        assert_eq!(verdict, OutboundFrame::Verdict { id: 5, allow: true });
        assert_eq!(
            h.recv().await,
            OutboundFrame::Broadcast {
                except: Some("lobby".to_string()),
                text: "[lobby] <Steve> two".to_string(),
            }
        );
        h.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_presence_frames() {
        let mut h = harness(Config::default()).await;

        h.send("{\"type\":\"connected\",\"player\":\"Steve\",\"server\":\"lobby\"}").await;
        h.send("{\"type\":\"connected\",\"player\":\"Steve\",\"server\":\"arena\"}").await;
        h.send("{\"type\":\"disconnect\",\"player\":\"Steve\"}").await;
        // The verdict proves the frames before it were handled.
        h.chat(5, "arena", "bye").await;
        h.hub.shutdown().await;

        let relays = h.discord.relays();
        assert_eq!(
            relays[..3],
            [
                Relay::Join(ServerChangeEvent::join(Platform::Minecraft, "Steve", "lobby")),
                Relay::Switch(ServerChangeEvent::switch(
                    Platform::Minecraft,
                    "Steve",
                    "lobby",
                    "arena"
                )),
                Relay::Leave(ServerChangeEvent::leave(Platform::Minecraft, "Steve")),
            ]
        );
    }

    #[tokio::test]
    async fn test_outbound_relay_from_other_platform() {
        let mut h = harness(Config::default()).await;
        // Make sure the session is registered before relaying.
        h.chat(6, "lobby", "ping").await;
        assert_eq!(
            h.recv().await,
            OutboundFrame::Broadcast {
                except: Some("lobby".to_string()),
                text: "[lobby] <Steve> ping".to_string(),
            }
        );

        h.hub
            .on_user_chat(MessageEvent::new(Platform::Discord, "", "alice", "hi there"));
        h.hub.on_switch_server(ServerChangeEvent::switch(
            Platform::Discord,
            "alice",
            "a",
            "b",
        ));

        assert_eq!(
            h.recv().await,
            OutboundFrame::Broadcast {
                except: None,
                text: "[Discord] <alice> hi there".to_string(),
            }
        );
        assert_eq!(
            h.recv().await,
            OutboundFrame::Broadcast {
                except: None,
                text: "alice: a -> b".to_string(),
            }
        );
        h.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_failure_disables_platform() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = Config::default();
        config.minecraft.link.listen = taken.local_addr().unwrap().to_string();

        let policy = Arc::new(Policy::from_config(&config));
        let minecraft = Arc::new(MinecraftAdaptor::new(&config.minecraft, Arc::clone(&policy)));
        let hub = EventHub::builder(Arc::clone(&policy))
            .register(minecraft.clone())
            .build();
        hub.start().await;

        assert!(minecraft.local_addr().is_none());
        assert!(!policy.is_platform_enabled(Platform::Minecraft));
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_stalled_session_drops_broadcasts() {
        let link = Link::new(Arc::new(Policy::from_config(&Config::default())), 1);
        let (mut rx, replaced) = link.open_session();
        assert!(!replaced);

        link.broadcast(None, "first".to_string());
        link.broadcast(Some("lobby".to_string()), "second".to_string());

        assert_eq!(link.dropped(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundFrame::Broadcast {
                except: None,
                text: "first".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replaced_session_closes_old_receiver() {
        let link = Link::new(Arc::new(Policy::from_config(&Config::default())), 4);
        let (mut old, _) = link.open_session();
        let (mut new, replaced) = link.open_session();
        assert!(replaced);

        link.broadcast(None, "hello".to_string());

        assert_eq!(old.recv().await, None);
        assert!(new.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_takeover_verdict_matches_relay_scope() {
        let mut config = Config::default();
        config.minecraft.complete_takeover_mode = true;
        let policy = Arc::new(Policy::from_config(&config));
        let recorder = Recorder::new(Platform::Minecraft);
        let hub = EventHub::builder(Arc::clone(&policy))
            .register(recorder.clone())
            .build();
        let link = Link::new(Arc::clone(&policy), 4);

        let verdict = link.handle_frame(
            &hub,
            InboundFrame::Chat {
                id: 9,
                server: "lobby".to_string(),
                player: "Steve".to_string(),
                message: "hi".to_string(),
            },
        );
        hub.shutdown().await;

        // Denied natively, so the origin sub-server gets the relay too.
        assert_eq!(verdict, Some(OutboundFrame::Verdict { id: 9, allow: false }));
        assert_eq!(
            recorder.relays(),
            vec![Relay::Chat(ChatLine {
                platform: Platform::Minecraft,
                server: "lobby".to_string(),
                user: "Steve".to_string(),
                text: "hi".to_string(),
                scope: ServerScope::All,
            })]
        );
    }
}
