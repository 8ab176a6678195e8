//! Frames exchanged with the proxy plugin.
//!
//! The link is newline-delimited JSON. Every frame is an object with a
//! `type` tag.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::common::LinkError;

/// Longest frame accepted from the proxy, in bytes.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Frames sent by the proxy plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A player chatted on a sub-server. The plugin holds the message until
    /// it gets a verdict for `id`.
    Chat {
        id: u64,
        server: String,
        player: String,
        message: String,
    },
    /// A player finished connecting to a sub-server.
    Connected { player: String, server: String },
    /// A player left the proxy.
    Disconnect { player: String },
}

/// Frames sent to the proxy plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Show `text` on every sub-server except `except`, which already shows it.
    Broadcast {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        except: Option<String>,
        text: String,
    },
    /// Whether the proxy should deliver chat `id` natively.
    Verdict { id: u64, allow: bool },
}

/// Codec for the proxy link.
///
/// Malformed or oversized lines are logged and skipped instead of ending
/// the connection.
pub struct LinkCodec {
    lines: LinesCodec,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_FRAME_LENGTH),
        }
    }

    fn next_frame(
        &mut self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<InboundFrame>, LinkError> {
        loop {
            let decoded = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };
            let line = match decoded {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Proxy frame exceeds {} bytes, skipping", MAX_FRAME_LENGTH);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!("Skipping malformed proxy frame: {}", e),
            }
        }
    }
}

impl Default for LinkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LinkCodec {
    type Item = InboundFrame;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_frame(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_frame(src, true)
    }
}

impl Encoder<OutboundFrame> for LinkCodec {
    type Error = LinkError;

    fn encode(&mut self, item: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item)?;
        self.lines.encode(line, dst)?;
        Ok(())
    }
}

/// A framed proxy connection.
pub type LinkConnection<S> = Framed<S, LinkCodec>;

pub fn new_link_connection<S: AsyncRead + AsyncWrite>(stream: S) -> LinkConnection<S> {
    Framed::new(stream, LinkCodec::new())
}
