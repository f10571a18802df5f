//! Durable message-oriented signaling connection
//!
//! One WebSocket per room. The channel itself never reconnects; on loss it
//! reports a terminal [`ChannelEvent::Closed`] and reconnection policy stays
//! with the session controller.

use crate::config::SignalingConfig;
use crate::domain::shared::error::TransportError;
use crate::infrastructure::signaling::message::SignalingMessage;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsSink = futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Items produced by the inbound side of the channel.
///
/// `Closed` is terminal; a fresh `connect` starts a new sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(SignalingMessage),
    Closed { normal: bool },
}

/// Signaling channel to the rendezvous server
pub struct SignalingChannel {
    writer: WsSink,
    open: Arc<AtomicBool>,
}

impl SignalingChannel {
    /// Open the channel for a room.
    ///
    /// Fails with [`TransportError::Timeout`] when the handshake does not
    /// complete within the configured timeout. Returns the channel plus the
    /// inbound event sequence.
    pub async fn connect(
        config: &SignalingConfig,
        room_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>), TransportError> {
        let url = config.room_url(room_id);
        debug!(%url, "connecting signaling channel");

        let connect = connect_async(url);
        let (stream, _response) = match tokio::time::timeout(config.connect_timeout(), connect).await
        {
            Ok(Ok(ok)) => ok,
            Ok(Err(err)) => return Err(TransportError::Handshake(err.to_string())),
            Err(_elapsed) => return Err(TransportError::Timeout),
        };

        let (writer, mut reader) = stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            let mut normal = false;
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SignalingMessage>(&text)
                    {
                        Ok(message) => {
                            debug!(kind = message.kind(), "signaling message received");
                            if events_tx.send(ChannelEvent::Message(message)).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(%err, "discarding malformed signaling frame");
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        normal = matches!(&frame, Some(f) if f.code == CloseCode::Normal);
                        debug!(normal, "signaling channel closed by server");
                        break;
                    }
                    // Protocol-level ping/pong and binary frames are not part
                    // of the signaling contract
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "signaling transport error");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            let _ = events_tx.send(ChannelEvent::Closed { normal });
        });

        Ok((Self { writer, open }, events_rx))
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Send one message. Fails fast with [`TransportError::NotConnected`]
    /// when the channel is no longer open instead of silently dropping.
    pub async fn send(&mut self, message: &SignalingMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let text = serde_json::to_string(message)
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        match self.writer.send(Message::Text(text)).await {
            Ok(()) => {
                debug!(kind = message.kind(), "signaling message sent");
                Ok(())
            }
            Err(err) => {
                warn!(%err, "signaling send failed");
                self.open.store(false, Ordering::SeqCst);
                Err(TransportError::NotConnected)
            }
        }
    }

    /// Close the channel with a normal close code
    pub async fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "call ended".into(),
            };
            if let Err(err) = self.writer.send(Message::Close(Some(frame))).await {
                debug!(%err, "close frame not delivered");
            }
        }
    }
}
