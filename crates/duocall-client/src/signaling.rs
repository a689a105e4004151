use duocall_protocol::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{ClientError, Result};

/// Inbound side of the signaling channel as seen by the session loop.
#[derive(Debug)]
pub enum SignalEvent {
    Message(ServerMessage),
    /// The underlying connection dropped; the session treats this like a
    /// peer departure.
    Closed,
}

/// Outbound handle on the relay connection.
///
/// Writes go through an unbounded channel drained by a pump task, so sends
/// never block the session loop. Dropping the handle closes the connection.
pub struct SignalingChannel {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl SignalingChannel {
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<SignalEvent>)> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Signaling(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SignalEvent>();

        // Outbound pump; a close frame goes out once the handle is dropped.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("failed to serialize message: {}", e);
                        continue;
                    }
                };
                if write.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // Inbound pump.
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text)
                    {
                        Ok(msg) => {
                            if event_tx.send(SignalEvent::Message(msg)).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("unrecognized relay event: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        tracing::debug!("signaling read failed: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            let _ = event_tx.send(SignalEvent::Closed);
        });

        Ok((Self { tx: out_tx }, event_rx))
    }

    /// Channel-backed constructor for in-process wiring.
    pub(crate) fn from_channel(tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, msg: ClientMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| ClientError::ChannelClosed)
    }
}
