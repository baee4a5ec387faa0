use super::{Epoch, LinkEvent, LinkSender, SocketTransport, TransportKind};
use crate::infrastructure::TaskManager;
use crate::types::{IncusError, Result};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Outbound queue of one connection, present only while it is open
type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Duplex socket transport over `tokio-tungstenite`.
///
/// Each [`open`](SocketTransport::open) spawns one connection task. Outbound
/// frames are queued to that task once its handshake has completed; inbound
/// text frames and the final closure are reported on the link queue.
pub struct WebSocketTransport {
    endpoint: Url,
    events: LinkSender,
    outbound: OutboundSlot,
    tasks: TaskManager,
}

impl WebSocketTransport {
    pub fn new(endpoint: Url, events: LinkSender) -> Self {
        Self {
            endpoint,
            events,
            outbound: Arc::new(Mutex::new(None)),
            tasks: TaskManager::new(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl SocketTransport for WebSocketTransport {
    fn open(&mut self, epoch: Epoch) {
        self.close();

        // A fresh slot per connection, so a finished task cannot clear a newer one
        self.outbound = Arc::new(Mutex::new(None));
        self.tasks.spawn(run_connection(
            self.endpoint.clone(),
            epoch,
            Arc::clone(&self.outbound),
            self.events.clone(),
        ));
    }

    fn send(&mut self, wire: String) -> Result<()> {
        let outbound = self.outbound.lock();
        let outbound = outbound.as_ref().ok_or(IncusError::ChannelClosed)?;
        outbound.send(wire).map_err(|_| IncusError::ChannelClosed)
    }

    fn close(&mut self) {
        self.outbound.lock().take();
        self.tasks.abort_all();
    }
}

async fn handshake(endpoint: &Url) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let (stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
    Ok(stream)
}

async fn run_connection(endpoint: Url, epoch: Epoch, slot: OutboundSlot, events: LinkSender) {
    tracing::info!("Opening socket to {}", endpoint);

    let ws_stream = match handshake(&endpoint).await {
        Ok(stream) => stream,
        Err(e) => {
            let error = IncusError::TransportOpen {
                transport: TransportKind::Socket,
                reason: e.to_string(),
            };
            tracing::warn!("{}", error);
            let _ = events.send(LinkEvent::SocketClosed { epoch });
            return;
        }
    };

    let (mut write_half, mut read_half) = ws_stream.split();
    let (tx, mut outbound) = mpsc::unbounded_channel();
    *slot.lock() = Some(tx);
    let _ = events.send(LinkEvent::SocketOpened { epoch });

    loop {
        tokio::select! {
            wire = outbound.recv() => match wire {
                Some(wire) => {
                    if let Err(e) = write_half.send(Message::Text(wire.into())).await {
                        tracing::warn!("Socket write failed: {}", e);
                        break;
                    }
                }
                None => {
                    // Transport dropped this connection on purpose
                    let _ = write_half.close().await;
                    return;
                }
            },
            frame = read_half.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("Received text message: {}", text.as_str());
                    let _ = events.send(LinkEvent::SocketMessage {
                        epoch,
                        text: text.as_str().to_owned(),
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(close_frame) = frame {
                        tracing::info!(
                            "Server closed socket: code={:?}, reason='{}'",
                            close_frame.code,
                            close_frame.reason
                        );
                    } else {
                        tracing::info!("Server closed socket without close frame");
                    }
                    break;
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::warn!("Received unexpected binary message ({} bytes)", data.len());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!("Socket read error: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    tracing::info!("Socket connection (epoch {}) finished", epoch);
    slot.lock().take();
    let _ = events.send(LinkEvent::SocketClosed { epoch });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_open_channel_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport =
            WebSocketTransport::new(Url::parse("ws://127.0.0.1:9/socket").unwrap(), tx);

        assert!(matches!(
            transport.send("{}".to_string()),
            Err(IncusError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_closure() {
        // Bind then drop a listener so the port refuses connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Url::parse(&format!("ws://127.0.0.1:{}/socket", port)).unwrap();
        let mut transport = WebSocketTransport::new(endpoint, tx);

        transport.open(3);
        assert_eq!(rx.recv().await, Some(LinkEvent::SocketClosed { epoch: 3 }));
    }

    #[tokio::test]
    async fn test_send_fails_until_handshake_completes() {
        // Accepts TCP but never answers the upgrade
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        let endpoint = Url::parse(&format!("ws://127.0.0.1:{}/socket", port)).unwrap();
        let mut transport = WebSocketTransport::new(endpoint, tx);

        transport.open(1);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(matches!(
            transport.send("early".to_string()),
            Err(IncusError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_first_frame_is_sent_after_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                other => panic!("expected a text frame, got {other:?}"),
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Url::parse(&format!("ws://127.0.0.1:{}/socket", port)).unwrap();
        let mut transport = WebSocketTransport::new(endpoint, tx);

        transport.open(2);
        assert!(transport.send("early".to_string()).is_err());

        assert_eq!(rx.recv().await, Some(LinkEvent::SocketOpened { epoch: 2 }));
        transport.send("authenticate".to_string()).unwrap();

        assert_eq!(server.await.unwrap(), "authenticate");
    }

    #[tokio::test]
    async fn test_close_drops_outbound_queue() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport =
            WebSocketTransport::new(Url::parse("ws://127.0.0.1:9/socket").unwrap(), tx);

        transport.open(1);
        transport.close();
        assert!(transport.send("{}".to_string()).is_err());
    }
}
