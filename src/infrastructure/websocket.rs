use crate::domain::ports::{Transport, TransportEvent};
use crate::error::Result;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 256;

/// WebSocket connection to the swap server.
///
/// Writes go through a shared sink; a background task turns inbound messages into
/// `TransportEvent`s. `wss://` URLs need the `tls` cargo feature.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    reader: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Opens a connection to `url` and returns the transport with its event stream.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (stream, response) = connect_async(url).await?;
        tracing::info!(url, status = %response.status(), "websocket connected");

        let (sink, stream) = stream.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let _ = events_tx.send(TransportEvent::Connected).await;
        let reader = tokio::spawn(read_loop(stream, events_tx));

        Ok((
            Self {
                sink: Mutex::new(sink),
                reader,
            },
            events_rx,
        ))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::text(frame)).await?;
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::Sender<TransportEvent>) {
    let reason = loop {
        let event = match stream.next().await {
            Some(Ok(Message::Text(text))) => TransportEvent::Frame(text.as_str().to_owned()),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => TransportEvent::Frame(text),
                Err(_) => {
                    tracing::warn!(len = bytes.len(), "dropping binary frame that is not UTF-8");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => format!(
                        "closed by server ({}): {}",
                        u16::from(frame.code),
                        frame.reason.as_str()
                    ),
                    None => "closed by server".to_string(),
                };
            }
            // Ping/pong are answered by tungstenite itself.
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("websocket error: {e}"),
            None => break "connection closed".to_string(),
        };

        if events.send(event).await.is_err() {
            return;
        }
    };

    let _ = events.send(TransportEvent::Disconnected(reason)).await;
}
