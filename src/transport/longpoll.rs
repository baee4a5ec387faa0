use super::{Epoch, LinkEvent, LinkSender, PollOutcome, PollTransport, TransportKind};
use crate::infrastructure::PollQuery;
use crate::types::{IncusError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Long-poll transport over `reqwest`.
///
/// Holds at most one request in flight. Starting a new request aborts the
/// previous one, and an aborted request never reports a completion.
pub struct LongPollTransport {
    endpoint: Url,
    http_client: reqwest::Client,
    events: LinkSender,
    in_flight: Option<JoinHandle<()>>,
}

impl LongPollTransport {
    pub fn new(endpoint: Url, timeout: Duration, events: LinkSender) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(endpoint, http_client, events))
    }

    /// Uses a preconfigured HTTP client (proxy, TLS and timeout settings)
    pub fn with_client(endpoint: Url, http_client: reqwest::Client, events: LinkSender) -> Self {
        Self {
            endpoint,
            http_client,
            events,
            in_flight: None,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl PollTransport for LongPollTransport {
    fn request(&mut self, epoch: Epoch, query: PollQuery) {
        self.abort();

        let url = query.to_url(&self.endpoint);
        let http_client = self.http_client.clone();
        let events = self.events.clone();

        self.in_flight = Some(tokio::spawn(async move {
            tracing::debug!("Long-poll request (epoch {}) to {}", epoch, url);
            let outcome = fetch(&http_client, url).await;
            let _ = events.send(LinkEvent::PollCompleted { epoch, outcome });
        }));
    }

    fn abort(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl Drop for LongPollTransport {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn fetch(http_client: &reqwest::Client, url: Url) -> PollOutcome {
    let response = match http_client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return failed(e),
    };

    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => PollOutcome::Response { status, body },
        Err(e) => failed(e),
    }
}

fn failed(e: reqwest::Error) -> PollOutcome {
    let error = IncusError::TransportOpen {
        transport: TransportKind::Poll,
        reason: e.to_string(),
    };
    tracing::warn!("{}", error);
    PollOutcome::Failed(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn local_transport(port: u16, events: LinkSender) -> LongPollTransport {
        let endpoint = Url::parse(&format!("http://127.0.0.1:{}/lp", port)).unwrap();
        let http_client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        LongPollTransport::with_client(endpoint, http_client, events)
    }

    /// Serves one canned HTTP response and hands back the request line
    async fn serve_once(listener: TcpListener, response: &'static str) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = vec![0u8; 4096];
        let read = stream.read(&mut buffer).await.unwrap();
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();

        let request = String::from_utf8_lossy(&buffer[..read]).to_string();
        request.lines().next().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_request_reports_status_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK\r\nContent-Length: 26\r\nConnection: close\r\n\r\n{\"event\":\"chat\",\"data\":42}",
        ));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = local_transport(port, tx);

        let mut query = PollQuery::new("u1");
        query.page = Some("lobby".to_string());
        transport.request(1, query);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            LinkEvent::PollCompleted {
                epoch: 1,
                outcome: PollOutcome::Response {
                    status: 200,
                    body: r#"{"event":"chat","data":42}"#.to_string(),
                },
            }
        );

        let request_line = server.await.unwrap();
        assert_eq!(request_line, "GET /lp?user=u1&page=lobby HTTP/1.1");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = local_transport(port, tx);

        transport.request(9, PollQuery::new("u1"));
        match rx.recv().await {
            Some(LinkEvent::PollCompleted {
                epoch: 9,
                outcome: PollOutcome::Failed(_),
            }) => {}
            other => panic!("expected a failed completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_aborted_request_is_not_reported() {
        // Accepts but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = local_transport(port, tx);

        transport.request(1, PollQuery::new("u1"));
        transport.abort();

        let waited = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(waited.is_err(), "aborted request must stay silent");
    }
}
