use async_trait::async_trait;

use super::retry::{RetryPolicy, retry_with_backoff};
use super::{Payload, PrinterTransport};
use crate::error::DeviceError;

/// Printer API over plain HTTP. All printers share one `reqwest::Client`
/// (and its connection pool); the client carries the per-request timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    async fn get_once(&self, url: &str) -> Result<Payload, DeviceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| classify(url, e))?;
        Ok(Payload::from_body(body))
    }
}

#[async_trait]
impl PrinterTransport for HttpTransport {
    async fn get(&self, address: &str, endpoint: &str) -> Result<Payload, DeviceError> {
        let url = format!("http://{}/api/v1/{}", address, endpoint);
        retry_with_backoff(self.retry, || self.get_once(&url), DeviceError::is_retryable).await
    }
}

fn classify(url: &str, err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() || err.is_request() {
        DeviceError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        DeviceError::Body {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff_factor: 0.0,
        }
    }

    /// Local printer stand-in answering one connection per canned response.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request).await;
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (address, hits)
    }

    #[tokio::test]
    async fn retries_unavailable_printer() {
        let (address, hits) = serve(vec![(503, ""), (200, r#"{"name":"Lab S5"}"#)]).await;
        let transport = HttpTransport::new(reqwest::Client::new(), policy());

        let payload = transport.get(&address, "system").await.unwrap();

        assert_eq!(payload, Payload::Json(json!({ "name": "Lab S5" })));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let (address, hits) = serve(vec![(404, ""), (200, "{}")]).await;
        let transport = HttpTransport::new(reqwest::Client::new(), policy());

        let err = transport.get(&address, "materials/abc").await.unwrap_err();

        assert!(matches!(err, DeviceError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = HttpTransport::new(
            reqwest::Client::new(),
            RetryPolicy {
                max_retries: 1,
                backoff_factor: 0.0,
            },
        );
        let err = transport.get(&address, "system").await.unwrap_err();

        assert!(matches!(err, DeviceError::Connect { .. }));
        assert!(err.is_retryable());
    }
}
