//! Check-in submission service
//!
//! `PUT {base}/checkin/{ticketId}` with `{ "reviewerName", "reviewerEmail" }`.
//! The client never retries; resubmission is the operator's call.

use crate::config::ServiceOptions;
use crate::error::{Error, Result};
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Unreserved URL characters stay readable in the ticket path segment.
const TICKET_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A validated check-in ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinRequest {
    /// Ticket identifier from the scanned payload
    #[serde(skip)]
    pub ticket_id: String,
    /// Reviewer full name
    pub reviewer_name: String,
    /// Reviewer email
    pub reviewer_email: String,
}

/// Acknowledgement returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinAck {
    /// HTTP status of the response
    pub status: u16,
    /// Response body, or `Null` when empty or not JSON
    pub body: Value,
}

/// Persists completed check-ins
#[async_trait]
pub trait CheckinService: Send + Sync {
    /// Record the check-in. Failures carry a message for the operator.
    async fn check_in(&self, request: &CheckinRequest) -> Result<CheckinAck>;
}

/// [`CheckinService`] over HTTP
pub struct HttpCheckinService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCheckinService {
    /// Build a client from service options
    pub fn new(options: &ServiceOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = options.token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Config("Service token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(options.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, ticket_id: &str) -> String {
        let encoded = utf8_percent_encode(ticket_id, TICKET_SEGMENT);
        format!("{}/checkin/{encoded}", self.base_url)
    }
}

#[async_trait]
impl CheckinService for HttpCheckinService {
    async fn check_in(&self, request: &CheckinRequest) -> Result<CheckinAck> {
        let url = self.url(&request.ticket_id);
        tracing::debug!(%url, "PUT check-in");

        let resp = self.http.put(&url).json(request).send().await?;
        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%url, error = %err, "Failed to read check-in response body");
                String::new()
            }
        };

        if !status.is_success() {
            return Err(Error::Submission {
                status: Some(status.as_u16()),
                message: error_message(&text, status.canonical_reason()),
            });
        }

        Ok(CheckinAck {
            status: status.as_u16(),
            body: serde_json::from_str(&text).unwrap_or(Value::Null),
        })
    }
}

/// Prefer a JSON `message`/`error` field, then the raw body, then the reason phrase.
fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        reason.unwrap_or("request failed").to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Answers one request with `status` and `body`, handing back the raw request text.
    async fn mock_server(status: &str, body: &str) -> (String, oneshot::Receiver<String>) {
        mock_raw(format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await
    }

    /// Writes `response` verbatim after reading one request.
    async fn mock_raw(response: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let mut request = Vec::new();
                // Read until headers and the JSON body have arrived.
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request);
                    if let Some((head, rest)) = text.split_once("\r\n\r\n") {
                        let length = head
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if rest.len() >= length {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, rx)
    }

    fn options(base_url: String) -> ServiceOptions {
        ServiceOptions {
            base_url,
            timeout_secs: 5,
            token: Some("secret-token".into()),
        }
    }

    fn request(ticket: &str) -> CheckinRequest {
        CheckinRequest {
            ticket_id: ticket.into(),
            reviewer_name: "Ada".into(),
            reviewer_email: "ada@example.org".into(),
        }
    }

    #[tokio::test]
    async fn puts_reviewer_identity_to_ticket_path() {
        let (url, seen) = mock_server("200 OK", r#"{"ok":true}"#).await;
        let service = HttpCheckinService::new(&options(url)).unwrap();

        let ack = service.check_in(&request("TIX 001")).await.unwrap();
        assert_eq!(ack.status, 200);
        assert_eq!(ack.body["ok"], true);

        let raw = seen.await.unwrap();
        assert!(raw.starts_with("PUT /checkin/TIX%20001 HTTP/1.1"), "{raw}");
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer secret-token"));
        assert!(raw.contains(r#""reviewerName":"Ada""#));
        assert!(raw.contains(r#""reviewerEmail":"ada@example.org""#));
        assert!(!raw.contains("ticket_id") && !raw.contains("ticketId"));
    }

    #[tokio::test]
    async fn service_error_surfaces_message() {
        let (url, _seen) = mock_server("409 Conflict", r#"{"message":"already checked in"}"#).await;
        let service = HttpCheckinService::new(&options(url)).unwrap();

        match service.check_in(&request("TIX-001")).await {
            Err(Error::Submission { status, message }) => {
                assert_eq!(status, Some(409));
                assert_eq!(message, "already checked in");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_submission_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let service = HttpCheckinService::new(&options(url)).unwrap();
        assert!(matches!(
            service.check_in(&request("TIX-001")).await,
            Err(Error::Submission { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn truncated_body_still_acknowledges_success() {
        // Promises more bytes than it sends, so reading the body fails.
        let (url, _seen) = mock_raw(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 64\r\nConnection: close\r\n\r\n{\"ok\""
                .to_string(),
        )
        .await;
        let service = HttpCheckinService::new(&options(url)).unwrap();

        let ack = service.check_in(&request("TIX-001")).await.unwrap();
        assert_eq!(ack.status, 200);
        assert_eq!(ack.body, Value::Null);
    }

    #[test]
    fn error_message_fallbacks() {
        assert_eq!(error_message(r#"{"error":"nope"}"#, None), "nope");
        assert_eq!(error_message("plain failure", None), "plain failure");
        assert_eq!(error_message("", Some("Not Found")), "Not Found");
    }
}
