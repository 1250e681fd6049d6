use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use super::{NotificationContext, Notifier};
use crate::config::ChatConfig;
use crate::error::{ConfigError, DeliveryError};

const BACKEND: &str = "chat";

/// Posts to a Slack-compatible incoming webhook, once per configured channel
/// (or once to the webhook's default channel when none are configured).
pub struct ChatNotifier {
    client: reqwest::Client,
    webhook_url: String,
    channels: Vec<String>,
}

impl ChatNotifier {
    pub fn new(config: &ChatConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let webhook_url = config.webhook_url.clone().ok_or(ConfigError::MissingSetting {
            backend: BACKEND,
            what: "a webhook URL (--webhook)",
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Unavailable {
                backend: BACKEND,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            webhook_url,
            channels: config.channels.clone(),
        })
    }

    async fn post(&self, payload: &Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn send(&self, ctx: &NotificationContext<'_>) -> Result<(), DeliveryError> {
        if self.channels.is_empty() {
            return self.post(&payload(ctx, None)).await;
        }

        // Every channel is attempted; the last failure is reported.
        let mut outcome = Ok(());
        for channel in &self.channels {
            match self.post(&payload(ctx, Some(channel))).await {
                Ok(()) => info!("Posted to chat channel {channel}"),
                Err(e) => {
                    warn!("Failed to post to chat channel {channel}: {e}");
                    outcome = Err(e);
                }
            }
        }
        outcome
    }
}

fn payload(ctx: &NotificationContext<'_>, channel: Option<&str>) -> Value {
    let mut body = json!({
        "text": format!("*{}*\n```{}```", ctx.subject, ctx.description),
    });
    if let Some(channel) = channel {
        body["channel"] = json!(channel);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeTable;
    use crate::process::ProcessRecord;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn record() -> ProcessRecord {
        let mut table = FakeTable::new();
        table.spawn(42, 0, "myapp");
        ProcessRecord::create(&mut table, 42, None).unwrap()
    }

    /// Serves `requests` HTTP requests with the given status line and returns
    /// the bodies it received.
    async fn serve(status: &'static str, requests: usize) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut bodies = Vec::new();
            for _ in 0..requests {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let body = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(split) = text.find("\r\n\r\n") {
                        let length = text[..split]
                            .lines()
                            .find_map(|l| {
                                let (k, v) = l.split_once(':')?;
                                k.eq_ignore_ascii_case("content-length")
                                    .then(|| v.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        if buf.len() >= split + 4 + length {
                            break text[split + 4..].to_string();
                        }
                    }
                    if n == 0 {
                        break String::new();
                    }
                };
                bodies.push(body);
                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            bodies
        });
        (url, handle)
    }

    fn notifier(url: String, channels: &[&str]) -> ChatNotifier {
        let config = ChatConfig {
            webhook_url: Some(url),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        };
        ChatNotifier::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn payload_includes_subject_description_and_channel() {
        let record = record();
        let ctx = NotificationContext::new(&record, "{pid} ended");
        let body = payload(&ctx, Some("#ops"));
        assert_eq!(body["channel"], "#ops");
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("*42 ended*"));
        assert!(text.contains("PID 42: /usr/bin/myapp"));

        assert!(payload(&ctx, None).get("channel").is_none());
    }

    #[test]
    fn new_requires_webhook() {
        let err = ChatNotifier::new(&ChatConfig::default(), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingSetting { backend: "chat", .. }));
    }

    #[tokio::test]
    async fn send_posts_once_per_channel() {
        let (url, server) = serve("200 OK", 2).await;
        let record = record();
        let ctx = NotificationContext::new(&record, "{pid} ended");

        notifier(url, &["#a", "#b"]).send(&ctx).await.unwrap();

        let bodies = server.await.unwrap();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].contains("#a"));
        assert!(bodies[1].contains("#b"));
    }

    #[tokio::test]
    async fn send_reports_rejection() {
        let (url, server) = serve("500 Internal Server Error", 1).await;
        let record = record();
        let ctx = NotificationContext::new(&record, "{pid} ended");

        let err = notifier(url, &[]).send(&ctx).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 500, .. }));
        server.await.unwrap();
    }
}
