use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::info;

use super::{NotificationContext, Notifier};
use crate::config::EmailConfig;
use crate::error::{ConfigError, DeliveryError};

const BACKEND: &str = "email";
const DEFAULT_SUBMISSION_PORT: u16 = 587;
const FOOTER: &str = "(automatically sent by sentinel)";

/// Sends one plain-text mail per ended process to every configured recipient,
/// through an authenticated STARTTLS relay.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let login = config.login.as_deref().ok_or(ConfigError::MissingSetting {
            backend: BACKEND,
            what: "a login (--login)",
        })?;
        let password = config.password.as_deref().ok_or(ConfigError::MissingSetting {
            backend: BACKEND,
            what: "a password (--password)",
        })?;
        if config.to.is_empty() {
            return Err(ConfigError::MissingSetting {
                backend: BACKEND,
                what: "at least one recipient (--to)",
            });
        }

        let from = parse_mailbox(config.from.as_deref().unwrap_or(login))?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;
        let (host, port) = split_relay(&config.smtp)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| ConfigError::InvalidSetting {
                backend: BACKEND,
                reason: format!("cannot use relay {host}: {e}"),
            })?
            .port(port)
            .credentials(Credentials::new(login.to_string(), password.to_string()))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn send(&self, ctx: &NotificationContext<'_>) -> Result<(), DeliveryError> {
        let message = build_message(&self.from, &self.to, ctx)?;
        info!(
            pid = ctx.record.pid(),
            "Sending email to: {}",
            self.to.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn build_message(
    from: &Mailbox,
    to: &[Mailbox],
    ctx: &NotificationContext<'_>,
) -> Result<Message, DeliveryError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(ctx.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    for recipient in to {
        builder = builder.to(recipient.clone());
    }
    builder
        .body(format!("{}\n\n{FOOTER}", ctx.description))
        .map_err(|e| DeliveryError::Message(e.to_string()))
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, ConfigError> {
    addr.parse().map_err(|e| ConfigError::InvalidSetting {
        backend: BACKEND,
        reason: format!("invalid address {addr:?}: {e}"),
    })
}

/// Splits `host[:port]`, defaulting to the submission port.
fn split_relay(relay: &str) -> Result<(&str, u16), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSetting {
        backend: BACKEND,
        reason,
    };
    let (host, port) = match relay.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| invalid(format!("invalid port in relay {relay:?}")))?;
            (host, port)
        }
        None => (relay, DEFAULT_SUBMISSION_PORT),
    };
    if host.is_empty() {
        return Err(invalid(format!("missing host in relay {relay:?}")));
    }
    Ok((host, port))
}
