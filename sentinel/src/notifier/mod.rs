//! Notification backends and the dispatcher that fans one ended process out
//! to all of them.

mod chat;
mod desktop;
mod email;

pub use chat::ChatNotifier;
pub use desktop::DesktopNotifier;
pub use email::EmailNotifier;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ConfigError, DeliveryError};
use crate::process::ProcessRecord;

/// Everything a backend needs to tell someone a process ended.
#[derive(Debug, Clone)]
pub struct NotificationContext<'a> {
    pub record: &'a ProcessRecord,
    /// Rendered subject line.
    pub subject: String,
    /// Output of [`ProcessRecord::describe`].
    pub description: String,
}

impl<'a> NotificationContext<'a> {
    pub fn new(record: &'a ProcessRecord, subject_template: &str) -> Self {
        Self {
            record,
            subject: record.subject(subject_template),
            description: record.describe(),
        }
    }
}

/// A notification transport. Addressing (recipients, channels) is fixed when
/// the backend is constructed.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, ctx: &NotificationContext<'_>) -> Result<(), DeliveryError>;
}

/// Outcome of one [`NotificationDispatcher::dispatch`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

/// Invokes every configured backend for an ended process. Backends are tried
/// in order and in isolation: a failure or timeout in one is logged and never
/// stops the rest.
pub struct NotificationDispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>, send_timeout: Duration) -> Self {
        Self {
            notifiers,
            send_timeout,
        }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub async fn dispatch(&self, record: &ProcessRecord, subject_template: &str) -> DispatchReport {
        let ctx = NotificationContext::new(record, subject_template);
        let mut report = DispatchReport::default();

        for notifier in &self.notifiers {
            let result = tokio::time::timeout(self.send_timeout, notifier.send(&ctx))
                .await
                .unwrap_or(Err(DeliveryError::Timeout(self.send_timeout)));
            match result {
                Ok(()) => {
                    info!(backend = notifier.name(), pid = record.pid(), "Notification sent");
                    report.delivered.push(notifier.name().to_string());
                }
                Err(e) => {
                    warn!(
                        backend = notifier.name(),
                        pid = record.pid(),
                        "Failed to send notification: {e}"
                    );
                    report.failed.push(notifier.name().to_string());
                }
            }
        }
        report
    }
}

/// Builds the backends selected by `config`. A selected backend that cannot be
/// set up (missing credentials, missing helper binary) is a startup error.
pub fn build_notifiers(config: &Config) -> Result<Vec<Box<dyn Notifier>>, ConfigError> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if config.email.enabled() {
        notifiers.push(Box::new(EmailNotifier::new(&config.email, config.send_timeout())?));
    }
    if config.chat.enabled() {
        notifiers.push(Box::new(ChatNotifier::new(&config.chat, config.send_timeout())?));
    }
    if config.desktop.enabled {
        notifiers.push(Box::new(DesktopNotifier::new()?));
    }
    Ok(notifiers)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// What a [`RecordingNotifier`] should do when asked to send.
    #[derive(Debug, Clone, Copy)]
    pub enum Behaviour {
        Succeed,
        Fail,
        Hang,
    }

    /// Records the subjects it was asked to send.
    #[derive(Clone)]
    pub struct RecordingNotifier {
        name: String,
        behaviour: Behaviour,
        pub sent: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        pub fn new(name: &str, behaviour: Behaviour) -> Self {
            Self {
                name: name.to_string(),
                behaviour,
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, ctx: &NotificationContext<'_>) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(ctx.subject.clone());
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(DeliveryError::Transport("relay unreachable".to_string())),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Behaviour, RecordingNotifier};
    use super::*;
    use crate::process::fake::FakeTable;

    fn record() -> ProcessRecord {
        let mut table = FakeTable::new();
        table.spawn(42, 7, "myapp");
        ProcessRecord::create(&mut table, 42, Some("nightly")).unwrap()
    }

    #[test]
    fn context_renders_subject_and_description() {
        let record = record();
        let ctx = NotificationContext::new(&record, "{executable} process {pid} ended: {label}");
        assert_eq!(ctx.subject, "/usr/bin/myapp process 42 ended: nightly");
        assert_eq!(ctx.description, record.describe());
    }

    #[tokio::test]
    async fn dispatch_tries_every_backend_despite_failures() {
        let failing = RecordingNotifier::new("email", Behaviour::Fail);
        let working = RecordingNotifier::new("chat", Behaviour::Succeed);
        let dispatcher = NotificationDispatcher::new(
            vec![Box::new(failing.clone()), Box::new(working.clone())],
            Duration::from_secs(1),
        );

        let report = dispatcher.dispatch(&record(), "{pid} ended").await;
        assert_eq!(report.failed, vec!["email"]);
        assert_eq!(report.delivered, vec!["chat"]);
        assert_eq!(failing.subjects(), vec!["42 ended"]);
        assert_eq!(working.subjects(), vec!["42 ended"]);
    }

    #[tokio::test]
    async fn dispatch_bounds_hung_backends() {
        let hung = RecordingNotifier::new("desktop", Behaviour::Hang);
        let working = RecordingNotifier::new("chat", Behaviour::Succeed);
        let dispatcher = NotificationDispatcher::new(
            vec![Box::new(hung), Box::new(working.clone())],
            Duration::from_millis(20),
        );

        let report = dispatcher.dispatch(&record(), "{pid} ended").await;
        assert_eq!(report.failed, vec!["desktop"]);
        assert_eq!(report.delivered, vec!["chat"]);
    }

    #[tokio::test]
    async fn dispatch_without_backends_is_a_no_op() {
        let dispatcher = NotificationDispatcher::new(Vec::new(), Duration::from_secs(1));
        assert_eq!(dispatcher.dispatch(&record(), "x").await, DispatchReport::default());
    }

    #[test]
    fn build_notifiers_with_nothing_selected_is_empty() {
        let notifiers = build_notifiers(&Config::default()).unwrap();
        assert!(notifiers.is_empty());
    }

    #[test]
    fn build_notifiers_rejects_email_without_credentials() {
        let mut config = Config::default();
        config.email.to = vec!["ops@example.com".to_string()];
        let err = build_notifiers(&config).err().unwrap();
        assert!(matches!(err, ConfigError::MissingSetting { backend: "email", .. }));
    }

    #[test]
    fn build_notifiers_rejects_channels_without_webhook() {
        let mut config = Config::default();
        config.chat.channels = vec!["#ops".to_string()];
        let err = build_notifiers(&config).err().unwrap();
        assert!(matches!(err, ConfigError::MissingSetting { backend: "chat", .. }));
    }

    #[test]
    fn build_notifiers_builds_chat_backend() {
        let mut config = Config::default();
        config.chat.webhook_url = Some("http://127.0.0.1:9/hook".to_string());
        let notifiers = build_notifiers(&config).unwrap();
        assert_eq!(notifiers.len(), 1);
        assert_eq!(notifiers[0].name(), "chat");
    }
}
