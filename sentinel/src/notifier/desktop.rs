use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use super::{NotificationContext, Notifier};
use crate::error::{ConfigError, DeliveryError};

const BACKEND: &str = "desktop";
const NOTIFY_PROGRAM: &str = "notify-send";

/// Pops up a desktop notification through the freedesktop `notify-send` helper.
pub struct DesktopNotifier {
    program: PathBuf,
}

impl DesktopNotifier {
    /// Locates `notify-send` on `PATH`.
    pub fn new() -> Result<Self, ConfigError> {
        let program = which::which(NOTIFY_PROGRAM).map_err(|e| ConfigError::Unavailable {
            backend: BACKEND,
            reason: format!("{NOTIFY_PROGRAM} not found ({e}); install libnotify"),
        })?;
        Ok(Self::with_program(program))
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn send(&self, ctx: &NotificationContext<'_>) -> Result<(), DeliveryError> {
        let output = Command::new(&self.program)
            .arg("--app-name=sentinel")
            .arg(&ctx.subject)
            .arg(&ctx.description)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeliveryError::Transport(format!("failed to run {}: {e}", self.program.display())))?;

        if !output.status.success() {
            return Err(DeliveryError::Transport(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
