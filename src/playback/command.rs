//! External player invocation.

use std::process::Stdio;

use tokio::process::Command;
use url::Url;

use crate::playback::PlaybackSink;

/// Runs `program args... <url>` for every accepted URL.
///
/// The child is spawned on its own task; its exit status is logged.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The player invocation for `url`: configured arguments, then the URL.
    pub fn command(&self, url: &Url) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(false);
        command
    }
}

impl PlaybackSink for CommandSink {
    fn handle(&self, url: Url) {
        let mut command = self.command(&url);
        let program = self.program.clone();
        tokio::spawn(async move {
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    tracing::error!(program = %program, error = %e, "Failed to launch player");
                    return;
                }
            };
            tracing::info!(program = %program, url = %url, pid = ?child.id(), "Player launched");

            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!(program = %program, "Player exited");
                }
                Ok(status) => {
                    tracing::warn!(program = %program, status = %status, "Player exited with failure");
                }
                Err(e) => {
                    tracing::error!(program = %program, error = %e, "Failed to wait for player");
                }
            }
        });
    }
}
