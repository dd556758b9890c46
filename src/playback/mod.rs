//! Playback hand-off.
//!
//! The server never decodes media. An accepted URL is handed to a
//! [`PlaybackSink`] exactly once; the sink must return promptly and do any
//! slow work on its own task.

pub mod command;

use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::config::schema::PlaybackConfig;

pub use command::CommandSink;

/// Receives validated media URLs.
pub trait PlaybackSink: Send + Sync + 'static {
    /// Called once per request that will be answered with `200 OK`.
    fn handle(&self, url: Url);
}

impl<F> PlaybackSink for F
where
    F: Fn(Url) + Send + Sync + 'static,
{
    fn handle(&self, url: Url) {
        self(url)
    }
}

/// Forwards URLs into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Url>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Url>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PlaybackSink for ChannelSink {
    fn handle(&self, url: Url) {
        if self.tx.send(url).is_err() {
            tracing::warn!("Playback receiver dropped, discarding URL");
        }
    }
}

/// Only logs accepted URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl PlaybackSink for LogSink {
    fn handle(&self, url: Url) {
        tracing::info!(url = %url, "Playback requested");
    }
}

/// Build the sink described by `[playback]`.
pub fn sink_from_config(config: &PlaybackConfig) -> Arc<dyn PlaybackSink> {
    match config.command.as_deref() {
        Some([program, args @ ..]) => Arc::new(CommandSink::new(program.clone(), args.to_vec())),
        _ => Arc::new(LogSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let sink: Arc<dyn PlaybackSink> = Arc::new(move |url: Url| recorder.lock().unwrap().push(url));

        sink.handle(Url::parse("rtsp://cam.local/live").unwrap());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.handle(Url::parse("https://example.com/stream").unwrap());
        assert_eq!(rx.recv().await.unwrap().as_str(), "https://example.com/stream");
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.handle(Url::parse("https://example.com/stream").unwrap());
    }
}
