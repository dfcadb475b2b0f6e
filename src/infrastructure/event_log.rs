//! Operator-facing event log.
//!
//! Every message is traced and forwarded to the presentation as an
//! [`AppEvent::LogMessage`].

use crate::domain::models::{AppEvent, MessageSeverity, StatusMessage};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EventLog {
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl EventLog {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { event_sender }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.send_log(message, MessageSeverity::Info);
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.send_log(message, MessageSeverity::Success);
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.send_log(message, MessageSeverity::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.send_log(message, MessageSeverity::Error);
    }

    /// Forward a non-log event on the same channel
    pub fn emit(&self, event: AppEvent) {
        // The UI may already be gone during shutdown
        let _ = self.event_sender.send(event);
    }

    fn send_log(&self, message: String, severity: MessageSeverity) {
        self.emit(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_classified() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let log = EventLog::new(tx);
        let before = chrono::Local::now();
        log.info("scanning");
        log.warning("retrying");

        match rx.try_recv().unwrap() {
            AppEvent::LogMessage(msg) => {
                assert_eq!(msg.message, "scanning");
                assert_eq!(msg.severity, MessageSeverity::Info);
                assert!(msg.timestamp >= before);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            AppEvent::LogMessage(msg) => assert_eq!(msg.severity, MessageSeverity::Warning),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        EventLog::new(tx).error("nobody listening");
    }
}
