//! User-facing notices.
//!
//! The controller reports progress and failures through a [`Notifier`];
//! how a notice is displayed belongs to the host.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// A message addressed to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

/// Receives user notices. Fire-and-forget: implementations must not fail.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NoticeKind);
}

/// Writes notices to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, kind: NoticeKind) {
        match kind {
            NoticeKind::Error => error!(notice = message, "User notice"),
            NoticeKind::Info | NoticeKind::Success => info!(notice = message, ?kind, "User notice"),
        }
    }
}

/// Forwards notices to a channel the host drains
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notice>) -> Self {
        Self { tx }
    }

    /// Create a notifier together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str, kind: NoticeKind) {
        let notice = Notice {
            message: message.to_string(),
            kind,
        };
        if self.tx.send(notice).is_err() {
            debug!("Notice receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        notifier.notify("one", NoticeKind::Info);
        notifier.notify("two", NoticeKind::Error);

        assert_eq!(rx.try_recv().unwrap().message, "one");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, NoticeKind::Error);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        notifier.notify("nobody listens", NoticeKind::Success);
    }
}
