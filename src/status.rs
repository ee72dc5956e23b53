//! Status notifications and cancellation
//!
//! The pipeline worker reports stage boundaries to a [`StatusListener`].
//! Listeners must not block the worker.

use crate::error::{Error, ErrorKind, Result};
use crate::report::{BenchmarkReport, Stage};
use crossbeam_channel::TrySendError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Notification emitted by the pipeline worker
#[derive(Debug, Clone)]
pub enum StatusEvent {
    StageStarted(Stage),
    StageFinished { stage: Stage, elapsed: Duration },
    /// Terminal: run finished
    Completed(BenchmarkReport),
    /// Terminal: run aborted
    Failed {
        stage: Option<Stage>,
        kind: ErrorKind,
        message: String,
    },
}

impl StatusEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusEvent::Completed(_) | StatusEvent::Failed { .. })
    }

    pub(crate) fn failed(err: &Error) -> Self {
        StatusEvent::Failed {
            stage: err.stage(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Receiver of fire-and-forget status events
pub trait StatusListener: Send {
    fn notify(&self, event: StatusEvent);
}

/// Never blocks. Pass an unbounded channel: a full bounded one drops events,
/// the terminal one included.
impl StatusListener for crossbeam_channel::Sender<StatusEvent> {
    fn notify(&self, event: StatusEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) if event.is_terminal() => {
                tracing::warn!("Status channel full, terminal event dropped");
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Status channel full, event dropped");
            }
            // Receiver gone means nobody is watching
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl StatusListener for () {
    fn notify(&self, _event: StatusEvent) {}
}

/// Shared cancellation flag, checked at stage boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested before
    /// `next` began
    pub fn check(&self, next: Stage) -> Result<()> {
        if self.is_cancelled() {
            tracing::info!("Cancellation requested, not starting {} stage", next);
            return Err(Error::Cancelled(next));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check(Stage::Decode).is_ok());
        clone.cancel();
        let err = token.check(Stage::Resize).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.stage(), Some(Stage::Resize));
    }

    #[test]
    fn test_channel_listener_ignores_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        tx.notify(StatusEvent::StageStarted(Stage::Decode));
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.notify(StatusEvent::StageStarted(Stage::Decode));
        tx.notify(StatusEvent::failed(&Error::Cancelled(Stage::Resize)));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_terminal());
    }

    #[test]
    fn test_failed_event_carries_stage_and_kind() {
        let err = Error::InvalidSlot(3).in_stage(Stage::Encode);
        match StatusEvent::failed(&err) {
            StatusEvent::Failed { stage, kind, .. } => {
                assert_eq!(stage, Some(Stage::Encode));
                assert_eq!(kind, ErrorKind::InvalidSlot);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
