//! Pipeline phases and progress reporting.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// The state of a create or restore call.
///
/// A create call moves through:
/// 1. [`Snapshotting`](Self::Snapshotting)
/// 2. [`Diffing`](Self::Diffing)
/// 3. [`Deduplicating`](Self::Deduplicating)
/// 4. [`Serializing`](Self::Serializing)
/// 5. [`Compressing`](Self::Compressing)
/// 6. [`Encrypting`](Self::Encrypting)
/// 7. [`Writing`](Self::Writing)
/// 8. [`Cataloging`](Self::Cataloging)
/// 9. [`CleaningUp`](Self::CleaningUp)
///
/// A restore call moves through [`Reading`](Self::Reading),
/// [`Verifying`](Self::Verifying), [`Decrypting`](Self::Decrypting),
/// [`Decompressing`](Self::Decompressing), [`Parsing`](Self::Parsing),
/// [`Reconstructing`](Self::Reconstructing), [`Filtering`](Self::Filtering)
/// and, when restoring into a target, [`Applying`](Self::Applying).
///
/// Both end in [`Idle`](Self::Idle) on success or [`Failed`](Self::Failed)
/// on the first error.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Phase {
    Idle,
    Snapshotting,
    Diffing,
    Deduplicating,
    Serializing,
    Compressing,
    Encrypting,
    Writing,
    Cataloging,
    CleaningUp,
    Reading,
    Verifying,
    Decrypting,
    Decompressing,
    Parsing,
    Reconstructing,
    Filtering,
    Applying,
    #[display("Failed({_0})")]
    Failed(String),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed(_))
    }
}

/// Receives every phase transition of every call made through an engine.
pub type ProgressSender = UnboundedSender<Phase>;

/// Per-call phase bookkeeping: logs transitions, forwards them to the
/// progress channel and checks for cancellation.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    operation: &'static str,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl Tracker {
    pub(crate) fn new(operation: &'static str, progress: Option<ProgressSender>, cancel: CancellationToken) -> Self {
        Self { operation, progress, cancel }
    }

    /// Move to `phase`, unless the call has been cancelled.
    pub(crate) fn enter(&self, phase: Phase) -> Result<()> {
        self.check()?;
        self.report(phase);
        Ok(())
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        Ok(())
    }

    /// Move to `phase` unconditionally.
    pub(crate) fn report(&self, phase: Phase) {
        tracing::debug!(operation = self.operation, %phase, "phase");
        if let Some(progress) = &self.progress {
            // Nobody listening any more is not our problem.
            _ = progress.send(phase);
        }
    }

    /// Report the terminal phase for `result` and pass it through.
    pub(crate) fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.report(Phase::Idle),
            Err(err) => {
                let kind: &ErrorKind = err;
                tracing::warn!(operation = self.operation, error = %kind, "failed");
                self.report(Phase::Failed(kind.to_string()));
            },
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_phases_are_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = Tracker::new("test", Some(tx), CancellationToken::new());
        tracker.enter(Phase::Reading).unwrap();
        tracker.finish(Ok(())).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Phase::Reading);
        assert_eq!(rx.try_recv().unwrap(), Phase::Idle);
    }

    #[test]
    fn test_failure_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = Tracker::new("test", Some(tx), CancellationToken::new());
        let result: Result<()> = Err(exn::Exn::from(ErrorKind::IntegrityViolation));
        assert!(tracker.finish(result).is_err());
        let phase = rx.try_recv().unwrap();
        assert!(phase.is_terminal());
        assert!(matches!(phase, Phase::Failed(reason) if reason.contains("integrity")));
    }

    #[test]
    fn test_cancelled_tracker_refuses_to_advance() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let tracker = Tracker::new("test", Some(tx), cancel.clone());
        cancel.cancel();
        let err = tracker.enter(Phase::Writing).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert!(rx.try_recv().is_err());
        // Reporting is still possible once committed.
        tracker.report(Phase::CleaningUp);
        assert_eq!(rx.try_recv().unwrap(), Phase::CleaningUp);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = Tracker::new("test", Some(tx), CancellationToken::new());
        tracker.enter(Phase::Diffing).unwrap();
    }
}
