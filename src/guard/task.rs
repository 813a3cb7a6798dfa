use std::future::Future;

use tokio::task::JoinHandle;

use crate::guard::GuardOutcome;

/// One in-flight guard evaluation.
///
/// Dropping or aborting the handle models unmounting the guarded page:
/// the evaluation is cancelled and whatever it would have concluded is
/// discarded. A cancelled check reads as `Pending`, so it can never
/// authorize or redirect after the fact.
pub struct GuardTask {
    handle: JoinHandle<GuardOutcome>,
}

impl GuardTask {
    pub fn spawn<F>(check: F) -> Self
    where
        F: Future<Output = GuardOutcome> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(check),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the evaluation. Cancelled checks settle as `Pending`.
    pub async fn outcome(mut self) -> GuardOutcome {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(_) => GuardOutcome::Pending,
        }
    }
}

impl Drop for GuardTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
