//! Bounded task runners.
//!
//! An [`Asyncer`] runs submitted tasks either one after another on the
//! caller's task ([`Asyncer::inline`]) or concurrently on a pool bounded by
//! a semaphore ([`Asyncer::pooled`]). Both hand every task a cancellation
//! token derived from the parent token.
//!
//! With `cancel_on_error` the first failure cancels that token, submissions
//! after it are skipped, and [`Asyncer::wait`] returns that first error.
//! Without it every task runs and all failures are returned together.

use crate::error::ExecutorError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub enum Asyncer {
    Inline(InlineAsyncer),
    Pooled(PooledAsyncer),
}

impl Asyncer {
    /// Pooled of `size` when `concurrent`, inline otherwise.
    pub fn new(
        concurrent: bool,
        size: usize,
        cancel_on_error: bool,
        parent: &CancellationToken,
    ) -> Self {
        if concurrent {
            Self::pooled(size, cancel_on_error, parent)
        } else {
            Self::inline(cancel_on_error, parent)
        }
    }

    pub fn inline(cancel_on_error: bool, parent: &CancellationToken) -> Self {
        Asyncer::Inline(InlineAsyncer {
            token: parent.child_token(),
            cancel_on_error,
            errors: Vec::new(),
            skipped: false,
        })
    }

    /// A pool running at most `size` tasks at once (at least one).
    pub fn pooled(size: usize, cancel_on_error: bool, parent: &CancellationToken) -> Self {
        let size = size.clamp(1, Semaphore::MAX_PERMITS);
        Asyncer::Pooled(PooledAsyncer {
            token: parent.child_token(),
            permits: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            cancel_on_error,
            errors: Vec::new(),
            skipped: false,
        })
    }

    /// Token handed to every task; cancelled on the first failure with
    /// `cancel_on_error`, or when the parent is cancelled.
    pub fn token(&self) -> &CancellationToken {
        match self {
            Asyncer::Inline(inline) => &inline.token,
            Asyncer::Pooled(pooled) => &pooled.token,
        }
    }

    /// Submit a task. Inline runs it to completion before returning; pooled
    /// waits for a free slot and spawns it. Skipped once cancelled.
    pub async fn go<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), ExecutorError>> + Send + 'static,
    {
        match self {
            Asyncer::Inline(inline) => inline.go(task).await,
            Asyncer::Pooled(pooled) => pooled.go(task).await,
        }
    }

    /// Wait for every submitted task and report the outcome.
    pub async fn wait(self) -> Result<(), ExecutorError> {
        match self {
            Asyncer::Inline(inline) => inline.finish(),
            Asyncer::Pooled(pooled) => pooled.wait().await,
        }
    }
}

pub struct InlineAsyncer {
    token: CancellationToken,
    cancel_on_error: bool,
    errors: Vec<ExecutorError>,
    skipped: bool,
}

impl InlineAsyncer {
    async fn go<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), ExecutorError>>,
    {
        if self.token.is_cancelled() {
            self.skipped = true;
            return;
        }

        if let Err(e) = task(self.token.clone()).await {
            record(&mut self.errors, &self.token, self.cancel_on_error, e);
        }
    }

    fn finish(self) -> Result<(), ExecutorError> {
        outcome(self.errors, self.skipped)
    }
}

pub struct PooledAsyncer {
    token: CancellationToken,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<(), ExecutorError>>,
    cancel_on_error: bool,
    errors: Vec<ExecutorError>,
    skipped: bool,
}

impl PooledAsyncer {
    async fn go<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), ExecutorError>> + Send + 'static,
    {
        while let Some(joined) = self.tasks.try_join_next() {
            self.collect(joined);
        }

        let permit = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            debug!("Skipping task submission, pool is cancelled");
            self.skipped = true;
            return;
        };

        let token = self.token.clone();
        let cancel_on_error = self.cancel_on_error;
        let future = task(token.clone());
        self.tasks.spawn(async move {
            let result = future.await;
            // Cancel before freeing the slot so no new task slips in
            if result.is_err() && cancel_on_error {
                token.cancel();
            }
            drop(permit);
            result
        });
    }

    async fn wait(mut self) -> Result<(), ExecutorError> {
        while let Some(joined) = self.tasks.join_next().await {
            self.collect(joined);
        }
        outcome(self.errors, self.skipped)
    }

    fn collect(&mut self, joined: Result<Result<(), ExecutorError>, JoinError>) {
        let err = match joined {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(e) => ExecutorError::TaskPanicked(e.to_string()),
        };
        record(&mut self.errors, &self.token, self.cancel_on_error, err);
    }
}

/// Skipped work with nothing else to report still fails the run.
fn outcome(errors: Vec<ExecutorError>, skipped: bool) -> Result<(), ExecutorError> {
    if errors.is_empty() && skipped {
        return Err(ExecutorError::Cancelled);
    }
    ExecutorError::join(errors)
}

/// Keep the first error under `cancel_on_error` and every error otherwise.
///
/// Tasks stopped by the cancellation can be joined before the task whose
/// failure caused it, so a real failure replaces a kept cancellation.
fn record(
    errors: &mut Vec<ExecutorError>,
    token: &CancellationToken,
    cancel_on_error: bool,
    err: ExecutorError,
) {
    if !cancel_on_error {
        errors.push(err);
        return;
    }
    token.cancel();
    if errors.is_empty() {
        errors.push(err);
    } else if errors[0].is_cancelled() && !err.is_cancelled() {
        errors[0] = err;
    }
}
