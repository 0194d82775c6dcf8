//! Command-scoped cooperative sub-tasks ("sparks").
//!
//! A spark lets a command fan out concurrent sub-requests (e.g. one
//! `fundchannel_start` per destination) while keeping the command the owner
//! of all of them: dropping a spark handle cancels its task, so when the
//! command body returns, whether with success or failure, every outstanding
//! spark is cancelled at its next suspension point, and responses to RPCs it
//! had in flight are dropped.
//!
//! A spark begins executing at the caller's next yield. Joining consumes the
//! handle, so there is at most one waiter per spark.

use std::borrow::Cow;

use tracing::debug;
use waypoint_common::task::Task;

/// The result of joining a spark.
pub type SparkResult<T> = Result<T, Cancelled>;

/// The spark was cancelled before it signalled completion.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("spark was cancelled")]
pub struct Cancelled;

/// A handle on one command-scoped sub-task. Dropping it cancels the task.
#[must_use]
pub struct Spark<T> {
    task: Option<Task<T>>,
    name: Cow<'static, str>,
}

impl<T: Send + 'static> Spark<T> {
    /// Start a spark. The body begins executing the next time the calling
    /// code yields.
    pub fn start<F>(
        name: impl Into<Cow<'static, str>>,
        body: F,
    ) -> Spark<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
    {
        let name = name.into();
        Spark {
            task: Some(Task::spawn(name.clone(), body)),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for this spark to signal completion. Consumes the handle: a
    /// spark has at most one waiter.
    pub async fn join(mut self) -> SparkResult<T> {
        let task = self.task.take().expect("only taken here and in Drop");
        // Panics propagate through `Task`; the only remaining join error is
        // cancellation.
        task.await.map_err(|_| Cancelled)
    }
}

impl<T> Drop for Spark<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(
                    "Cancelling spark '{name}'; any in-flight response will \
                     be dropped",
                    name = self.name,
                );
            }
            task.abort();
        }
    }
}

/// Wait for all the given sparks. Results come back aligned with the input
/// order, which is what fan-out callers pair with their request lists.
pub async fn wait_all<T: Send + 'static>(
    sparks: Vec<Spark<T>>,
) -> Vec<SparkResult<T>> {
    futures::future::join_all(sparks.into_iter().map(Spark::join)).await
}
