//! Bounded task group
//!
//! Runs tasks with at most `limit` in flight. The first failure cancels the
//! group: tasks still waiting for a slot never start, tasks already running
//! finish on their own.

use fleetd_core::error::{FleetError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct TaskGroup<T> {
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    tasks: JoinSet<Result<Option<T>>>,
    limit: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue a task; it starts once a slot is free
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let token = self.token.clone();

        self.tasks.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Ok(None),
                },
            };

            if token.is_cancelled() {
                return Ok(None);
            }

            task.await.map(Some)
        });
    }

    /// Wait for every task. Returns the outputs of the tasks that ran, or
    /// the first error.
    pub async fn wait(mut self) -> Result<Vec<T>> {
        let mut outputs = Vec::with_capacity(self.tasks.len());
        let mut first_error: Option<FleetError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined.map_err(FleetError::from).and_then(|r| r) {
                Ok(Some(output)) => outputs.push(output),
                Ok(None) => {}
                Err(e) if first_error.is_none() => {
                    self.token.cancel();
                    first_error = Some(e);
                }
                Err(e) => debug!(error = %e, "Task failed after group cancellation"),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}
