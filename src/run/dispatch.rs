//! Running the per-variable jobs of a run, one after another or side by side.

use std::time::Duration;

use anyhow::{Error, Result};
use futures::future::join_all;
use tokio::{task, time::sleep};
use tracing::debug;

/// A blocking unit of work, run on tokio's blocking pool.
pub type Job<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// One job at a time, stopping at the first failure.
    Serial,
    /// All jobs concurrently, the i-th launched `i` gaps after the first so
    /// the server is not hit by every request at once.
    Staggered(Duration),
}

impl DispatchPolicy {
    pub fn from_flags(parallel: bool, stagger: Duration) -> Self {
        if parallel {
            DispatchPolicy::Staggered(stagger)
        } else {
            DispatchPolicy::Serial
        }
    }

    /// Delay between the first launch and the launch of job `index`.
    pub fn launch_delay(&self, index: usize) -> Duration {
        match self {
            DispatchPolicy::Serial => Duration::ZERO,
            DispatchPolicy::Staggered(gap) => gap.saturating_mul(index as u32),
        }
    }
}

/// Runs `jobs` under `policy`, returning their results in job order.
///
/// Staggered jobs all run to completion before the first error, if any, is
/// returned.
pub async fn dispatch<T, E>(policy: DispatchPolicy, jobs: Vec<Job<T, E>>) -> Result<Vec<T>>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    match policy {
        DispatchPolicy::Serial => {
            let mut results = Vec::with_capacity(jobs.len());
            for job in jobs {
                results.push(task::spawn_blocking(job).await??);
            }

            Ok(results)
        }
        DispatchPolicy::Staggered(_) => {
            let tasks: Vec<_> = jobs
                .into_iter()
                .enumerate()
                .map(|(index, job)| {
                    let delay = policy.launch_delay(index);
                    tokio::spawn(async move {
                        sleep(delay).await;
                        debug!(job = index, "Launching job");
                        task::spawn_blocking(job).await
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(tasks.len());
            let mut first_error: Option<Error> = None;

            for outcome in join_all(tasks).await {
                let outcome = match outcome {
                    Ok(Ok(result)) => result.map_err(Error::from),
                    Ok(Err(e)) | Err(e) => Err(Error::from(e)),
                };

                match outcome {
                    Ok(value) => results.push(value),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(results),
            }
        }
    }
}

// -- Tests -------------------------------------------------------------------
