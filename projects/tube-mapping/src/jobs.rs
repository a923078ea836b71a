// Single-slot background job runner
//
// At most one map computation runs at a time. A second launch while one is in
// flight is rejected, not queued. Outcomes are delivered over a one-shot
// crossbeam channel after the busy flag has been released.

use crate::error::{Notification, PipelineResult};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, TryRecvError};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use thiserror::Error;

pub type JobOutcome<T> = Result<T, Notification>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running {
        job: String,
        started_at: DateTime<Utc>,
    },
    /// Set only after the work closure has returned.
    Finished {
        job: String,
        finished_at: DateTime<Utc>,
    },
    Failed {
        job: String,
        notification: Notification,
    },
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("a job is already running")]
    Busy,

    #[error("failed to spawn job thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Clears the busy flag however the worker exits.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobRunner {
    busy: Arc<AtomicBool>,
    status: Arc<RwLock<JobStatus>>,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(JobStatus::Idle)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn status(&self) -> JobStatus {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs `work` on a dedicated thread unless another job is in flight.
    pub fn launch<T, F>(&self, name: impl Into<String>, work: F) -> Result<JobHandle<T>, JobError>
    where
        T: Send + 'static,
        F: FnOnce() -> PipelineResult<T> + Send + 'static,
    {
        let job = name.into();

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("JobRunner: rejected {}, another job is running", job);
            return Err(JobError::Busy);
        }

        set_status(
            &self.status,
            JobStatus::Running {
                job: job.clone(),
                started_at: Utc::now(),
            },
        );

        let (tx, rx) = channel::bounded(1);
        let busy = self.busy.clone();
        let status = self.status.clone();
        let worker_job = job.clone();

        let spawned = thread::Builder::new()
            .name(format!("job-{}", job))
            .spawn(move || {
                let guard = BusyGuard(busy);
                let start_inst = std::time::Instant::now();

                let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        tracing::warn!("JobRunner: {} failed: {}", worker_job, e);
                        Err(e.notification())
                    }
                    Err(_) => {
                        tracing::error!("JobRunner: {} panicked", worker_job);
                        Err(Notification::unknown())
                    }
                };

                let next = match &outcome {
                    Ok(_) => {
                        tracing::info!(
                            "JobRunner: {} finished in {:.2}s",
                            worker_job,
                            start_inst.elapsed().as_secs_f64()
                        );
                        JobStatus::Finished {
                            job: worker_job,
                            finished_at: Utc::now(),
                        }
                    }
                    Err(notification) => JobStatus::Failed {
                        job: worker_job,
                        notification: notification.clone(),
                    },
                };
                set_status(&status, next);

                drop(guard);
                let _ = tx.send(outcome);
            });

        match spawned {
            Ok(_) => Ok(JobHandle { job, rx }),
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                set_status(
                    &self.status,
                    JobStatus::Failed {
                        job,
                        notification: Notification::unknown(),
                    },
                );
                Err(JobError::Spawn(e))
            }
        }
    }
}

fn set_status(status: &RwLock<JobStatus>, next: JobStatus) {
    *status.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
}

/// Receiving end of one launched job.
pub struct JobHandle<T> {
    job: String,
    rx: Receiver<JobOutcome<T>>,
}

impl<T> JobHandle<T> {
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Blocks until the job delivers its outcome.
    pub fn wait(self) -> JobOutcome<T> {
        self.rx.recv().unwrap_or_else(|_| Err(Notification::unknown()))
    }

    /// Returns the outcome if the job is done, `None` while it is still running.
    pub fn try_outcome(&self) -> Option<JobOutcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Notification::unknown())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::path::PathBuf;

    #[test]
    fn test_second_launch_rejected_while_busy() {
        let runner = JobRunner::new();
        let (release_tx, release_rx) = channel::bounded::<()>(0);

        let handle = runner
            .launch("first", move || {
                release_rx.recv().ok();
                Ok(1)
            })
            .unwrap();
        assert!(runner.is_busy());
        assert!(matches!(
            runner.status(),
            JobStatus::Running { ref job, .. } if job == "first"
        ));
        assert!(handle.try_outcome().is_none());

        assert!(matches!(
            runner.launch("second", || Ok(2)),
            Err(JobError::Busy)
        ));

        release_tx.send(()).unwrap();
        assert_eq!(handle.wait(), Ok(1));
        assert!(!runner.is_busy());
        assert!(matches!(
            runner.status(),
            JobStatus::Finished { ref job, .. } if job == "first"
        ));

        // Slot is free again
        assert_eq!(runner.launch("third", || Ok(3)).unwrap().wait(), Ok(3));
    }

    #[test]
    fn test_pipeline_error_becomes_notification() {
        let runner = JobRunner::new();
        let handle = runner
            .launch::<(), _>("empty", || {
                Err(PipelineError::NoFrames {
                    path: PathBuf::from("empty.mp4"),
                })
            })
            .unwrap();

        let note = handle.wait().unwrap_err();
        assert_eq!(note.title, "No frames");
        assert!(!runner.is_busy());
        assert!(matches!(runner.status(), JobStatus::Failed { .. }));
    }

    #[test]
    fn test_panic_is_caught_and_slot_released() {
        let runner = JobRunner::new();
        let handle = runner
            .launch::<(), _>("boom", || panic!("decoder exploded"))
            .unwrap();

        assert_eq!(handle.wait(), Err(Notification::unknown()));
        assert!(!runner.is_busy());
        assert_eq!(
            runner.status(),
            JobStatus::Failed {
                job: "boom".to_string(),
                notification: Notification::unknown(),
            }
        );
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let json = serde_json::to_value(JobStatus::Idle).unwrap();
        assert_eq!(json["state"], "idle");
    }
}
