//! Bounded pool of training threads
//!
//! Jobs are queued on a channel shared by a fixed number of OS threads. Each
//! job reports back on its own channel, so a caller can wait with a deadline
//! and poll again later if training is still running.

use crate::error::{ForecastError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads
pub struct TrainingPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

/// Handle on the result of a submitted job
#[derive(Debug)]
pub struct TrainingTicket<T> {
    label: String,
    receiver: Receiver<Result<T>>,
}

impl TrainingPool {
    /// Spawn `size` workers (at least one)
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let jobs = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("stockcast-train-{}", id))
                .spawn(move || {
                    for job in jobs.iter() {
                        job();
                    }
                    debug!(worker = id, "training worker stopped");
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job and return a ticket for its result
    ///
    /// A panicking job is reported as a `TrainingFailure` on its ticket.
    pub fn submit<T, F>(&self, label: impl Into<String>, job: F) -> Result<TrainingTicket<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job_label = label.clone();

        let wrapped: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                error!(job = %job_label, "training job panicked");
                Err(ForecastError::TrainingFailure(format!(
                    "{} panicked during training",
                    job_label
                )))
            });
            // The ticket may have been dropped already
            let _ = tx.send(outcome);
        });

        let sender = self.sender.as_ref().ok_or_else(|| {
            ForecastError::TrainingFailure("training pool is shut down".to_string())
        })?;
        sender.send(wrapped).map_err(|_| {
            ForecastError::TrainingFailure("training pool is shut down".to_string())
        })?;

        Ok(TrainingTicket {
            label,
            receiver: rx,
        })
    }
}

impl Drop for TrainingPool {
    fn drop(&mut self) {
        // Closing the queue lets workers drain it and exit
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("training worker exited with a panic");
            }
        }
    }
}

impl<T> TrainingTicket<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait up to `timeout` for the job to finish
    ///
    /// On timeout the job keeps running and the ticket can be waited on again.
    pub fn wait(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(ForecastError::StillTraining(format!(
                "{} did not finish within {:?}",
                self.label, timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(self.lost()),
        }
    }

    /// Non-blocking check; `None` while the job is still running
    pub fn try_result(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.lost())),
        }
    }

    fn lost(&self) -> ForecastError {
        ForecastError::TrainingFailure(format!("{} finished without a result", self.label))
    }
}
