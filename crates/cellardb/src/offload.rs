//! A small worker pool for running blocking work off the caller's thread.
//!
//! [`Offloader::spawn`] queues a closure and returns a [`Ticket`] the caller
//! can wait on. Save and load use it so an application thread that must stay
//! responsive can hand file I/O to a worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};

use crate::config::OffloadConfig;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a [`Ticket`] has no result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffloadError {
    /// The job panicked; holds the panic message when it was a string.
    #[error("offloaded job panicked: {0}")]
    Panicked(String),

    /// The pool shut down before the job ran.
    #[error("offload pool shut down before the job completed")]
    Disconnected,

    /// `wait_timeout` gave up before the job finished.
    #[error("timed out waiting for offloaded job")]
    TimedOut,
}

/// The pending result of an offloaded job.
#[derive(Debug)]
pub struct Ticket<T> {
    receiver: Receiver<Result<T, OffloadError>>,
}

impl<T> Ticket<T> {
    /// Blocks until the job finishes.
    pub fn wait(self) -> Result<T, OffloadError> {
        self.receiver.recv().unwrap_or(Err(OffloadError::Disconnected))
    }

    /// Blocks for at most `timeout`. On [`OffloadError::TimedOut`] the job
    /// keeps running but its result is discarded.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, OffloadError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(OffloadError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(OffloadError::Disconnected),
        }
    }

    /// Returns the result if the job has finished, or the ticket back if not.
    pub fn try_take(self) -> std::result::Result<Result<T, OffloadError>, Self> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(OffloadError::Disconnected)),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// A fixed pool of worker threads sharing one job queue.
///
/// Dropping the pool lets queued jobs finish, then joins the workers.
pub struct Offloader {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl Offloader {
    /// Starts `config.workers` threads (at least one).
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a thread cannot be spawned.
    pub fn new(config: OffloadConfig) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let count = config.workers.max(1);

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("{}-{id}", config.thread_name))
                .spawn(move || loop {
                    let job = {
                        let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
                        receiver.recv()
                    };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })?;
            workers.push(handle);
        }
        debug!(workers = count, "offload pool started");
        Ok(Self { sender: Some(sender), workers })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job` and returns a ticket for its result.
    ///
    /// A panic inside `job` is caught and reported through the ticket; the
    /// worker survives it.
    pub fn spawn<T, F>(&self, job: F) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let wrapped: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
                let message = panic_message(payload.as_ref());
                error!(%message, "offloaded job panicked");
                OffloadError::Panicked(message)
            });
            // The caller may have dropped the ticket.
            let _ = tx.send(result);
        });
        if let Some(sender) = &self.sender {
            // A failed send drops `wrapped` and with it `tx`, so the ticket
            // reports `Disconnected`.
            let _ = sender.send(wrapped);
        }
        Ticket { receiver: rx }
    }
}

impl Drop for Offloader {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for Offloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Offloader").field("workers", &self.workers.len()).finish()
    }
}
