//! Background Worker
//!
//! A single dedicated thread that runs deferred jobs handed in by the host
//! engine (compactions and other maintenance), strictly one at a time in
//! arrival order. The thread is started by the first `schedule` call.
//!
//! Jobs have no error channel: a job that panics is logged and the worker
//! moves on to the next one.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{RawStoreError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Running {
    sender: Sender<Job>,
    handle: JoinHandle<()>,
}

/// FIFO job queue drained by one background thread
pub struct BackgroundWorker {
    name: String,
    running: Mutex<Option<Running>>,
}

impl BackgroundWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
        }
    }

    /// Queue `job` behind everything already scheduled
    pub fn schedule<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut running = self.running.lock();

        let state = match running.take() {
            Some(state) => running.insert(state),
            None => {
                let (sender, receiver) = channel::unbounded::<Job>();
                let handle = thread::Builder::new()
                    .name(self.name.clone())
                    .spawn(move || run(receiver))?;
                debug!(worker = %self.name, "started background thread");
                running.insert(Running { sender, handle })
            }
        };

        state.sender.send(Box::new(job)).map_err(|_| {
            RawStoreError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "background worker stopped"))
        })
    }

    /// Jobs queued but not yet started
    pub fn pending(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map(|state| state.sender.len())
            .unwrap_or(0)
    }

    /// Whether the background thread has been started
    pub fn is_started(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Drop for BackgroundWorker {
    /// Close the queue and wait for queued jobs to finish
    fn drop(&mut self) {
        if let Some(Running { sender, handle }) = self.running.get_mut().take() {
            drop(sender);
            if handle.join().is_err() {
                error!(worker = %self.name, "background thread terminated abnormally");
            }
        }
    }
}

fn run(receiver: Receiver<Job>) {
    for job in receiver {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("background job panicked");
        }
    }
}
