//! The simulation thread
//!
//! Live user state belongs to one dedicated OS thread. Async code hands it
//! closures and awaits the result; nothing else touches a [`DataOwner`]
//! directly.
//!
//! [`DataOwner`]: statehop_core::DataOwner

use crate::errors::{internal, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

const THREAD_NAME: &str = "statehop-sim";

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct SimThread {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimThread {
    /// # Errors
    ///
    /// `Internal` if the OS refuses to spawn the thread.
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("simulation job panicked");
                    }
                }
                tracing::debug!("simulation thread stopped");
            })
            .map_err(|e| internal("spawn_sim_thread", e.to_string()))?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Whether the caller is running on the simulation thread
    pub fn is_current() -> bool {
        thread::current().name() == Some(THREAD_NAME)
    }

    /// Run `job` on the simulation thread and wait for its result
    ///
    /// # Errors
    ///
    /// `Internal` if the thread has stopped or the job panicked.
    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        {
            let sender = self
                .sender
                .lock()
                .map_err(|_| internal("sim_run", "sender lock poisoned"))?;
            let sender = sender
                .as_ref()
                .ok_or_else(|| internal("sim_run", "simulation thread stopped"))?;
            sender
                .send(Box::new(move || {
                    let _ = tx.send(job());
                }))
                .map_err(|_| internal("sim_run", "simulation thread stopped"))?;
        }
        rx.await
            .map_err(|_| internal("sim_run", "simulation job dropped its result"))
    }

    /// Stop accepting jobs and join the thread once the queue drains
    pub fn stop(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("simulation thread panicked");
            }
        }
    }
}

impl Drop for SimThread {
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}
