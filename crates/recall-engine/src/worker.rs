//! Per-member worker threads.

use std::sync::Arc;
use std::thread::JoinHandle;

use recall_core::SoundScope;

use crate::error::{Error, Result};
use crate::rendezvous::Rendezvous;

/// Thread that runs one member's stages when signalled.
///
/// The worker sleeps on its [`Rendezvous`]; each wake carries the scope to
/// tick. Dropping the worker stops and joins the thread.
#[derive(Debug)]
pub struct Worker {
    name: String,
    rendezvous: Arc<Rendezvous<SoundScope>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a worker that calls `job` once per signalled scope.
    pub fn spawn<F>(name: impl Into<String>, mut job: F) -> Result<Self>
    where
        F: FnMut(SoundScope) + Send + 'static,
    {
        let name = name.into();
        let rendezvous = Arc::new(Rendezvous::new());
        let rv = Arc::clone(&rendezvous);
        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(worker = %thread_name, "worker started");
                while let Some(scope) = rv.wait() {
                    let finish = Finish(&rv);
                    job(scope);
                    drop(finish);
                }
                tracing::debug!(worker = %thread_name, "worker stopped");
            })
            .map_err(|source| Error::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            rendezvous,
            thread: Some(thread),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker's rendezvous.
    pub fn rendezvous(&self) -> &Arc<Rendezvous<SoundScope>> {
        &self.rendezvous
    }

    /// Stops the worker and waits for its thread.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.rendezvous.stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!(worker = %self.name, "worker panicked");
        }
    }
}

/// Reports the running job finished, or stops the rendezvous when the job
/// unwinds so the scheduler's collect returns instead of waiting forever.
struct Finish<'a>(&'a Rendezvous<SoundScope>);

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.stop();
        } else {
            self.0.complete();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
