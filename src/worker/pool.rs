//! Worker pool
//!
//! Spawns one OS thread per worker and reports how each one ended over a
//! channel, so the coordinator can wait for "first worker hit a limit" or
//! "first worker failed" without joining threads.

use super::{Worker, WorkerExit};
use crate::engine::EngineContext;
use crate::Result;
use anyhow::Context;
use crossbeam::channel::{unbounded, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// How a worker ended
#[derive(Debug)]
pub enum WorkerEvent {
    Exited { id: usize, exit: WorkerExit },
    Failed { id: usize, error: anyhow::Error },
}

/// Running workers
pub struct WorkerPool {
    events: Receiver<WorkerEvent>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn one thread per counter slot of `ctx`
    ///
    /// If a thread cannot be spawned, the workers already running are asked
    /// to stop and the error is returned.
    pub fn spawn(ctx: &Arc<EngineContext>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let mut handles = Vec::with_capacity(ctx.workers());

        for id in 0..ctx.workers() {
            let worker_ctx = Arc::clone(ctx);
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("nvbench-w{}", id))
                .spawn(move || {
                    let debug = worker_ctx.debug;
                    let event = match Worker::new(id, worker_ctx).run() {
                        Ok(exit) => WorkerEvent::Exited { id, exit },
                        Err(error) => WorkerEvent::Failed { id, error },
                    };
                    if debug {
                        eprintln!("DEBUG: {:?}", event);
                    }
                    // The coordinator may already be gone
                    let _ = tx.send(event);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    ctx.request_stop();
                    return Err(e).with_context(|| format!("Failed to spawn worker {}", id));
                }
            }
        }

        if ctx.debug {
            eprintln!("DEBUG: Spawned {} workers", handles.len());
        }

        Ok(Self {
            events: rx,
            handles,
        })
    }

    /// Worker end notifications, one per worker
    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker thread to end
    pub fn join(self) -> Result<()> {
        for handle in self.handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("Worker thread panicked"))?;
        }
        Ok(())
    }
}
