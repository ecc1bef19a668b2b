// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-order work queue drained by one worker thread per engine.

use crate::OpError;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

enum Job {
    Run(Box<dyn FnOnce() + Send>),
    Fence(oneshot::Sender<()>),
}

/// Jobs run one at a time in submission order. Dropping the queue drains
/// what is already enqueued and joins the worker.
pub(crate) struct WorkQueue {
    engine: usize,
    tx: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl WorkQueue {
    pub(crate) fn spawn(engine: usize) -> Result<Self, OpError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = std::thread::Builder::new()
            .name(format!("engine-{engine}"))
            .spawn(move || {
                info!(engine, "engine worker started");
                while let Some(job) = rx.blocking_recv() {
                    match job {
                        Job::Run(f) => f(),
                        Job::Fence(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                debug!(engine, "engine worker stopped");
            })
            .map_err(|source| OpError::Spawn { engine, source })?;

        Ok(Self {
            engine,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    fn send(&self, job: Job) -> Result<(), OpError> {
        self.tx
            .as_ref()
            .and_then(|tx| tx.send(job).ok())
            .ok_or(OpError::QueueClosed { engine: self.engine })
    }

    pub(crate) fn submit(&self, f: impl FnOnce() + Send + 'static) -> Result<(), OpError> {
        self.send(Job::Run(Box::new(f)))
    }

    /// Blocks until every job submitted before the call has run.
    pub(crate) fn wait(&self) -> Result<(), OpError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Job::Fence(done_tx))?;
        done_rx
            .blocking_recv()
            .map_err(|_| OpError::QueueClosed { engine: self.engine })
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the backlog is done.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
