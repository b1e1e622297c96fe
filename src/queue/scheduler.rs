//! Bounded-concurrency FIFO scheduler for translation jobs

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::core::config::QueueConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{JobId, QueueItem};
use crate::queue::worker::{JobOutcome, JobRunner};

/// Snapshot of the queue, published after every scheduler step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    /// Jobs sleeping out a quota backoff
    pub retrying: usize,
}

impl QueueStats {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0 && self.retrying == 0
    }
}

enum Command {
    Submit(QueueItem),
    Retry(QueueItem),
    Finished { item: QueueItem, outcome: JobOutcome },
    WaitIdle(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the scheduler task. Cheap to clone.
#[derive(Clone)]
pub struct TranslationQueue {
    commands: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<QueueStats>,
}

impl TranslationQueue {
    /// Spawn the scheduler task. Must be called inside a tokio runtime.
    pub fn start(runner: Arc<JobRunner>, config: QueueConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(QueueStats::default());

        let scheduler = Scheduler {
            runner,
            concurrency: config.concurrency.max(1),
            config,
            fifo: VecDeque::new(),
            in_flight: HashSet::new(),
            retrying: HashSet::new(),
            waiters: Vec::new(),
            commands: commands.clone(),
            stats: stats_tx,
        };
        tokio::spawn(scheduler.run(receiver));

        Self { commands, stats }
    }

    /// Queue a job. Returns at once; the job reaches a terminal status later.
    pub fn add_job(&self, item: QueueItem) -> Result<()> {
        self.send(Command::Submit(item))
    }

    pub fn stats(&self) -> QueueStats {
        *self.stats.borrow()
    }

    /// Follow queue statistics as they change
    pub fn subscribe(&self) -> watch::Receiver<QueueStats> {
        self.stats.clone()
    }

    /// Resolve once nothing is queued, running or waiting to retry
    pub async fn wait_idle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::WaitIdle(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop admitting jobs. Running jobs finish on their own.
    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TranslationError::InternalError("translation queue stopped".to_string()))
    }
}

/// Owns the FIFO and the in-flight set; nothing else touches them
struct Scheduler {
    runner: Arc<JobRunner>,
    config: QueueConfig,
    concurrency: usize,
    fifo: VecDeque<QueueItem>,
    in_flight: HashSet<JobId>,
    retrying: HashSet<JobId>,
    waiters: Vec<oneshot::Sender<()>>,
    commands: mpsc::UnboundedSender<Command>,
    stats: watch::Sender<QueueStats>,
}

impl Scheduler {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        info!("Translation queue started (concurrency {})", self.concurrency);

        while let Some(command) = receiver.recv().await {
            match command {
                Command::Submit(item) => self.submit(item),
                Command::Retry(item) => {
                    self.retrying.remove(&item.job_id);
                    debug!("Job {} back at queue head (attempt {})", item.job_id, item.attempt);
                    self.fifo.push_front(item);
                }
                Command::Finished { item, outcome } => self.finish(item, outcome),
                Command::WaitIdle(waiter) => self.waiters.push(waiter),
                Command::Shutdown => break,
            }
            self.admit();
            self.publish();
        }

        info!("Translation queue stopped");
    }

    fn submit(&mut self, item: QueueItem) {
        let id = item.job_id;
        let queued = self.in_flight.contains(&id)
            || self.retrying.contains(&id)
            || self.fifo.iter().any(|queued| queued.job_id == id);
        if queued {
            debug!("Job {} already queued", id);
            return;
        }
        self.fifo.push_back(item);
    }

    fn finish(&mut self, item: QueueItem, outcome: JobOutcome) {
        self.in_flight.remove(&item.job_id);
        match outcome {
            JobOutcome::Requeue => self.schedule_retry(item),
            JobOutcome::Failed(message) => {
                debug!("Job {} settled as failed: {}", item.job_id, message)
            }
            other => debug!("Job {} finished: {:?}", item.job_id, other),
        }
    }

    fn schedule_retry(&mut self, mut item: QueueItem) {
        let delay = self.config.retry_delay(item.attempt);
        item.attempt += 1;
        self.retrying.insert(item.job_id);
        info!("Retrying job {} in {:?}", item.job_id, delay);

        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::Retry(item));
        });
    }

    fn admit(&mut self) {
        while self.in_flight.len() < self.concurrency {
            let Some(item) = self.fifo.pop_front() else {
                break;
            };
            self.spawn_worker(item);
        }
    }

    /// Run the job on its own task; a supervisor turns panics into FAILED
    fn spawn_worker(&mut self, item: QueueItem) {
        self.in_flight.insert(item.job_id);
        let runner = self.runner.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let worker_runner = runner.clone();
            let worker_item = item.clone();
            let handle = tokio::spawn(async move { worker_runner.run(&worker_item).await });

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Worker for job {} crashed: {}", item.job_id, e);
                    runner.fail(&item, format!("worker crashed: {}", e)).await
                }
            };
            let _ = commands.send(Command::Finished { item, outcome });
        });
    }

    fn publish(&mut self) {
        let stats = QueueStats {
            pending: self.fifo.len(),
            in_flight: self.in_flight.len(),
            retrying: self.retrying.len(),
        };
        self.stats.send_replace(stats);

        if stats.is_idle() {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}
