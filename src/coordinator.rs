//! Owns the queue and sink, drives the workers, and collects the results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::result_sink::ResultSink;
use crate::shutdown::StopSignal;
use crate::task_queue::BlockingQueue;
use crate::types::{Task, TaskId, TaskResult};
use crate::worker::{
    SimulatedWork, TaskProcessor, Worker, WorkerHandle, WorkerReport, WorkerState,
};

/// Settings for a single pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub workers: usize,
    pub tasks: usize,
    /// Simulated work per task.
    pub work: Duration,
    /// Upper bound on how long to wait for all tasks to settle.
    pub max_wait: Duration,
    pub output: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tasks: 10,
            work: Duration::from_millis(200),
            max_wait: Duration::from_millis(2000),
            output: PathBuf::from("results.txt"),
        }
    }
}

/// Everything a run produced once its workers have stopped.
#[derive(Debug)]
pub struct RunOutcome {
    pub submitted: usize,
    /// Results in arrival order.
    pub results: Vec<TaskResult>,
    pub reports: Vec<WorkerReport>,
    /// Tasks still queued at shutdown.
    pub leftover: usize,
    /// Whether every submitted task settled before the wait ended.
    pub completed: bool,
}

impl RunOutcome {
    pub fn failed(&self) -> usize {
        self.reports.iter().map(|report| report.failed).sum()
    }
}

pub struct Coordinator {
    queue: Arc<BlockingQueue<Task>>,
    sink: Arc<ResultSink>,
    stop: Arc<StopSignal>,
    workers: Vec<WorkerHandle>,
    next_id: TaskId,
    completed: bool,
}

impl Coordinator {
    /// Create the shared queue and sink and start `workers` threads.
    pub fn start(workers: usize, processor: Arc<dyn TaskProcessor>) -> Result<Self, PipelineError> {
        let mut coordinator = Self {
            queue: Arc::new(BlockingQueue::new()),
            sink: Arc::new(ResultSink::new()),
            stop: Arc::new(StopSignal::new()),
            workers: Vec::with_capacity(workers),
            next_id: 1,
            completed: false,
        };

        for id in 1..=workers {
            let worker = Worker::new(
                id,
                Arc::clone(&coordinator.queue),
                Arc::clone(&coordinator.sink),
                Arc::clone(&coordinator.stop),
                Arc::clone(&processor),
            );
            debug!(worker = worker.name(), "spawning worker");
            match worker.spawn() {
                Ok(handle) => coordinator.workers.push(handle),
                Err(err) => {
                    // Tear down whatever already started before reporting.
                    coordinator.stop_workers();
                    return Err(err);
                }
            }
        }
        info!(workers, "workers started");
        Ok(coordinator)
    }

    /// Enqueue the next task under a fresh sequential id.
    pub fn submit(&mut self, label: impl Into<String>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Task::new(id, label));
        id
    }

    pub fn submitted(&self) -> usize {
        (self.next_id - 1) as usize
    }

    /// Tasks still waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(WorkerHandle::state).collect()
    }

    /// Wait until every submitted task has settled, at most `max_wait`.
    ///
    /// With no workers and pending tasks nothing can progress, so this
    /// returns `false` without waiting.
    pub fn wait_for_completion(&mut self, max_wait: Duration) -> bool {
        let target = self.submitted();
        if self.workers.is_empty() && target > 0 {
            warn!(pending = self.pending(), "no workers to process queued tasks");
            self.completed = false;
            return false;
        }
        self.completed = self.sink.wait_settled(target, max_wait);
        if !self.completed {
            warn!(
                settled = self.sink.len() + self.sink.dropped(),
                target,
                states = ?self.worker_states(),
                "gave up waiting for tasks to settle"
            );
        }
        self.completed
    }

    fn stop_workers(&mut self) -> Vec<Result<WorkerReport, PipelineError>> {
        if self.stop.trigger() {
            info!("stop requested");
        }
        // Wakes any worker parked on an empty queue.
        self.queue.cancel();
        self.workers
            .drain(..)
            .map(|handle| {
                debug!(worker = handle.name(), state = ?handle.state(), "joining worker");
                handle.join()
            })
            .collect()
    }

    /// Stop every worker, wait for them to exit, and drain the results.
    pub fn shutdown(mut self) -> Result<RunOutcome, PipelineError> {
        let mut reports = Vec::with_capacity(self.workers.len());
        let mut first_err = None;
        for joined in self.stop_workers() {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(error = %err, "worker did not report");
                    first_err.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        let results = self.sink.drain();
        let leftover = self.queue.len();
        info!(results = results.len(), leftover, "pipeline stopped");
        Ok(RunOutcome {
            submitted: self.submitted(),
            results,
            reports,
            leftover,
            completed: self.completed,
        })
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.stop_workers();
        }
    }
}

/// Run the pipeline once with simulated work, labelling tasks `Task-1..`.
pub fn run(config: &PipelineConfig) -> Result<RunOutcome, PipelineError> {
    let processor = Arc::new(SimulatedWork { delay: config.work });
    let mut coordinator = Coordinator::start(config.workers, processor)?;
    for n in 1..=config.tasks {
        coordinator.submit(format!("Task-{n}"));
    }
    coordinator.wait_for_completion(config.max_wait);
    coordinator.shutdown()
}
