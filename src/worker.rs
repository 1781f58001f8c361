//! Worker threads: dequeue, process, record, until told to stop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{PipelineError, ProcessError};
use crate::result_sink::ResultSink;
use crate::shutdown::StopSignal;
use crate::task_queue::{BlockingQueue, Pop};
use crate::types::{Task, TaskResult, WorkerId};

/// The unit of work applied to every task.
///
/// A failed task is dropped: it is neither retried nor requeued. A panic
/// inside `process` is treated as a failure of that task.
pub trait TaskProcessor: Send + Sync {
    fn process(&self, task: &Task) -> Result<(), ProcessError>;
}

impl<F> TaskProcessor for F
where
    F: Fn(&Task) -> Result<(), ProcessError> + Send + Sync,
{
    fn process(&self, task: &Task) -> Result<(), ProcessError> {
        self(task)
    }
}

/// Stand-in for real computation: a fixed pause per task.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedWork {
    pub delay: Duration,
}

impl TaskProcessor for SimulatedWork {
    fn process(&self, _task: &Task) -> Result<(), ProcessError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(())
    }
}

/// Lifecycle of a worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Created as u8))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Why a worker left its loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The queue was cancelled while the worker waited for a task.
    Cancelled,
    /// The stop signal was observed after finishing a task.
    StopRequested,
}

/// Per-worker tally returned on join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerReport {
    pub name: String,
    pub processed: usize,
    pub failed: usize,
    pub exit: ExitReason,
}

pub struct Worker {
    name: String,
    queue: Arc<BlockingQueue<Task>>,
    sink: Arc<ResultSink>,
    stop: Arc<StopSignal>,
    processor: Arc<dyn TaskProcessor>,
    state: Arc<StateCell>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        queue: Arc<BlockingQueue<Task>>,
        sink: Arc<ResultSink>,
        stop: Arc<StopSignal>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        Self {
            name: format!("worker-{id}"),
            queue,
            sink,
            stop,
            processor,
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the worker on its own named thread.
    pub fn spawn(self) -> Result<WorkerHandle, PipelineError> {
        let name = self.name.clone();
        let state = Arc::clone(&self.state);
        state.set(WorkerState::Running);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run())
            .map_err(|source| {
                state.set(WorkerState::Stopped);
                PipelineError::Spawn {
                    worker: name.clone(),
                    source,
                }
            })?;
        Ok(WorkerHandle {
            name,
            state,
            thread,
        })
    }

    fn process(&self, task: &Task) -> Result<(), ProcessError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.processor.process(task))).unwrap_or_else(
            |payload| {
                Err(ProcessError::Failed {
                    task: task.id,
                    reason: panic_reason(payload.as_ref()),
                })
            },
        )
    }

    fn run(self) -> WorkerReport {
        info!(worker = %self.name, "worker started");
        let mut processed = 0usize;
        let mut failed = 0usize;

        let exit = loop {
            let task = match self.queue.pop() {
                Pop::Item(task) => task,
                Pop::Cancelled => break ExitReason::Cancelled,
            };
            debug!(worker = %self.name, task = %task.label, "fetched task");

            match self.process(&task) {
                Ok(()) => {
                    let result = TaskResult::new(self.name.clone(), &task);
                    debug!(worker = %self.name, "{result}");
                    self.sink.append(result);
                    processed += 1;
                }
                Err(err) => {
                    warn!(worker = %self.name, error = %err, "dropping task");
                    self.sink.record_dropped();
                    failed += 1;
                }
            }

            // Remaining queued tasks are abandoned once a stop is requested.
            if self.stop.is_triggered() {
                break ExitReason::StopRequested;
            }
        };

        self.state.set(WorkerState::Stopping);
        info!(
            worker = %self.name,
            processed,
            failed,
            reason = ?exit,
            "worker stopping"
        );
        self.state.set(WorkerState::Stopped);

        WorkerReport {
            name: self.name,
            processed,
            failed,
            exit,
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("processor panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("processor panicked: {message}")
    } else {
        "processor panicked".to_string()
    }
}

/// Handle to a running worker thread.
pub struct WorkerHandle {
    name: String,
    state: Arc<StateCell>,
    thread: thread::JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Wait for the worker thread to exit and collect its report.
    pub fn join(self) -> Result<WorkerReport, PipelineError> {
        self.thread
            .join()
            .map_err(|_| PipelineError::WorkerPanicked { worker: self.name })
    }
}
