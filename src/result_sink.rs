//! Append-only result collector shared by all workers.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::types::TaskResult;

struct SinkState {
    results: Vec<TaskResult>,
    dropped: usize,
}

impl SinkState {
    fn settled(&self) -> usize {
        self.results.len() + self.dropped
    }
}

/// Collects results from concurrent workers in arrival order.
///
/// Also counts tasks that were dequeued but dropped, so a coordinator can
/// wait for every submitted task to settle one way or the other.
pub struct ResultSink {
    state: Mutex<SinkState>,
    settled: Condvar,
}

impl ResultSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                results: Vec::new(),
                dropped: 0,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one result and wake anyone waiting on the count.
    pub fn append(&self, result: TaskResult) {
        let mut guard = self.lock();
        guard.results.push(result);
        self.settled.notify_all();
    }

    /// Count a task that produced no result.
    pub fn record_dropped(&self) {
        let mut guard = self.lock();
        guard.dropped += 1;
        self.settled.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }

    /// Block until `count` tasks have settled (recorded or dropped) or
    /// `timeout` elapses. Returns `true` if the count was reached.
    ///
    /// A timeout too large to express as a deadline waits without bound.
    pub fn wait_settled(&self, count: usize, timeout: Duration) -> bool {
        let mut guard = self.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while guard.settled() < count {
                guard = self
                    .settled
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return true;
        };
        while guard.settled() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .settled
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
        true
    }

    /// Take every accumulated result, leaving the sink empty.
    ///
    /// Meant to be called once, after all workers have stopped.
    pub fn drain(&self) -> Vec<TaskResult> {
        std::mem::take(&mut self.lock().results)
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Task;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn concurrent_appends_are_all_kept() {
        let sink = Arc::new(ResultSink::new());
        let writers = 6;
        let per_writer = 50u64;
        let barrier = Arc::new(Barrier::new(writers));

        let mut handles = Vec::new();
        for writer in 0..writers {
            let sink = Arc::clone(&sink);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for n in 0..per_writer {
                    let id = writer as u64 * per_writer + n;
                    let task = Task::new(id, format!("Task-{id}"));
                    sink.append(TaskResult::new(format!("worker-{writer}"), &task));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }

        let results = sink.drain();
        assert_eq!(results.len(), writers * per_writer as usize);
        let ids: HashSet<u64> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(ids.len(), results.len());
        // Entries are never torn: the label always matches the id.
        for result in &results {
            assert_eq!(result.task, format!("Task-{}", result.task_id));
        }
    }

    #[test]
    fn drain_empties_the_sink() {
        let sink = ResultSink::new();
        sink.append(TaskResult::new("worker-1", &Task::new(1, "Task-1")));
        assert_eq!(sink.drain().len(), 1);
        assert_eq!(sink.len(), 0);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn wait_settled_returns_once_count_reached() {
        let sink = Arc::new(ResultSink::new());
        let writer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for id in 1..=3u64 {
                    thread::sleep(Duration::from_millis(10));
                    let task = Task::new(id, format!("Task-{id}"));
                    sink.append(TaskResult::new("worker-1", &task));
                }
                sink.record_dropped();
            })
        };
        assert!(sink.wait_settled(4, Duration::from_secs(5)));
        writer.join().expect("writer thread panicked");
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn wait_settled_times_out_when_short() {
        let sink = ResultSink::new();
        let start = Instant::now();
        assert!(!sink.wait_settled(1, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(sink.wait_settled(0, Duration::ZERO));
    }

    #[test]
    fn wait_settled_accepts_unbounded_timeout() {
        let sink = Arc::new(ResultSink::new());
        sink.append(TaskResult::new("worker-1", &Task::new(1, "Task-1")));
        assert!(sink.wait_settled(1, Duration::MAX));

        let writer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                sink.record_dropped();
            })
        };
        assert!(sink.wait_settled(2, Duration::MAX));
        writer.join().expect("writer thread panicked");
    }
}
