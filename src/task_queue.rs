//! Thread-safe FIFO queue with a blocking, cancellable consumer side.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Outcome of a blocking pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop<T> {
    Item(T),
    /// The queue was cancelled; the caller should stop consuming.
    Cancelled,
}

/// A synchronized FIFO queue shared by one producer and many consumers.
pub struct BlockingQueue<T> {
    inner: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    cancelled: bool,
}

impl<T> BlockingQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::new(),
                cancelled: false,
            }),
            available: Condvar::new(),
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // still guards valid data.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail and wake one waiting consumer.
    ///
    /// Items pushed after [`cancel`](Self::cancel) are kept but never handed
    /// out by [`pop`](Self::pop).
    pub fn push(&self, item: T) {
        let mut guard = self.lock();
        guard.items.push_back(item);
        self.available.notify_one();
    }

    /// Block until an item is available or the queue is cancelled.
    ///
    /// Cancellation wins over pending items: once cancelled, every call
    /// returns [`Pop::Cancelled`] and the remaining items stay queued.
    pub fn pop(&self) -> Pop<T> {
        let mut guard = self.lock();
        loop {
            if guard.cancelled {
                return Pop::Cancelled;
            }
            if let Some(item) = guard.items.pop_front() {
                return Pop::Item(item);
            }
            // Wait releases the lock and re-acquires it before returning.
            guard = self
                .available
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Cancel the queue and wake all blocked consumers.
    pub fn cancel(&self) {
        let mut guard = self.lock();
        guard.cancelled = true;
        self.available.notify_all();
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Task;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn pops_follow_push_order() {
        let queue = BlockingQueue::new();
        for id in 1..=5u64 {
            queue.push(Task::new(id, format!("Task-{id}")));
        }
        for id in 1..=5u64 {
            match queue.pop() {
                Pop::Item(task) => assert_eq!(task.id, id),
                Pop::Cancelled => panic!("queue unexpectedly cancelled"),
            }
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn blocking_pops_deliver_each_task_once() {
        let queue = Arc::new(BlockingQueue::<Task>::new());
        let consumers = 4;
        let total_tasks = 200usize;
        let barrier = Arc::new(Barrier::new(consumers + 1));
        let seen: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));
        let duplicate = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let seen = Arc::clone(&seen);
            let duplicate = Arc::clone(&duplicate);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let mut taken = 0usize;
                while let Pop::Item(task) = queue.pop() {
                    let mut guard = seen.lock().expect("seen mutex poisoned");
                    if !guard.insert(task.id) {
                        duplicate.store(true, Ordering::SeqCst);
                    }
                    taken += 1;
                }
                taken
            }));
        }

        // Consumers are already parked or racing when tasks arrive.
        barrier.wait();
        for id in 0..total_tasks as u64 {
            queue.push(Task::new(id, format!("Task-{id}")));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().expect("seen mutex poisoned").len() < total_tasks {
            assert!(Instant::now() < deadline, "consumers stalled");
            thread::sleep(Duration::from_millis(1));
        }
        queue.cancel();

        let taken: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("consumer thread panicked"))
            .sum();
        assert!(!duplicate.load(Ordering::SeqCst));
        assert_eq!(taken, total_tasks);
        let guard = seen.lock().expect("seen mutex poisoned");
        assert_eq!(guard.len(), total_tasks);
        assert!((0..total_tasks as u64).all(|id| guard.contains(&id)));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn pop_wakes_on_push() {
        let queue = Arc::new(BlockingQueue::<Task>::new());
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("send ready");
            if let Pop::Item(task) = queue_clone.pop() {
                tx.send(task.id).expect("send task id");
            }
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        // Pushing after the consumer blocks should wake it.
        queue.push(Task::new(99, "wake"));

        let received = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("receive task id");
        assert_eq!(received, 99);
        handle.join().expect("blocking pop thread panicked");
    }

    #[test]
    fn blocking_consumers_each_get_unique_task() {
        let queue = Arc::new(BlockingQueue::<Task>::new());
        let consumers = 4;
        let barrier = Arc::new(Barrier::new(consumers));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let ready_tx = ready_tx.clone();
            let done_tx = done_tx.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                ready_tx.send(()).expect("ready");
                match queue.pop() {
                    Pop::Item(task) => done_tx.send(task.id).expect("done"),
                    Pop::Cancelled => panic!("queue unexpectedly cancelled"),
                }
            }));
        }

        for _ in 0..consumers {
            ready_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("ready recv");
        }

        // Provide exactly one task per consumer.
        for id in 0..consumers as u64 {
            queue.push(Task::new(id, format!("Task-{id}")));
        }

        let mut seen = HashSet::new();
        for _ in 0..consumers {
            let id = done_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("done recv");
            assert!(seen.insert(id));
        }

        for handle in handles {
            handle.join().expect("consumer thread panicked");
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn pop_unblocks_on_cancel() {
        let queue: Arc<BlockingQueue<Task>> = Arc::new(BlockingQueue::new());
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("ready");
            let outcome = queue_clone.pop();
            done_tx.send(outcome == Pop::Cancelled).expect("done");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        queue.cancel();

        let cancelled = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("done recv");
        assert!(cancelled);
        handle.join().expect("consumer thread panicked");
    }

    #[test]
    fn cancelled_queue_keeps_pending_items() {
        let queue = BlockingQueue::new();
        queue.push(Task::new(1, "Task-1"));
        queue.cancel();
        queue.push(Task::new(2, "Task-2"));

        assert_eq!(queue.pop(), Pop::Cancelled);
        assert_eq!(queue.pop(), Pop::Cancelled);
        assert_eq!(queue.len(), 2);
    }
}
