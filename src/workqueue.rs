// Bounded work queue for tile-parallel encoding: one `Mutex` guarding a
// ring buffer plus a pending-job counter, and two `Condvar`s — one signaled
// when a job becomes available, one signaled when the queue drains to
// empty. Grounded on examples/original_source/inc/WorkQueue.h, whose
// `pthread_mutex_t`/two `pthread_cond_t` shape this type mirrors directly;
// `std::sync::{Mutex, Condvar}` replaces the pthread primitives as the
// idiomatic Rust equivalent (this crate has no teacher precedent for
// threading, since `nekotrix-tinyavif` is single-threaded — the work
// queue's shape is grounded entirely in `original_source`, see DESIGN.md).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    job_available: Condvar,
    queue_empty: Condvar,
}

struct QueueState<T> {
    jobs: VecDeque<T>,
    pending: usize,
    closed: bool,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState { jobs: VecDeque::new(), pending: 0, closed: false }),
            job_available: Condvar::new(),
            queue_empty: Condvar::new(),
        }
    }

    /// Adds a job to the queue (`WorkQueue::AddToJob`). Increments the
    /// pending-job count so `wait_drained` can't race a job that was
    /// popped but not yet marked done.
    pub fn add_job(&self, job: T) {
        let mut state = self.state.lock().unwrap();
        state.jobs.push_back(job);
        state.pending += 1;
        self.job_available.notify_one();
    }

    /// Blocks until a job is available or the queue is closed, per
    /// `WorkQueue::GetNextJob`. Returns `None` only once the queue has
    /// been closed and drained — the sentinel-shutdown-item shape the
    /// REDESIGN FLAG in spec.md §9 asks for, expressed here as an explicit
    /// `closed` flag instead of a magic `WorkItem` value.
    pub fn pop_job(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.closed {
                return None;
            }
            state = self.job_available.wait(state).unwrap();
        }
    }

    /// Marks one previously popped job as finished (`WorkQueue::JobDone`),
    /// waking any thread blocked in `wait_drained`.
    pub fn job_done(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.pending > 0, "job_done called with no pending jobs");
        state.pending -= 1;
        if state.pending == 0 && state.jobs.is_empty() {
            self.queue_empty.notify_all();
        }
    }

    /// Blocks until every added job has been popped and marked done
    /// (`WorkQueue::WaitQueueEmpty`).
    pub fn wait_drained(&self) {
        let mut state = self.state.lock().unwrap();
        while state.pending > 0 || !state.jobs.is_empty() {
            state = self.queue_empty.wait(state).unwrap();
        }
    }

    /// Marks the queue closed: further `pop_job` calls return `None` once
    /// drained, unblocking worker threads for a clean join.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.job_available.notify_all();
    }

    pub fn jobs_in_queue(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn jobs_are_delivered_in_fifo_order() {
        let queue: WorkQueue<i32> = WorkQueue::new();
        queue.add_job(1);
        queue.add_job(2);
        queue.add_job(3);
        assert_eq!(queue.pop_job(), Some(1));
        assert_eq!(queue.pop_job(), Some(2));
        assert_eq!(queue.pop_job(), Some(3));
    }

    #[test]
    fn wait_drained_returns_once_all_jobs_done() {
        let queue = Arc::new(WorkQueue::<i32>::new());
        for i in 0..4 {
            queue.add_job(i);
        }
        let worker_queue = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            while let Some(_job) = worker_queue.pop_job() {
                worker_queue.job_done();
            }
        });
        queue.close();
        queue.wait_drained();
        handle.join().unwrap();
        assert_eq!(queue.jobs_in_queue(), 0);
    }

    #[test]
    fn closed_empty_queue_returns_none() {
        let queue: WorkQueue<i32> = WorkQueue::new();
        queue.close();
        assert_eq!(queue.pop_job(), None);
    }
}
