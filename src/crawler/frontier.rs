//! Deduplicating work queue of crawl tasks
//!
//! The frontier owns every task that is not currently held by a worker and
//! remembers the lifecycle state of every canonical URL it has seen. All
//! operations go through one mutex, so the one-live-task-per-URL rule holds
//! even when several workers discover the same detail URL at once.
//!
//! Idle detection: [`Frontier::dequeue`] waits while the queue is empty but
//! tasks are still in flight (they may discover more work or be retried),
//! and returns `None` once nothing is ready and nothing is in flight.

use crate::crawler::task::{Priority, Task};
use crate::state::TaskState;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    front: VecDeque<Task>,
    normal: VecDeque<Task>,
    states: HashMap<String, TaskState>,
    in_flight: usize,
    closed: bool,
}

impl Inner {
    fn push(&mut self, task: Task) {
        match task.priority {
            Priority::Front => self.front.push_back(task),
            Priority::Normal => self.normal.push_back(task),
        }
    }

    fn pop(&mut self) -> Option<Task> {
        self.front.pop_front().or_else(|| self.normal.pop_front())
    }

    /// True if `key` has a state that may move to `next`
    fn can_move(&self, key: &str, next: TaskState) -> bool {
        self.states
            .get(key)
            .is_some_and(|state| state.can_transition_to(next))
    }

    fn ready_len(&self) -> usize {
        self.front.len() + self.normal.len()
    }
}

/// The crawl frontier
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking worker cannot leave the queue structurally invalid
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a task to the ready queue
    ///
    /// Front-priority tasks are dequeued before normal ones; within a
    /// priority, tasks come out in insertion order.
    ///
    /// # Returns
    ///
    /// * `true` - The task was inserted
    /// * `false` - A task for the same canonical URL is ready, in flight or
    ///   already delivered, or the frontier is closed
    ///
    /// A URL whose previous task was abandoned is recreated with its attempt
    /// count reset.
    pub fn enqueue(&self, mut task: Task) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }

        match inner.states.get(&task.key) {
            Some(state) if state.is_live() || *state == TaskState::Delivered => {
                tracing::debug!(url = %task.url, state = %state, "Duplicate enqueue ignored");
                return false;
            }
            Some(TaskState::Abandoned) => {
                tracing::debug!(url = %task.url, "Recreating abandoned task");
                task.attempt = 0;
                task.last_error = None;
                task.rotate_session = false;
            }
            _ => {}
        }

        inner.states.insert(task.key.clone(), TaskState::Ready);
        inner.push(task);
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Takes the next ready task, waiting while other tasks are in flight
    ///
    /// # Returns
    ///
    /// * `Some(Task)` - The task, now marked in flight
    /// * `None` - The frontier is idle-empty or closed
    pub async fn dequeue(&self) -> Option<Task> {
        loop {
            // Register before checking so a concurrent mutation cannot be missed
            let notified = self.notify.notified();

            if let Some(result) = self.poll_dequeue() {
                return result;
            }

            notified.await;
        }
    }

    /// Non-blocking dequeue
    ///
    /// Returns `None` when nothing is ready, whether or not work is in flight.
    pub fn try_dequeue(&self) -> Option<Task> {
        self.poll_dequeue().flatten()
    }

    /// `Some(Some(task))` ready, `Some(None)` finished, `None` must wait
    fn poll_dequeue(&self) -> Option<Option<Task>> {
        let mut inner = self.lock();
        if inner.closed {
            return Some(None);
        }

        if let Some(task) = inner.pop() {
            inner.states.insert(task.key.clone(), TaskState::InFlight);
            inner.in_flight += 1;
            return Some(Some(task));
        }

        if inner.in_flight == 0 {
            return Some(None);
        }

        None
    }

    /// Marks an in-flight task as delivered
    pub fn mark_done(&self, task: &Task) {
        self.finish(task, TaskState::Delivered);
    }

    /// Marks an in-flight task as abandoned
    ///
    /// # Returns
    ///
    /// `true` exactly once per abandonment; `false` if the task was not in
    /// flight (already finished by another path).
    pub fn mark_failed(&self, task: &Task) -> bool {
        self.finish(task, TaskState::Abandoned)
    }

    fn finish(&self, task: &Task, terminal: TaskState) -> bool {
        let mut inner = self.lock();
        if !inner.can_move(&task.key, terminal) {
            return false;
        }

        inner.states.insert(task.key.clone(), terminal);
        inner.in_flight = inner.in_flight.saturating_sub(1);
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Returns an in-flight task to the ready queue
    ///
    /// Used for retries and for tasks interrupted by cancellation. Works on
    /// a closed frontier so that interrupted work is kept for the snapshot.
    pub fn requeue(&self, task: Task) -> bool {
        let mut inner = self.lock();
        if inner.states.get(&task.key) != Some(&TaskState::InFlight) {
            return false;
        }

        inner.states.insert(task.key.clone(), TaskState::Ready);
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.push(task);
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Records a URL as delivered without fetching it
    ///
    /// Summary-only crawls use this to emit each card once, and resumed
    /// crawls to skip listings an earlier run emitted. Returns `false` if
    /// the frontier has already seen the URL.
    pub fn mark_delivered_key(&self, key: &str) -> bool {
        let mut inner = self.lock();
        if inner.states.contains_key(key) {
            return false;
        }
        inner.states.insert(key.to_string(), TaskState::Delivered);
        true
    }

    /// Withdraws a claim made with [`mark_delivered_key`](Self::mark_delivered_key)
    ///
    /// Called when the summary for the key could not be written: the claim
    /// never took effect, so the key is forgotten rather than moved out of
    /// `Delivered`, and a later page may emit it again.
    pub fn unmark_delivered_key(&self, key: &str) {
        let mut inner = self.lock();
        if inner.states.get(key) == Some(&TaskState::Delivered) {
            inner.states.remove(key);
        }
    }

    /// Stops handing out tasks and wakes every waiting worker
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copies the ready queue in dequeue order
    pub fn snapshot(&self) -> Vec<Task> {
        let inner = self.lock();
        inner.front.iter().chain(inner.normal.iter()).cloned().collect()
    }

    /// Lifecycle state of a canonical URL, if seen
    pub fn state_of(&self, key: &str) -> Option<TaskState> {
        self.lock().states.get(key).copied()
    }

    /// True if `enqueue` would ignore a task for `key`
    ///
    /// Ready, in-flight and delivered keys are known; abandoned keys may be
    /// recreated and are not.
    pub fn is_known(&self, key: &str) -> bool {
        self.state_of(key)
            .is_some_and(|state| state.is_live() || state == TaskState::Delivered)
    }

    /// Number of ready tasks
    pub fn len(&self) -> usize {
        self.lock().ready_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::CarriedData;
    use crate::url::normalize_url;
    use rand::Rng;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn search(url: &str) -> Task {
        Task::search(normalize_url(url).unwrap())
    }

    fn detail(url: &str, priority: Priority) -> Task {
        Task::detail(normalize_url(url).unwrap(), CarriedData::default(), priority)
    }

    #[test]
    fn test_enqueue_same_url_is_noop() {
        let frontier = Frontier::new();
        assert!(frontier.enqueue(search("https://x/search?q=flat")));
        assert!(!frontier.enqueue(search("https://x/search?q=flat")));
        assert!(!frontier.enqueue(search("https://X/search?q=FLAT#top")));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_enqueue_while_in_flight_is_noop() {
        let frontier = Frontier::new();
        frontier.enqueue(detail("https://x/l/1", Priority::Normal));

        let task = frontier.try_dequeue().unwrap();
        assert_eq!(frontier.in_flight(), 1);
        assert!(!frontier.enqueue(detail("https://x/l/1", Priority::Normal)));
        assert_eq!(frontier.len(), 0);

        frontier.mark_done(&task);
        assert!(!frontier.enqueue(detail("https://x/l/1", Priority::Normal)));
        assert_eq!(frontier.state_of(&task.key), Some(TaskState::Delivered));
    }

    #[test]
    fn test_front_priority_dequeued_first() {
        let frontier = Frontier::new();
        frontier.enqueue(search("https://x/search?page=2"));
        frontier.enqueue(detail("https://x/l/1", Priority::Normal));
        frontier.enqueue(detail("https://x/l/2", Priority::Front));
        frontier.enqueue(detail("https://x/l/3", Priority::Front));

        let order: Vec<String> = std::iter::from_fn(|| frontier.try_dequeue())
            .map(|t| t.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/l/2", "/l/3", "/search", "/l/1"]);
    }

    #[test]
    fn test_mark_failed_exactly_once() {
        let frontier = Frontier::new();
        frontier.enqueue(detail("https://x/l/1", Priority::Normal));
        let task = frontier.try_dequeue().unwrap();

        assert!(frontier.mark_failed(&task));
        assert!(!frontier.mark_failed(&task));
        assert_eq!(frontier.in_flight(), 0);
        assert_eq!(frontier.state_of(&task.key), Some(TaskState::Abandoned));
    }

    #[test]
    fn test_abandoned_task_recreated_with_reset_attempts() {
        let frontier = Frontier::new();
        frontier.enqueue(detail("https://x/l/1", Priority::Normal));
        let mut task = frontier.try_dequeue().unwrap();
        task.attempt = 3;
        frontier.mark_failed(&task);

        assert!(frontier.enqueue(task.clone()));
        let recreated = frontier.try_dequeue().unwrap();
        assert_eq!(recreated.attempt, 0);
    }

    #[test]
    fn test_requeue_keeps_attempt() {
        let frontier = Frontier::new();
        frontier.enqueue(search("https://x/search"));
        let mut task = frontier.try_dequeue().unwrap();
        task.attempt += 1;

        assert!(frontier.requeue(task));
        assert_eq!(frontier.in_flight(), 0);
        assert_eq!(frontier.try_dequeue().unwrap().attempt, 1);
    }

    #[test]
    fn test_mark_delivered_key() {
        let frontier = Frontier::new();
        let key = search("https://x/l/9").key;
        assert!(frontier.mark_delivered_key(&key));
        assert!(!frontier.mark_delivered_key(&key));
        assert!(!frontier.enqueue(search("https://x/l/9")));

        frontier.unmark_delivered_key(&key);
        assert_eq!(frontier.state_of(&key), None);
        assert!(frontier.mark_delivered_key(&key));
    }

    #[test]
    fn test_finish_requires_in_flight_task() {
        let frontier = Frontier::new();
        let task = detail("https://x/l/1", Priority::Normal);
        frontier.enqueue(task.clone());

        // Still ready: neither delivery nor abandonment is a legal move
        frontier.mark_done(&task);
        assert!(!frontier.mark_failed(&task));
        assert_eq!(frontier.state_of(&task.key), Some(TaskState::Ready));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_is_known_matches_enqueue_dedup() {
        let frontier = Frontier::new();
        let ready = detail("https://x/l/1", Priority::Normal);
        let abandoned = detail("https://x/l/2", Priority::Normal);
        frontier.enqueue(abandoned.clone());
        let taken = frontier.try_dequeue().unwrap();
        frontier.mark_failed(&taken);
        frontier.enqueue(ready.clone());
        frontier.mark_delivered_key(&search("https://x/l/3").key);

        assert!(frontier.is_known(&ready.key));
        assert!(frontier.is_known(&search("https://X/l/3#map").key));
        assert!(!frontier.is_known(&abandoned.key));
        assert!(!frontier.is_known(&search("https://x/l/4").key));
    }

    #[test]
    fn test_mark_delivered_key_rejects_seen_urls() {
        let frontier = Frontier::new();
        let task = detail("https://x/l/1", Priority::Normal);
        frontier.enqueue(task.clone());
        let task = frontier.try_dequeue().unwrap();
        frontier.mark_failed(&task);

        assert!(!frontier.mark_delivered_key(&task.key));
        assert_eq!(frontier.state_of(&task.key), Some(TaskState::Abandoned));
    }

    #[test]
    fn test_closed_frontier_keeps_requeued_tasks() {
        let frontier = Frontier::new();
        frontier.enqueue(search("https://x/search"));
        let task = frontier.try_dequeue().unwrap();

        frontier.close();
        assert!(!frontier.enqueue(search("https://x/other")));
        assert!(frontier.requeue(task));
        assert_eq!(frontier.snapshot().len(), 1);
        assert!(frontier.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_returns_none_when_idle_empty() {
        let frontier = Frontier::new();
        assert!(frontier.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_in_flight_work() {
        let frontier = Arc::new(Frontier::new());
        frontier.enqueue(search("https://x/search"));
        let task = frontier.dequeue().await.unwrap();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move { frontier.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // The in-flight page discovers a detail page, then completes
        frontier.enqueue(detail("https://x/l/1", Priority::Normal));
        frontier.mark_done(&task);

        let next = waiter.await.unwrap().unwrap();
        assert_eq!(next.url.path(), "/l/1");
    }

    #[tokio::test]
    async fn test_waiters_released_when_last_task_finishes() {
        let frontier = Arc::new(Frontier::new());
        frontier.enqueue(search("https://x/search"));
        let task = frontier.dequeue().await.unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                tokio::spawn(async move { frontier.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.mark_done(&task);

        for waiter in waiters {
            assert!(waiter.await.unwrap().is_none());
        }
    }

    #[test]
    fn test_randomized_concurrent_enqueue_keeps_one_live_task_per_url() {
        let frontier = Arc::new(Frontier::new());
        let accepted = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                let accepted = Arc::clone(&accepted);
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..500 {
                        let id: u32 = rng.gen_range(0..40);
                        // Vary case and fragment so only the canonical key matches
                        let url = if rng.gen_bool(0.5) {
                            format!("https://x/listing/{}", id)
                        } else {
                            format!("https://X/LISTING/{}#photos", id)
                        };
                        let priority = if rng.gen_bool(0.3) {
                            Priority::Front
                        } else {
                            Priority::Normal
                        };

                        if frontier.enqueue(detail(&url, priority)) {
                            accepted.lock().unwrap().push(id);
                        }

                        // Concurrently drain some work to exercise in-flight paths
                        if rng.gen_bool(0.2) {
                            if let Some(task) = frontier.try_dequeue() {
                                frontier.mark_done(&task);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Delivered URLs are never re-accepted, so each id is accepted once
        let accepted = accepted.lock().unwrap();
        let distinct: HashSet<u32> = accepted.iter().copied().collect();
        assert_eq!(accepted.len(), distinct.len());

        let snapshot = frontier.snapshot();
        let keys: HashSet<String> = snapshot.iter().map(|t| t.key.clone()).collect();
        assert_eq!(keys.len(), snapshot.len());
        assert_eq!(frontier.in_flight(), 0);
    }
}
