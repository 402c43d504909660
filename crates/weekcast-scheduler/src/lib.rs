//! # Weekcast Scheduler
//!
//! Time-ordered queue of pending deliveries with a periodic tick loop.
//!
//! The heap lives on one logical thread of control: the task running
//! [`Scheduler::run`]. Jobs executing inside a tick may schedule or cancel
//! through a [`SchedulerHandle`], which marshals the mutation over a channel
//! drained at the start of the next tick instead of touching the heap directly.

pub mod occurrence;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

/// Uniform async callable: sync or suspending work looks the same to the tick loop.
pub type Job<A> = Arc<dyn Fn(A) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

type Predicate<A> = Box<dyn Fn(&A) -> bool + Send>;

/// A pending delivery. Ordered by `(execute_at, seq)` only; the payload is opaque.
pub struct ScheduledTask<A> {
    pub execute_at: DateTime<Utc>,
    /// Insertion sequence, the deterministic tie-break for equal timestamps.
    seq: u64,
    pub args: A,
    job: Job<A>,
}

impl<A: fmt::Debug> fmt::Debug for ScheduledTask<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("execute_at", &self.execute_at)
            .field("seq", &self.seq)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

// Reversed comparison so BinaryHeap (a max-heap) pops the earliest task first.
impl<A> Ord for ScheduledTask<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .execute_at
            .cmp(&self.execute_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<A> PartialOrd for ScheduledTask<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> PartialEq for ScheduledTask<A> {
    fn eq(&self, other: &Self) -> bool {
        self.execute_at == other.execute_at && self.seq == other.seq
    }
}

impl<A> Eq for ScheduledTask<A> {}

enum Command<A> {
    Schedule {
        execute_at: DateTime<Utc>,
        job: Job<A>,
        args: A,
    },
    CancelMatching(Predicate<A>),
}

/// Cloneable entry point for scheduling from outside the scheduler's thread
/// of control (command handlers, jobs re-registering themselves).
pub struct SchedulerHandle<A> {
    tx: mpsc::UnboundedSender<Command<A>>,
}

impl<A> Clone for SchedulerHandle<A> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<A: Send + 'static> SchedulerHandle<A> {
    /// Queue an insert; applied at the start of the next tick.
    pub fn schedule(&self, execute_at: DateTime<Utc>, job: Job<A>, args: A) {
        if self.tx.send(Command::Schedule { execute_at, job, args }).is_err() {
            tracing::warn!("Scheduler gone, dropping schedule request");
        }
    }

    /// Queue removal of every pending task whose args match.
    pub fn cancel_matching(&self, predicate: impl Fn(&A) -> bool + Send + 'static) {
        if self.tx.send(Command::CancelMatching(Box::new(predicate))).is_err() {
            tracing::warn!("Scheduler gone, dropping cancel request");
        }
    }
}

/// Priority-ordered queue of pending tasks plus the tick/run loop.
pub struct Scheduler<A> {
    interval: Duration,
    heap: BinaryHeap<ScheduledTask<A>>,
    seq: u64,
    tx: mpsc::UnboundedSender<Command<A>>,
    rx: mpsc::UnboundedReceiver<Command<A>>,
}

impl<A: Clone + fmt::Debug + Send + 'static> Scheduler<A> {
    pub fn new(interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { interval, heap: BinaryHeap::new(), seq: 0, tx, rx }
    }

    pub fn handle(&self) -> SchedulerHandle<A> {
        SchedulerHandle { tx: self.tx.clone() }
    }

    /// Insert a pending task. No uniqueness is enforced here; callers wanting
    /// at-most-one task per subject cancel stale ones first.
    pub fn schedule(&mut self, execute_at: DateTime<Utc>, job: Job<A>, args: A) {
        let seq = self.seq;
        self.seq += 1;
        tracing::debug!(%execute_at, seq, ?args, "Scheduled task");
        self.heap.push(ScheduledTask { execute_at, seq, args, job });
    }

    /// Remove every pending task whose args match.
    pub fn cancel_matching(&mut self, predicate: impl Fn(&A) -> bool) {
        let before = self.heap.len();
        self.heap.retain(|task| !predicate(&task.args));
        let removed = before - self.heap.len();
        if removed > 0 {
            tracing::debug!(removed, "Cancelled pending tasks");
        }
    }

    /// Number of pending tasks, marshaled commands not yet applied.
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                Command::Schedule { execute_at, job, args } => {
                    self.schedule(execute_at, job, args);
                }
                Command::CancelMatching(predicate) => self.cancel_matching(predicate),
            }
        }
    }

    /// Execute every task due at `now`, earliest first, each independently
    /// guarded: a failing job is logged with its context and dropped, and the
    /// remaining due tasks still run. Never touches a task with
    /// `execute_at > now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        self.drain_commands();
        while self.heap.peek().is_some_and(|task| task.execute_at <= now) {
            let Some(task) = self.heap.pop() else { break };
            tracing::debug!(execute_at = %task.execute_at, args = ?task.args, "Executing task");
            if let Err(e) = (task.job)(task.args.clone()).await {
                tracing::error!(
                    execute_at = %task.execute_at,
                    args = ?task.args,
                    "Task execution failed: {e:#}"
                );
            }
        }
    }

    /// Endless tick loop. The tick and the interval sleep run in the same
    /// cycle, so the cadence between cycle starts is `max(tick, interval)`,
    /// never their sum. A slow tick delays the next cycle but two ticks never
    /// overlap.
    pub async fn run(mut self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler running");
        loop {
            let interval = self.interval;
            tokio::join!(self.tick(Utc::now()), tokio::time::sleep(interval));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    fn recording_job(log: Arc<Mutex<Vec<i64>>>) -> Job<i64> {
        Arc::new(move |args| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(args);
                Ok(())
            })
        })
    }

    fn failing_job() -> Job<i64> {
        Arc::new(|_| Box::pin(async { anyhow::bail!("boom") }))
    }

    #[tokio::test]
    async fn test_tick_executes_only_due_tasks() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();

        scheduler.schedule(now - ChronoDuration::minutes(5), recording_job(log.clone()), 1);
        scheduler.schedule(now, recording_job(log.clone()), 2);
        scheduler.schedule(now + ChronoDuration::minutes(5), recording_job(log.clone()), 3);

        scheduler.tick(now).await;

        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_equal_timestamps_run_in_insertion_order() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();
        let at = now - ChronoDuration::seconds(1);

        for id in [10, 20, 30] {
            scheduler.schedule(at, recording_job(log.clone()), id);
        }
        scheduler.tick(now).await;

        assert_eq!(*log.lock().unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_the_tick() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();

        scheduler.schedule(now - ChronoDuration::seconds(3), failing_job(), 1);
        scheduler.schedule(now - ChronoDuration::seconds(2), recording_job(log.clone()), 2);
        scheduler.tick(now).await;

        assert_eq!(*log.lock().unwrap(), vec![2]);

        // and subsequent ticks still work
        scheduler.schedule(now, recording_job(log.clone()), 3);
        scheduler.tick(now).await;
        assert_eq!(*log.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_then_schedule_leaves_one_task_per_subject() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();

        scheduler.schedule(now + ChronoDuration::days(1), recording_job(log.clone()), 7);
        scheduler.schedule(now + ChronoDuration::days(2), recording_job(log.clone()), 7);
        scheduler.schedule(now + ChronoDuration::days(3), recording_job(log.clone()), 8);

        // the reschedule pattern: cancel the subject, then insert fresh
        scheduler.cancel_matching(|args| *args == 7);
        scheduler.schedule(now + ChronoDuration::days(4), recording_job(log.clone()), 7);

        assert_eq!(scheduler.pending(), 2);
        let mine = scheduler.heap.iter().filter(|t| t.args == 7).count();
        assert_eq!(mine, 1);
    }

    #[tokio::test]
    async fn test_handle_marshals_onto_tick() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();
        let handle = scheduler.handle();

        handle.schedule(now, recording_job(log.clone()), 5);
        assert_eq!(scheduler.pending(), 0); // not applied until a tick drains it

        scheduler.tick(now).await;
        assert_eq!(*log.lock().unwrap(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_cadence_is_max_of_tick_and_interval() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let handle = scheduler.handle();
        let started = tokio::time::Instant::now();
        let fired = Arc::new(Mutex::new(Vec::new()));

        // first cycle's tick outlives the 60s interval sleep
        let slow: Job<i64> = Arc::new(|_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(90)).await;
                Ok(())
            })
        });
        scheduler.schedule(Utc::now() - ChronoDuration::hours(1), slow, 1);
        tokio::spawn(scheduler.run());

        // let the first cycle begin, then queue an already-due task; it is
        // drained when the second cycle starts
        tokio::time::sleep(Duration::from_secs(1)).await;
        let recorder: Job<i64> = {
            let fired = Arc::clone(&fired);
            Arc::new(move |args| {
                let fired = Arc::clone(&fired);
                Box::pin(async move {
                    fired.lock().unwrap().push((args, started.elapsed()));
                    Ok(())
                })
            })
        };
        handle.schedule(Utc::now() - ChronoDuration::hours(1), recorder, 2);

        tokio::time::sleep(Duration::from_secs(120)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        let (_, at) = fired[0];
        // the second cycle starts when the 90s tick ends, not at 90s + 60s
        assert!(at >= Duration::from_secs(90), "second cycle started early: {at:?}");
        assert!(at < Duration::from_secs(150), "interval was added onto the tick: {at:?}");
    }

    #[tokio::test]
    async fn test_job_scheduling_from_inside_a_job() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();
        let handle = scheduler.handle();

        let inner = recording_job(log.clone());
        let outer: Job<i64> = Arc::new(move |args| {
            let handle = handle.clone();
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                handle.schedule(Utc::now(), inner, args + 1);
                Ok(())
            })
        });

        scheduler.schedule(now, outer, 1);
        scheduler.tick(now).await;
        assert!(log.lock().unwrap().is_empty());

        // the re-registered task fires on the next tick
        scheduler.tick(Utc::now()).await;
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }
}
