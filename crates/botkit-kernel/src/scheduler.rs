//! [`Scheduler`] – one-shot and periodic callbacks with cancelable handles.
//!
//! Each job is backed by one Tokio task. Jobs from different handles run in
//! parallel; invocations of a single periodic job never overlap. When a
//! callback outlives its period the missed ticks collapse into one tick that
//! fires as soon as the callback returns, and the cadence restarts from
//! there.
//!
//! Every live job is kept in the scheduler's registry under a UUID so it
//! can be inspected ([`Scheduler::job`], [`Scheduler::jobs`]) or cancelled
//! in bulk ([`Scheduler::cancel_all`]). Jobs leave the registry when they
//! finish or are cancelled.
//! Dropping the scheduler does not stop its jobs; their handles still can.
//!
//! A process-wide instance backs the free functions [`after`] and [`every`];
//! construct a [`Scheduler`] directly for an isolated registry.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() {
//! use botkit_kernel::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new();
//! let handle = scheduler.every("50ms", || println!("tick"));
//! tokio::time::sleep(std::time::Duration::from_millis(175)).await;
//! handle.cancel();
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};
use uuid::Uuid;

use crate::interval::IntoInterval;

/// Shortest period accepted by [`Scheduler::every`].
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    After,
    Every,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::After => write!(f, "after"),
            JobKind::Every => write!(f, "every"),
        }
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub kind: JobKind,
    pub period: Duration,
    /// Completed invocations so far.
    pub ticks: u64,
}

/// Called with the job and the panic message whenever a callback panics.
pub type PanicHook = Arc<dyn Fn(&JobInfo, &str) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Job state and handle
// ─────────────────────────────────────────────────────────────────────────────

struct JobState {
    id: Uuid,
    kind: JobKind,
    period: Duration,
    ticks: AtomicU64,
    cancel: watch::Sender<bool>,
}

impl JobState {
    fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            kind: self.kind,
            period: self.period,
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }

    fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Cancelable reference to a scheduled job. Clones refer to the same job.
#[derive(Clone)]
pub struct JobHandle {
    state: Arc<JobState>,
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.state.id)
            .field("kind", &self.state.kind)
            .field("period", &self.state.period)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn kind(&self) -> JobKind {
        self.state.kind
    }

    pub fn period(&self) -> Duration {
        self.state.period
    }

    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::Relaxed)
    }

    /// Prevent any further invocation. An invocation already running is
    /// allowed to finish. Idempotent.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    jobs: Mutex<HashMap<Uuid, Arc<JobState>>>,
    panic_hook: RwLock<Option<PanicHook>>,
}

impl Inner {
    fn remove(&self, id: &Uuid) {
        self.jobs.lock().remove(id);
    }
}

/// Run one invocation of `callback`, isolating panics. The hook is reported
/// to only while the scheduler is still alive.
fn invoke<F: Fn()>(inner: &Weak<Inner>, state: &JobState, callback: &F) {
    let outcome = catch_unwind(AssertUnwindSafe(callback));
    state.ticks.fetch_add(1, Ordering::Relaxed);
    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        let info = state.info();
        error!(job = %info.id, kind = %info.kind, panic = %message, "scheduled callback panicked");
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let hook = inner.panic_hook.read().clone();
        if let Some(hook) = hook {
            hook(&info, &message);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Registry of jobs plus the entry points that spawn them.
///
/// Clone it cheaply: clones share one registry. All spawning methods must
/// be called inside a Tokio runtime.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").field("jobs", &self.len()).finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook`, replacing any previous one.
    pub fn set_panic_hook(&self, hook: PanicHook) {
        *self.inner.panic_hook.write() = Some(hook);
    }

    /// Run `callback` once after `delay`.
    ///
    /// # Panics
    ///
    /// When `delay` is a malformed duration string.
    pub fn after<D, F>(&self, delay: D, callback: F) -> JobHandle
    where
        D: IntoInterval,
        F: FnOnce() + Send + 'static,
    {
        let delay = delay.into_interval();
        let (state, mut cancel_rx) = self.register(JobKind::After, delay);
        let inner = Arc::downgrade(&self.inner);
        let job = state.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => {}
                _ = tokio::time::sleep(delay) => {
                    if !job.is_cancelled() {
                        // FnOnce cannot be re-borrowed, so wrap it for `invoke`.
                        let once = Mutex::new(Some(callback));
                        let run = || {
                            if let Some(f) = once.lock().take() {
                                f();
                            }
                        };
                        invoke(&inner, &job, &run);
                    }
                }
            }
            finish(&inner, &job);
        });

        JobHandle { state }
    }

    /// Run `callback` every `period`, first after one full period.
    ///
    /// # Panics
    ///
    /// When `period` is a malformed duration string or shorter than
    /// [`MIN_PERIOD`].
    pub fn every<D, F>(&self, period: D, callback: F) -> JobHandle
    where
        D: IntoInterval,
        F: Fn() + Send + 'static,
    {
        let period = period.into_interval();
        assert!(
            period >= MIN_PERIOD,
            "period {period:?} is shorter than the {MIN_PERIOD:?} minimum"
        );
        let (state, mut cancel_rx) = self.register(JobKind::Every, period);
        let inner = Arc::downgrade(&self.inner);
        let job = state.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel_rx) => break,
                    _ = ticker.tick() => {
                        if job.is_cancelled() {
                            break;
                        }
                        invoke(&inner, &job, &callback);
                    }
                }
            }
            finish(&inner, &job);
        });

        JobHandle { state }
    }

    /// Cancel `handle` and drop it from the registry. Idempotent.
    pub fn cancel(&self, handle: &JobHandle) {
        handle.cancel();
        self.inner.remove(&handle.id());
    }

    /// Cancel every registered job.
    pub fn cancel_all(&self) {
        let jobs: Vec<Arc<JobState>> = self.inner.jobs.lock().drain().map(|(_, s)| s).collect();
        if !jobs.is_empty() {
            debug!(count = jobs.len(), "cancelling scheduled jobs");
        }
        for job in jobs {
            job.cancel();
        }
    }

    pub fn job(&self, id: Uuid) -> Option<JobInfo> {
        self.inner.jobs.lock().get(&id).map(|s| s.info())
    }

    /// Snapshot of every live job, in no particular order.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.inner.jobs.lock().values().map(|s| s.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, kind: JobKind, period: Duration) -> (Arc<JobState>, watch::Receiver<bool>) {
        let (cancel, cancelled) = watch::channel(false);
        let state = Arc::new(JobState {
            id: Uuid::new_v4(),
            kind,
            period,
            ticks: AtomicU64::new(0),
            cancel,
        });
        self.inner.jobs.lock().insert(state.id, state.clone());
        debug!(job = %state.id, kind = %kind, ?period, "job scheduled");
        (state, cancelled)
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    // The sender lives in the job state, so an error cannot happen while
    // the task holds the job; treat it as cancellation regardless.
    let _ = rx.wait_for(|c| *c).await;
}

fn finish(inner: &Weak<Inner>, job: &JobState) {
    if let Some(inner) = inner.upgrade() {
        inner.remove(&job.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-wide default
// ─────────────────────────────────────────────────────────────────────────────

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// The process-wide scheduler used by [`after`] and [`every`].
pub fn global() -> &'static Scheduler {
    GLOBAL.get_or_init(Scheduler::new)
}

/// [`Scheduler::after`] on the [`global`] scheduler.
pub fn after<D, F>(delay: D, callback: F) -> JobHandle
where
    D: IntoInterval,
    F: FnOnce() + Send + 'static,
{
    global().after(delay, callback)
}

/// [`Scheduler::every`] on the [`global`] scheduler.
pub fn every<D, F>(period: D, callback: F) -> JobHandle
where
    D: IntoInterval,
    F: Fn() + Send + 'static,
{
    global().every(period, callback)
}
