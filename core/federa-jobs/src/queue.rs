use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use federa_common::errors::error_of::ErrorOf;
use federa_common::futures::catch_panic::{CatchPanicExt, catch_panic_sync};
use federa_common::impl_error_kind;
use federa_common::log::{error, trace};
use federa_common::make_metrics;
use federa_common::metrics::{Metrics, TimedFutureExt};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};

use crate::limits::JobQueueLimits;

/// What a job reports once its synchronous part has run.
pub enum JobOutcome {
    Done,
    /// The job continues asynchronously; the key stays busy until the future
    /// resolves.
    Pending(BoxFuture<'static, ()>),
}

pub type Job = Box<dyn FnOnce() -> JobOutcome + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScheduleErrorKind {
    Full,
    Closed,
}

impl_error_kind!(ScheduleErrorKind);

#[derive(derive_more::Debug)]
pub struct JobQueue<K> {
    #[debug(skip)]
    inner: Arc<Inner<K>>,
}

struct Inner<K> {
    name:        Arc<str>,
    limits:      JobQueueLimits,
    handle:      Handle,
    concurrency: Arc<Semaphore>,
    drained:     Notify,
    metrics:     Metrics,
    state:       Mutex<State<K>>,
}

struct State<K> {
    closed:  bool,
    pending: usize,
    /// A key is present while one of its jobs is executing; the deque holds
    /// the jobs waiting behind it.
    busy:    HashMap<K, VecDeque<Queued>>,
}

struct Queued {
    job:          Job,
    scheduled_at: Instant,
}

impl<K> JobQueue<K>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Arc<str>>, limits: JobQueueLimits, handle: Handle) -> Self {
        let name: Arc<str> = name.into();
        let metrics = make_metrics!("federa_job", "queue" => name.to_string());
        let concurrency = Arc::new(Semaphore::new(limits.max_concurrency.max(1)));
        let inner = Inner {
            name,
            limits,
            handle,
            concurrency,
            drained: Notify::new(),
            metrics,
            state: Mutex::new(State {
                closed:  false,
                pending: 0,
                busy:    Default::default(),
            }),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schedule(&self, key: K, job: Job) -> Result<(), ErrorOf<ScheduleErrorKind>> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        if state.closed {
            inner.metrics.rejected.increment(1);
            return Err(ErrorOf::new(ScheduleErrorKind::Closed, "job queue is closed"))
        }
        if state.pending >= inner.limits.max_pending {
            inner.metrics.rejected.increment(1);
            return Err(ErrorOf::new(
                ScheduleErrorKind::Full,
                format!("job queue {} is full", inner.name),
            ))
        }
        state.pending += 1;
        inner.metrics.scheduled.increment(1);
        let job = Queued {
            job,
            scheduled_at: Instant::now(),
        };

        if let Some(waiting) = state.busy.get_mut(&key) {
            let queued = waiting.len() + 1;
            trace!(queue = %inner.name, ?key, queued, "job queued behind a running one");
            waiting.push_back(job);
            return Ok(())
        }

        state.busy.insert(key.clone(), VecDeque::new());
        std::mem::drop(state);

        inner.handle.spawn(run_key(inner.clone(), key, job));
        Ok(())
    }

    /// Rejects further jobs and discards the ones that have not started yet.
    /// Jobs already executing run to completion. Discarded jobs are dropped
    /// outside the queue's lock.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        let discarded: Vec<Queued> = state.busy.values_mut().flat_map(|q| q.drain(..)).collect();
        state.pending -= discarded.len();
        let drained = state.pending == 0;
        std::mem::drop(state);

        trace!(queue = %self.inner.name, discarded = discarded.len(), "closed");
        std::mem::drop(discarded);

        if drained {
            self.inner.drained.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending
    }

    pub fn is_busy(&self, key: &K) -> bool {
        self.inner.state.lock().busy.contains_key(key)
    }

    /// Resolves once no job is pending.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            if self.pending() == 0 {
                return
            }
            notified.await;
        }
    }
}

impl<K> Clone for JobQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

async fn run_key<K>(inner: Arc<Inner<K>>, key: K, mut job: Queued)
where
    K: Hash + Eq + fmt::Debug,
{
    loop {
        let permit = inner.concurrency.clone().acquire_owned().await.ok();
        run_one(&inner, &key, job).await;
        std::mem::drop(permit);

        let mut state = inner.state.lock();
        state.pending -= 1;
        let next = match state.busy.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(next) => Some(next),
            None => {
                state.busy.remove(&key);
                None
            },
        };
        let drained = state.pending == 0;
        std::mem::drop(state);

        if drained {
            inner.drained.notify_waiters();
        }
        match next {
            Some(next) => job = next,
            None => break,
        }
    }
}

async fn run_one<K>(inner: &Inner<K>, key: &K, queued: Queued)
where
    K: fmt::Debug,
{
    let Queued { job, scheduled_at } = queued;
    let timer = inner.metrics.job_started(scheduled_at);
    let outcome = match catch_panic_sync(job) {
        Ok(outcome) => outcome,
        Err(reason) => {
            inner.metrics.panicked.increment(1);
            error!(queue = %inner.name, ?key, %reason, "job panicked");
            return
        },
    };
    match outcome {
        JobOutcome::Done => {
            timer.finish();
        },
        JobOutcome::Pending(fut) => {
            if let Err(reason) = fut.catch_panic().timed(timer).await {
                inner.metrics.panicked.increment(1);
                error!(queue = %inner.name, ?key, %reason, "async job panicked");
            }
        },
    }
}
