//! Instruments for ordered job queues.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use metrics::{Counter, Histogram};

/// Builds the [`Metrics`] of one queue; every series is prefixed with
/// `$name` and carries the given labels.
#[macro_export]
macro_rules! make_metrics {
    ($name:literal $(, $k:literal => $v:expr )* $(,)?) => {{
        const SCHEDULED: &str = concat!($name, "_scheduled_count");
        const REJECTED: &str = concat!($name, "_rejected_count");
        const PANICKED: &str = concat!($name, "_panicked_count");
        const QUEUE_TIME: &str = concat!($name, "_queue_sec");
        const RUN_TIME: &str = concat!($name, "_run_sec");

        $crate::metrics::Metrics {
            scheduled:  ::metrics::counter!(SCHEDULED $(, $k => $v )*),
            rejected:   ::metrics::counter!(REJECTED $(, $k => $v )*),
            panicked:   ::metrics::counter!(PANICKED $(, $k => $v )*),
            queue_time: ::metrics::histogram!(QUEUE_TIME $(, $k => $v )*),
            run_time:   ::metrics::histogram!(RUN_TIME $(, $k => $v )*),
        }
    }};
}

#[derive(Debug, Clone)]
pub struct Metrics {
    pub scheduled:  Counter,
    pub rejected:   Counter,
    pub panicked:   Counter,
    /// From scheduling until the job starts.
    pub queue_time: Histogram,
    /// From the start of a job until it completes, including the future it
    /// may leave behind.
    pub run_time:   Histogram,
}

impl Metrics {
    /// Starts timing a job that was scheduled at `scheduled_at`.
    pub fn job_started(&self, scheduled_at: Instant) -> JobTimer {
        let started_at = Instant::now();
        self.queue_time
            .record(started_at.duration_since(scheduled_at));
        JobTimer {
            run_time: self.run_time.clone(),
            started_at,
        }
    }
}

/// Records the run time of one job when finished.
#[derive(Debug)]
pub struct JobTimer {
    run_time:   Histogram,
    started_at: Instant,
}

impl JobTimer {
    pub fn finish(self) -> Duration {
        let elapsed = self.started_at.elapsed();
        self.run_time.record(elapsed);
        elapsed
    }
}

pub trait TimedFutureExt: Future + Sized {
    /// Finishes `timer` once the future completes.
    fn timed(self, timer: JobTimer) -> TimedFuture<Self> {
        TimedFuture {
            inner: self,
            timer: Some(timer),
        }
    }
}
impl<F> TimedFutureExt for F where F: Future + Sized {}

#[pin_project::pin_project]
pub struct TimedFuture<F> {
    #[pin]
    inner: F,
    timer: Option<JobTimer>,
}

impl<F> Future for TimedFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let poll = this.inner.poll(cx);
        if poll.is_ready() {
            if let Some(timer) = this.timer.take() {
                timer.finish();
            }
        }
        poll
    }
}
