use std::future::IntoFuture;
use std::time::Duration;

use tokio::time::{self, Instant};

pub trait FutureTimeoutExt: IntoFuture + Sized {
    fn timeout(self, duration: Duration) -> time::Timeout<Self::IntoFuture> {
        time::timeout(duration, self)
    }

    fn deadline(self, deadline: Instant) -> time::Timeout<Self::IntoFuture> {
        time::timeout_at(deadline, self)
    }
}

impl<F> FutureTimeoutExt for F where F: IntoFuture {}
