use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type PanicInfo = Box<str>;

pub trait CatchPanicExt: Future + Sized {
    fn catch_panic(self) -> CatchPanic<Self> {
        CatchPanic(self)
    }
}

#[pin_project::pin_project]
pub struct CatchPanic<F>(#[pin] F);

impl<F> Future for CatchPanic<F>
where
    F: Future,
{
    type Output = Result<F::Output, PanicInfo>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match panic::catch_unwind(panic::AssertUnwindSafe(|| this.0.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => Poll::Ready(Err(panic_message(payload))),
        }
    }
}

impl<F> CatchPanicExt for F where Self: Future + Sized {}

/// Runs a synchronous closure, turning a panic into its message.
pub fn catch_panic_sync<T>(f: impl FnOnce() -> T) -> Result<T, PanicInfo> {
    panic::catch_unwind(panic::AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> PanicInfo {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).into()
    } else if let Ok(s) = payload.downcast::<String>() {
        (*s).into()
    } else {
        String::new().into()
    }
}
