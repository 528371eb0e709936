//! Suspension points for cooperative code.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::sync::lock;

/// Future that suspends once and completes on the next resume.
///
/// Used as the end-of-frame wait of the scheduler loop and as the
/// building block of [`Suspender`].
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldFrame {
    yielded: bool,
}

/// Suspend until the next frame.
pub fn yield_frame() -> YieldFrame {
    YieldFrame::default()
}

impl Future for YieldFrame {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}

/// Wake-up deadline shared between a fiber and its pool.
pub(crate) type WakeSlot = Arc<Mutex<Option<Instant>>>;

/// Handle a fiber uses to give the frame back.
///
/// Each fiber receives its own `Suspender` when spawned.
#[derive(Clone)]
pub struct Suspender {
    wake_at: WakeSlot,
}

impl Suspender {
    pub(crate) fn new(wake_at: WakeSlot) -> Self {
        Self { wake_at }
    }

    /// Suspend until the next frame.
    pub fn next_frame(&self) -> YieldFrame {
        yield_frame()
    }

    /// Suspend for at least `duration`. Zero behaves like [`next_frame`](Self::next_frame).
    pub async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            *lock(&self.wake_at) = Some(Instant::now() + duration);
        }
        yield_frame().await;
    }

    /// Suspend for `frames` frames.
    pub async fn wait_frames(&self, frames: u32) {
        for _ in 0..frames {
            yield_frame().await;
        }
    }
}
