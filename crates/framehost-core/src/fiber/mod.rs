//! Cooperative fiber pool.
//!
//! A fiber is a `Send` future resumed by polling it with a no-op waker.
//! Suspending is awaiting one of the [`Suspender`] futures; the pool resumes
//! each ready fiber once per [`tick`](FiberPool::tick). Fibers are never
//! preempted.

mod suspend;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::task::noop_waker;

use crate::sync::lock;

pub use suspend::{Suspender, YieldFrame, yield_frame};
use suspend::WakeSlot;

/// Identifier of a spawned fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FiberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fiber#{}", self.0)
    }
}

type FiberFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Fiber {
    id: FiberId,
    name: String,
    wake_at: WakeSlot,
    future: FiberFuture,
}

impl Fiber {
    /// Ready unless sleeping on a deadline that has not passed. Clears an
    /// expired deadline.
    fn is_ready(&self, now: Instant) -> bool {
        let mut wake_at = lock(&self.wake_at);
        match *wake_at {
            Some(deadline) if deadline > now => false,
            Some(_) => {
                *wake_at = None;
                true
            }
            None => true,
        }
    }
}

/// Counts from one pool tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FiberTick {
    /// Fibers polled this tick.
    pub resumed: usize,
    /// Fibers that ran to completion this tick.
    pub finished: usize,
    /// Fibers skipped because their wait has not elapsed.
    pub sleeping: usize,
}

/// Pool of cooperative fibers owned by the scheduler.
///
/// Fibers may be spawned from any thread. Only the scheduler thread ticks
/// the pool. A fiber spawned while the pool is ticking first runs on the
/// following tick.
#[derive(Default)]
pub struct FiberPool {
    next_id: AtomicU64,
    spawned: Mutex<Vec<Fiber>>,
    active: Mutex<Vec<Fiber>>,
}

impl FiberPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a fiber. `body` receives the fiber's [`Suspender`].
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, body: F) -> FiberId
    where
        F: FnOnce(Suspender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = FiberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let wake_at: WakeSlot = Arc::new(Mutex::new(None));
        let future = Box::pin(body(Suspender::new(Arc::clone(&wake_at))));
        let fiber = Fiber {
            id,
            name: name.into(),
            wake_at,
            future,
        };

        tracing::debug!("Spawned {} '{}'", id, fiber.name);
        lock(&self.spawned).push(fiber);
        id
    }

    /// Resume every ready fiber once.
    ///
    /// A panic inside a fiber is not caught here; it propagates to the
    /// caller. The panicking fiber is dropped and every other unfinished
    /// fiber stays in the pool.
    pub fn tick(&self) -> FiberTick {
        let mut report = FiberTick::default();
        let now = Instant::now();

        let mut fibers = std::mem::take(&mut *lock(&self.active));
        fibers.append(&mut lock(&self.spawned));

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut queue = Requeue {
            active: &self.active,
            kept: Vec::with_capacity(fibers.len()),
            pending: fibers.into_iter(),
        };
        while let Some(mut fiber) = queue.pending.next() {
            if !fiber.is_ready(now) {
                report.sleeping += 1;
                queue.kept.push(fiber);
                continue;
            }
            report.resumed += 1;
            match fiber.future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {
                    tracing::debug!("{} '{}' finished", fiber.id, fiber.name);
                    report.finished += 1;
                }
                Poll::Pending => queue.kept.push(fiber),
            }
        }

        report
    }

    /// Number of fibers that have not finished.
    pub fn len(&self) -> usize {
        lock(&self.active).len() + lock(&self.spawned).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns unfinished fibers to the pool when a tick ends, normally or by
/// unwinding.
struct Requeue<'a> {
    active: &'a Mutex<Vec<Fiber>>,
    kept: Vec<Fiber>,
    pending: std::vec::IntoIter<Fiber>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        let mut active = lock(self.active);
        active.append(&mut self.kept);
        active.extend(self.pending.by_ref());
    }
}
