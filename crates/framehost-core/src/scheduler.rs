//! The per-frame scheduler loop.
//!
//! [`Scheduler::run`] is a future that never completes on its own: every
//! iteration runs one frame and then yields back to the host. The host
//! drives it through a [`FrameDriver`], polling it once per host frame.
//!
//! A frame runs these phases in order:
//!
//! 1. drain the job queue, including jobs queued by jobs
//! 2. resume ready fibers
//! 3. tick the managed runtime
//! 4. tick every module with a tick hook

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::noop_waker;

use crate::bootstrap::{Bootstrap, Materialized};
use crate::context::{FrameContext, HostContext};
use crate::dispatch::{DispatchReport, HookCall, HookSite, call_hook};
use crate::error::{Error, Result};
use crate::fiber::{FiberTick, yield_frame};
use crate::job::{self, DrainReport};
use crate::module::Capability;
use crate::runtime::{DylibRuntime, HostApi, IdleRuntime, ManagedRuntime, ManagedTick};

enum State {
    Setup,
    Running(ManagedTick),
}

/// Counts from one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Index of the frame, starting at 0.
    pub frame: u64,
    pub jobs: DrainReport,
    pub fibers: FiberTick,
    /// Module tick hooks called.
    pub ticks: DispatchReport,
}

/// Owns the frame loop of one host context.
pub struct Scheduler {
    host: Arc<HostContext>,
    runtime: Box<dyn ManagedRuntime>,
    bootstrap: Option<Bootstrap>,
    state: State,
    frame: u64,
}

impl Scheduler {
    pub fn new(host: Arc<HostContext>, runtime: impl ManagedRuntime + 'static) -> Self {
        Self {
            host,
            runtime: Box::new(runtime),
            bootstrap: None,
            state: State::Setup,
            frame: 0,
        }
    }

    /// Build a scheduler from the host's config: the configured runtime
    /// library (or none) and bootstrap payload (or none).
    pub fn from_config(host: Arc<HostContext>) -> Result<Self> {
        let config = host.config().clone();

        let mut scheduler = match &config.runtime.library {
            Some(library) => Self::new(host, DylibRuntime::new(library)),
            None => {
                tracing::warn!("No managed runtime configured, running modules only");
                Self::new(host, IdleRuntime)
            }
        };

        if let Some(source) = &config.bootstrap.source {
            let bootstrap = Bootstrap::from_file(source, config.bootstrap.target.clone())?;
            scheduler = scheduler.with_bootstrap(bootstrap);
        }

        Ok(scheduler)
    }

    /// Materialize `bootstrap` during setup.
    pub fn with_bootstrap(mut self, bootstrap: Bootstrap) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    /// Number of frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// One-time bring-up. Every failure is returned as [`Error::Startup`].
    pub fn setup(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        if let Some(bootstrap) = &self.bootstrap {
            if let Materialized::Written(bytes) = bootstrap.materialize()? {
                tracing::info!(
                    "Bootstrap written to {} ({} bytes)",
                    bootstrap.target().display(),
                    bytes
                );
            }
        }

        self.host.publish_config();

        let api = HostApi::new(&self.host);
        let tick = self.runtime.start(&api).map_err(|e| match e {
            Error::Startup(_) => e,
            other => Error::Startup(format!("{} failed to start: {}", self.runtime.name(), other)),
        })?;

        tracing::info!("Scheduler running with {} runtime", self.runtime.name());
        self.state = State::Running(tick);
        Ok(())
    }

    /// Run one frame, setting up first if needed.
    pub fn run_frame(&mut self) -> Result<FrameReport> {
        if !self.is_running() {
            self.setup()?;
        }

        let jobs = job::drain(&self.host);
        let fibers = self.host.fibers().tick();

        if let State::Running(tick) = &mut self.state {
            tick();
        }

        let mut ticks = DispatchReport::default();
        let ctx = FrameContext::new(&self.host, self.frame);
        for module in self.host.modules().snapshot_with(Capability::Tick) {
            match call_hook(&module, HookSite::Tick, |m| m.tick(&ctx)) {
                HookCall::Completed => ticks.delivered += 1,
                HookCall::Failed => ticks.failed += 1,
                HookCall::Released => {}
            }
        }

        let report = FrameReport {
            frame: self.frame,
            jobs,
            fibers,
            ticks,
        };
        tracing::trace!("Frame finished: {:?}", report);

        self.frame += 1;
        Ok(report)
    }

    /// The scheduler loop. Completes only when a frame fails to start.
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.run_frame()?;
            yield_frame().await;
        }
    }
}

type LoopFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Drives a [`Scheduler`] one frame per host frame.
pub struct FrameDriver {
    host: Arc<HostContext>,
    future: Option<LoopFuture>,
}

impl FrameDriver {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            host: Arc::clone(scheduler.host()),
            future: Some(Box::pin(scheduler.run())),
        }
    }

    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    /// Resume the loop for one frame.
    ///
    /// A start-up failure is returned from the first call. Once the loop
    /// has ended, every later call returns [`Error::SchedulerStopped`].
    /// Panics from the managed tick or from fibers propagate and end the
    /// loop the same way.
    pub fn on_frame(&mut self) -> Result<()> {
        let Some(future) = self.future.as_mut() else {
            return Err(Error::SchedulerStopped);
        };

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let polled = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        let poll = match polled {
            Ok(poll) => poll,
            Err(payload) => {
                // A panicked async fn must not be polled again.
                self.future = None;
                tracing::error!("Scheduler loop panicked, stopping");
                panic::resume_unwind(payload);
            }
        };

        match poll {
            Poll::Pending => Ok(()),
            Poll::Ready(result) => {
                self.future = None;
                result.and(Err(Error::SchedulerStopped))
            }
        }
    }

    /// Stop driving and unload every module. Returns how many were unloaded.
    pub fn shutdown(mut self) -> usize {
        self.future = None;
        self.host.detach()
    }
}
