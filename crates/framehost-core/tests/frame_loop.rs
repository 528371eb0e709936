//! Integration tests for the frame loop and event dispatch.
//!
//! Modules are served by an in-memory loader so the tests exercise the
//! scheduler, registry and dispatcher without mapping shared libraries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use framehost_core::{
    Capabilities, Capability, Error, FrameContext, FrameDriver, HookResult, HostApi, HostContext,
    IdleRuntime, Job, JobOutcome, KeyEvent, ManagedTick, Module, Result, Scheduler,
    SurfaceHandle,
};

// =============================================================================
// Test Helpers
// =============================================================================

type Journal = Arc<Mutex<Vec<String>>>;

/// How a fake module behaves.
#[derive(Clone, Copy, Default)]
struct Behaviour {
    tick: bool,
    present: bool,
    keyboard: bool,
    fail_tick: bool,
    fail_present: bool,
    /// Queue an unload of itself from its first tick.
    unload_self: bool,
    /// Start a fiber from its first tick.
    spawn_fiber: bool,
}

struct FakeModule {
    name: String,
    behaviour: Behaviour,
    journal: Journal,
}

impl FakeModule {
    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

impl Module for FakeModule {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
            .with_if(Capability::Tick, self.behaviour.tick)
            .with_if(Capability::Present, self.behaviour.present)
            .with_if(Capability::Keyboard, self.behaviour.keyboard)
    }

    fn tick(&self, ctx: &FrameContext<'_>) -> HookResult {
        self.record(format!("tick {} #{}", self.name, ctx.frame()));
        if self.behaviour.fail_tick {
            return Err("tick refused".into());
        }
        if ctx.frame() == 0 {
            if self.behaviour.unload_self {
                ctx.enqueue(Job::Unload(PathBuf::from(&self.name)));
            }
            if self.behaviour.spawn_fiber {
                let journal = Arc::clone(&self.journal);
                ctx.spawn_fiber("countdown", move |s| async move {
                    for step in 0..3 {
                        journal.lock().unwrap().push(format!("fiber step {}", step));
                        s.next_frame().await;
                    }
                });
            }
        }
        Ok(())
    }

    fn present(&self, surface: SurfaceHandle) -> HookResult {
        if self.behaviour.fail_present {
            panic!("present exploded");
        }
        self.record(format!("present {} {:#x}", self.name, surface.raw()));
        Ok(())
    }

    fn keyboard(&self, event: &KeyEvent) -> HookResult {
        self.record(format!("key {} {:#x}", self.name, event.key));
        Ok(())
    }
}

/// Host whose loader serves modules from a fixed table.
fn host(modules: &[(&str, Behaviour)]) -> (Arc<HostContext>, Journal) {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let table: HashMap<PathBuf, Behaviour> = modules
        .iter()
        .map(|(path, behaviour)| (PathBuf::from(path), *behaviour))
        .collect();

    let sink = Arc::clone(&journal);
    let host = HostContext::builder()
        .loader(move |path: &Path| -> Result<Box<dyn Module>> {
            let behaviour = table.get(path).copied().ok_or_else(|| Error::ModuleLoad {
                path: path.to_path_buf(),
                message: "not found".to_string(),
            })?;
            Ok(Box::new(FakeModule {
                name: path.display().to_string(),
                behaviour,
                journal: Arc::clone(&sink),
            }))
        })
        .build();

    (host, journal)
}

/// Host whose loader builds every module with `factory`.
fn host_serving(
    factory: impl Fn() -> Box<dyn Module> + Send + Sync + 'static,
) -> Arc<HostContext> {
    HostContext::builder()
        .loader(move |_: &Path| -> Result<Box<dyn Module>> { Ok(factory()) })
        .build()
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

fn count(journal: &Journal, prefix: &str) -> usize {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .count()
}

const PRESENTER: Behaviour = Behaviour {
    tick: false,
    present: true,
    keyboard: false,
    fail_tick: false,
    fail_present: false,
    unload_self: false,
    spawn_fiber: false,
};

const TICKER: Behaviour = Behaviour {
    tick: true,
    ..PRESENTER
};

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_load_present_unload_scenario() {
    let (host, journal) = host(&[("A.mod", PRESENTER)]);
    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);
    let surface = SurfaceHandle::from_raw(0x1000);

    host.enqueue(Job::Load("A.mod".into()));
    scheduler.run_frame().unwrap();
    host.on_frame_present(surface);
    assert_eq!(entries(&journal), vec!["present A.mod 0x1000"]);

    host.enqueue(Job::Unload("A.mod".into()));
    scheduler.run_frame().unwrap();
    let report = host.on_frame_present(surface);
    assert_eq!(report.delivered, 0);
    assert_eq!(count(&journal, "present"), 1);
}

#[test]
fn test_unload_of_missing_module_is_not_loaded() {
    let (host, _) = host(&[]);
    let outcome = Job::Unload("B.mod".into()).execute(&host).unwrap();
    assert_eq!(outcome, JobOutcome::NotLoaded);
    assert!(host.modules().is_empty());
}

#[test]
fn test_failed_load_leaves_registry_empty() {
    let (host, _) = host(&[]);
    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);
    host.enqueue(Job::Load("missing.mod".into()));

    let report = scheduler.run_frame().unwrap();
    assert_eq!(report.jobs.failed, 1);
    assert!(host.modules().is_empty());
}

#[test]
fn test_capabilities_gate_dispatch() {
    let keyboard_only = Behaviour {
        keyboard: true,
        present: false,
        ..PRESENTER
    };
    let (host, journal) = host(&[("K.mod", keyboard_only)]);
    let outcome = Job::Load("K.mod".into()).execute(&host).unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Loaded {
            name: "K.mod".to_string(),
            capabilities: Capabilities::NONE.with(Capability::Keyboard),
        }
    );

    host.on_frame_present(SurfaceHandle::from_raw(1));
    host.on_keyboard(&KeyEvent::pressed(0x1b));
    assert_eq!(entries(&journal), vec!["key K.mod 0x1b"]);
}

// =============================================================================
// Frame ordering
// =============================================================================

#[test]
fn test_reentrant_jobs_run_before_ticks() {
    let (host, journal) = host(&[("T.mod", TICKER)]);
    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);
    Job::Load("T.mod".into()).execute(&host).unwrap();

    let outer = Arc::clone(&journal);
    host.enqueue(Job::invoke(move |host| {
        outer.lock().unwrap().push("outer job".to_string());
        let inner = Arc::clone(&outer);
        host.enqueue(Job::invoke(move |_| {
            inner.lock().unwrap().push("inner job".to_string());
            Ok(())
        }));
        Ok(())
    }));

    scheduler.run_frame().unwrap();
    assert_eq!(entries(&journal), vec!["outer job", "inner job", "tick T.mod #0"]);
}

#[test]
fn test_runtime_ticks_between_fibers_and_modules() {
    let (host, journal) = host(&[("T.mod", TICKER)]);
    Job::Load("T.mod".into()).execute(&host).unwrap();

    let fiber_journal = Arc::clone(&journal);
    host.spawn_fiber("watcher", move |_| async move {
        fiber_journal.lock().unwrap().push("fiber".to_string());
    });

    let runtime_journal = Arc::clone(&journal);
    let mut scheduler = Scheduler::new(Arc::clone(&host), move |_: &HostApi| -> Result<ManagedTick> {
        let journal = Arc::clone(&runtime_journal);
        Ok(Box::new(move || journal.lock().unwrap().push("runtime".to_string())))
    });

    scheduler.run_frame().unwrap();
    assert_eq!(entries(&journal), vec!["fiber", "runtime", "tick T.mod #0"]);
}

#[test]
fn test_fiber_started_from_tick_resumes_on_later_frames() {
    let spawner = Behaviour {
        spawn_fiber: true,
        ..TICKER
    };
    let (host, journal) = host(&[("F.mod", spawner)]);
    Job::Load("F.mod".into()).execute(&host).unwrap();
    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);

    scheduler.run_frame().unwrap();
    assert_eq!(count(&journal, "fiber"), 0);

    for _ in 0..4 {
        scheduler.run_frame().unwrap();
    }
    assert_eq!(count(&journal, "fiber step"), 3);
    assert!(host.fibers().is_empty());
}

// =============================================================================
// Failure isolation
// =============================================================================

#[test]
fn test_failing_present_does_not_block_other_modules() {
    let broken = Behaviour {
        fail_present: true,
        ..PRESENTER
    };
    let (host, journal) = host(&[("Broken.mod", broken), ("A.mod", PRESENTER)]);
    Job::Load("Broken.mod".into()).execute(&host).unwrap();
    Job::Load("A.mod".into()).execute(&host).unwrap();

    let report = host.on_frame_present(SurfaceHandle::from_raw(0x20));
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(entries(&journal), vec!["present A.mod 0x20"]);
}

#[test]
fn test_failing_tick_keeps_ticking_every_frame() {
    let failing = Behaviour {
        fail_tick: true,
        ..TICKER
    };
    let (host, journal) = host(&[("Bad.mod", failing), ("Good.mod", TICKER)]);
    Job::Load("Bad.mod".into()).execute(&host).unwrap();
    Job::Load("Good.mod".into()).execute(&host).unwrap();
    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);

    for _ in 0..3 {
        let report = scheduler.run_frame().unwrap();
        assert_eq!(report.ticks.failed, 1);
        assert_eq!(report.ticks.delivered, 1);
    }
    assert_eq!(count(&journal, "tick Bad.mod"), 3);
    assert_eq!(count(&journal, "tick Good.mod"), 3);
}

#[test]
fn test_module_can_unload_itself_from_tick() {
    let leaving = Behaviour {
        unload_self: true,
        ..TICKER
    };
    let (host, journal) = host(&[("Leaving.mod", leaving)]);
    Job::Load("Leaving.mod".into()).execute(&host).unwrap();
    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);

    scheduler.run_frame().unwrap();
    scheduler.run_frame().unwrap();
    scheduler.run_frame().unwrap();

    assert!(host.modules().is_empty());
    assert_eq!(entries(&journal), vec!["tick Leaving.mod #0"]);
}

/// Tick hook that unloads its own module synchronously through the registry.
struct SelfUnloading {
    ticks: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl Module for SelfUnloading {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with(Capability::Tick)
    }

    fn tick(&self, ctx: &FrameContext<'_>) -> HookResult {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if !ctx.host().modules().unload(Path::new("Self.mod")) {
            return Err("module was not registered".into());
        }
        // Still alive: this call keeps it until it returns.
        if self.dropped.load(Ordering::SeqCst) {
            return Err("dropped while running".into());
        }
        Ok(())
    }
}

impl Drop for SelfUnloading {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_module_can_unload_itself_synchronously_from_tick() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let (tick_count, drop_flag) = (Arc::clone(&ticks), Arc::clone(&dropped));
    let host = host_serving(move || {
        Box::new(SelfUnloading {
            ticks: Arc::clone(&tick_count),
            dropped: Arc::clone(&drop_flag),
        })
    });
    Job::Load("Self.mod".into()).execute(&host).unwrap();

    let mut scheduler = Scheduler::new(Arc::clone(&host), IdleRuntime);
    let (done, finished) = mpsc::channel();
    let frames = thread::spawn(move || {
        let first = scheduler.run_frame().unwrap();
        let second = scheduler.run_frame().unwrap();
        done.send((first, second)).unwrap();
    });

    let (first, second) = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("frame did not finish after a module unloaded itself");
    frames.join().unwrap();

    assert_eq!(first.ticks.delivered, 1);
    assert_eq!(first.ticks.failed, 0);
    assert_eq!(second.ticks.delivered, 0);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert!(dropped.load(Ordering::SeqCst));
    assert!(host.modules().is_empty());
}

// =============================================================================
// Concurrent unload
// =============================================================================

/// Present hook that parks until the test lets it go.
struct Gated {
    entered: Arc<Barrier>,
    proceed: Arc<Barrier>,
    presents: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl Module for Gated {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with(Capability::Present)
    }

    fn present(&self, _surface: SurfaceHandle) -> HookResult {
        self.presents.fetch_add(1, Ordering::SeqCst);
        self.entered.wait();
        self.proceed.wait();
        Ok(())
    }
}

impl Drop for Gated {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_unload_during_present_drops_module_after_hook_returns() {
    let entered = Arc::new(Barrier::new(2));
    let proceed = Arc::new(Barrier::new(2));
    let presents = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicBool::new(false));

    let (e, p, n, d) = (
        Arc::clone(&entered),
        Arc::clone(&proceed),
        Arc::clone(&presents),
        Arc::clone(&dropped),
    );
    let host = host_serving(move || {
        Box::new(Gated {
            entered: Arc::clone(&e),
            proceed: Arc::clone(&p),
            presents: Arc::clone(&n),
            dropped: Arc::clone(&d),
        })
    });
    Job::Load("Gated.mod".into()).execute(&host).unwrap();

    let render_host = Arc::clone(&host);
    let render = thread::spawn(move || render_host.on_frame_present(SurfaceHandle::from_raw(9)));

    // The present hook is now running on the render thread.
    entered.wait();
    let outcome = Job::Unload("Gated.mod".into()).execute(&host).unwrap();
    assert_eq!(outcome, JobOutcome::Unloaded);
    assert!(host.modules().is_empty());
    assert!(!dropped.load(Ordering::SeqCst), "module dropped under a running hook");

    proceed.wait();
    let report = render.join().unwrap();
    assert_eq!(report.delivered, 1);
    assert!(dropped.load(Ordering::SeqCst));

    let later = host.on_frame_present(SurfaceHandle::from_raw(9));
    assert_eq!(later.delivered, 0);
    assert_eq!(presents.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Start-up
// =============================================================================

#[test]
fn test_runtime_start_failure_is_fatal() {
    let (host, _) = host(&[("A.mod", TICKER)]);
    host.enqueue(Job::Load("A.mod".into()));
    let scheduler = Scheduler::new(Arc::clone(&host), |_: &HostApi| -> Result<ManagedTick> {
        Err(Error::Startup("runtime entry point missing".into()))
    });

    let mut driver = FrameDriver::new(scheduler);
    let err = driver.on_frame().unwrap_err();
    assert!(err.is_fatal());
    // Setup failed before the first drain.
    assert_eq!(host.jobs().len(), 1);
    assert!(host.modules().is_empty());
}

#[test]
fn test_configured_modules_load_on_first_frame() {
    let mut config = framehost_core::HostConfig::default();
    config.modules.autoload = vec![PathBuf::from("A.mod")];

    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&journal);
    let host = HostContext::builder()
        .config(config)
        .loader(move |path: &Path| -> Result<Box<dyn Module>> {
            Ok(Box::new(FakeModule {
                name: path.display().to_string(),
                behaviour: TICKER,
                journal: Arc::clone(&sink),
            }))
        })
        .build();

    assert_eq!(host.enqueue_configured_modules().unwrap(), 1);
    let mut driver = FrameDriver::new(Scheduler::new(Arc::clone(&host), IdleRuntime));
    driver.on_frame().unwrap();

    assert_eq!(host.modules().names(), vec!["A.mod"]);
    assert_eq!(entries(&journal), vec!["tick A.mod #0"]);
    assert_eq!(driver.shutdown(), 1);
}
