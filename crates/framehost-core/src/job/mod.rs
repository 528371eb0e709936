//! Jobs: lifecycle requests executed on the scheduler thread.
//!
//! Any thread may queue a [`Job`]; only the scheduler runs them, during the
//! drain phase at the start of each frame. A job's payload is owned by the
//! job and dropped exactly once, after the job has run.

mod queue;

use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;

use crate::context::HostContext;
use crate::error::{Error, Result};
use crate::module::Capabilities;

pub use queue::JobQueue;

/// Native callback run by an Invoke job.
pub type NativeCallback = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// Rust callback run by an Invoke job.
pub type JobFn = Box<dyn FnOnce(&HostContext) -> Result<()> + Send>;

/// Opaque argument passed to a native callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawArg(pub *mut c_void);

// Safety: the argument is only handed back to the native callback that was
// submitted with it; the submitter is responsible for its thread affinity.
unsafe impl Send for RawArg {}

impl RawArg {
    /// The wrapped pointer. Closures that call this capture the whole
    /// `RawArg`, not the bare pointer.
    pub fn get(self) -> *mut c_void {
        self.0
    }
}

/// Callback carried by an Invoke job.
pub enum Callback {
    Native { func: NativeCallback, arg: RawArg },
    Rust(JobFn),
}

/// A queued request.
pub enum Job {
    /// Map a module and register it.
    Load(PathBuf),
    /// Remove a module from the registry and release it.
    Unload(PathBuf),
    /// Remove and release every module.
    UnloadAll,
    /// Run a callback on the scheduler thread.
    Invoke(Callback),
}

/// Numeric job kinds used over the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum JobKind {
    Load = 0,
    Unload = 1,
    UnloadAll = 2,
    Invoke = 3,
}

impl TryFrom<u32> for JobKind {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(JobKind::Load),
            1 => Ok(JobKind::Unload),
            2 => Ok(JobKind::UnloadAll),
            3 => Ok(JobKind::Invoke),
            other => Err(Error::InvalidJob(format!("unknown job kind {}", other))),
        }
    }
}

impl Job {
    /// Build an Invoke job from a Rust closure.
    pub fn invoke(f: impl FnOnce(&HostContext) -> Result<()> + Send + 'static) -> Self {
        Job::Invoke(Callback::Rust(Box::new(f)))
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Load(_) => JobKind::Load,
            Job::Unload(_) => JobKind::Unload,
            Job::UnloadAll => JobKind::UnloadAll,
            Job::Invoke(_) => JobKind::Invoke,
        }
    }

    /// Decode a job submitted over the C ABI.
    ///
    /// - Load/Unload: `parameter` is a NUL-terminated UTF-8 path. It is
    ///   copied; the caller keeps ownership of its buffer.
    /// - UnloadAll: both parameters are ignored.
    /// - Invoke: `parameter` is a [`NativeCallback`], `parameter_ex` its argument.
    ///
    /// # Safety
    /// Non-null parameters must match the layout described above.
    pub unsafe fn from_raw(
        kind: u32,
        parameter: *mut c_void,
        parameter_ex: *mut c_void,
    ) -> Result<Self> {
        let kind = JobKind::try_from(kind)?;
        if parameter.is_null() && matches!(kind, JobKind::Load | JobKind::Unload | JobKind::Invoke)
        {
            return Err(Error::InvalidJob(format!("{:?} job without parameter", kind)));
        }

        match kind {
            JobKind::Load | JobKind::Unload => {
                let path = unsafe { CStr::from_ptr(parameter as *const c_char) }
                    .to_str()
                    .map_err(|e| Error::InvalidJob(format!("module path is not UTF-8: {}", e)))?;
                let path = PathBuf::from(path);
                Ok(if kind == JobKind::Load {
                    Job::Load(path)
                } else {
                    Job::Unload(path)
                })
            }
            JobKind::UnloadAll => Ok(Job::UnloadAll),
            JobKind::Invoke => {
                let func: NativeCallback = unsafe { std::mem::transmute(parameter) };
                Ok(Job::Invoke(Callback::Native {
                    func,
                    arg: RawArg(parameter_ex),
                }))
            }
        }
    }

    /// Run the job against `host`, consuming it.
    pub fn execute(self, host: &HostContext) -> Result<JobOutcome> {
        match self {
            Job::Load(path) => host.load_module(&path),
            Job::Unload(path) => Ok(host.unload_module(&path)),
            Job::UnloadAll => Ok(JobOutcome::UnloadedAll(host.modules().unload_all())),
            Job::Invoke(Callback::Native { func, arg }) => {
                // Safety: the submitter promised a valid callback and argument.
                let returned = unsafe { func(arg.0) };
                Ok(JobOutcome::Invoked(returned as usize))
            }
            Job::Invoke(Callback::Rust(f)) => f(host).map(|()| JobOutcome::Ran),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Load(path) => write!(f, "load {}", path.display()),
            Job::Unload(path) => write!(f, "unload {}", path.display()),
            Job::UnloadAll => f.write_str("unload all"),
            Job::Invoke(Callback::Native { func, .. }) => {
                write!(f, "invoke native callback {:#x}", *func as usize)
            }
            Job::Invoke(Callback::Rust(_)) => f.write_str("invoke callback"),
        }
    }
}

/// Result of a successfully executed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Loaded {
        name: String,
        capabilities: Capabilities,
    },
    Unloaded,
    /// Unload of a module that was not loaded. Nothing changed.
    NotLoaded,
    UnloadedAll(usize),
    /// Native callback returned this value.
    Invoked(usize),
    /// Rust callback completed.
    Ran,
}

/// Counts from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

/// Run queued jobs until the queue is empty.
///
/// Jobs queued by a running job are picked up by the same drain. A failing
/// or panicking job is logged and the drain moves on.
pub fn drain(host: &HostContext) -> DrainReport {
    let mut report = DrainReport::default();

    while let Some(job) = host.jobs().pop() {
        let label = job.to_string();
        let result = catch_unwind(AssertUnwindSafe(|| job.execute(host)))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

        report.executed += 1;
        match result {
            Ok(outcome) => tracing::debug!("Job '{}' finished: {:?}", label, outcome),
            Err(e) => {
                report.failed += 1;
                tracing::error!("Failed to execute queued job '{}': {}", label, e);
            }
        }
    }

    report
}
