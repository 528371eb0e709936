//! Host context shared by every scheduler component.
//!
//! One `HostContext` exists per host attachment. It owns the job queue, the
//! module registry, the handler lists, the fiber pool and the export table,
//! and is passed explicitly (as `Arc<HostContext>`) to everything that needs
//! them.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::config::HostConfig;
use crate::dispatch::KeyboardHandler;
use crate::error::{Error, Result};
use crate::exports::{CONFIG_EXPORT, ExportTable, ExportedConfig};
use crate::fiber::{FiberId, FiberPool, Suspender};
use crate::handlers::HandlerList;
use crate::job::{Job, JobOutcome, JobQueue};
use crate::logging::{LogHandler, LogHandlerLayer};
use crate::module::{DylibLoader, LoadedModule, ModuleLoader, ModuleRegistry};

/// Shared state of one host attachment.
pub struct HostContext {
    config: HostConfig,
    jobs: JobQueue,
    modules: ModuleRegistry,
    loader: Box<dyn ModuleLoader>,
    fibers: FiberPool,
    keyboard_handlers: HandlerList<KeyboardHandler>,
    log_handlers: Arc<HandlerList<LogHandler>>,
    exports: ExportTable,
    exported_config: OnceLock<ExportedConfig>,
}

/// Builder for [`HostContext`].
pub struct HostContextBuilder {
    config: HostConfig,
    loader: Box<dyn ModuleLoader>,
}

impl HostContextBuilder {
    /// Use a custom module loader instead of shared libraries.
    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<HostContext> {
        tracing::debug!("Host context attached");
        Arc::new(HostContext {
            config: self.config,
            jobs: JobQueue::new(),
            modules: ModuleRegistry::new(),
            loader: self.loader,
            fibers: FiberPool::new(),
            keyboard_handlers: HandlerList::new(),
            log_handlers: Arc::new(HandlerList::new()),
            exports: ExportTable::new(),
            exported_config: OnceLock::new(),
        })
    }
}

impl HostContext {
    /// Start building a context with default config and the shared library loader.
    pub fn builder() -> HostContextBuilder {
        HostContextBuilder {
            config: HostConfig::default(),
            loader: Box::new(DylibLoader),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn fibers(&self) -> &FiberPool {
        &self.fibers
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    /// Queue a job for the next scheduler drain. Never blocks on execution.
    pub fn enqueue(&self, job: Job) {
        self.jobs.enqueue(job);
    }

    /// Queue a Load job for every module named by the config.
    ///
    /// Returns the number of jobs queued.
    pub fn enqueue_configured_modules(&self) -> Result<usize> {
        let paths = self.config.modules.module_paths()?;
        let count = paths.len();
        for path in paths {
            self.enqueue(Job::Load(path));
        }
        Ok(count)
    }

    /// Spawn a fiber on this context's pool.
    pub fn spawn_fiber<F, Fut>(&self, name: impl Into<String>, body: F) -> FiberId
    where
        F: FnOnce(Suspender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.fibers.spawn(name, body)
    }

    pub fn register_keyboard_handler(&self, handler: KeyboardHandler) {
        self.keyboard_handlers.register(handler);
    }

    pub(crate) fn keyboard_handlers(&self) -> &HandlerList<KeyboardHandler> {
        &self.keyboard_handlers
    }

    /// Receive every log record emitted through [`log_layer`](Self::log_layer).
    pub fn register_log_handler(&self, handler: LogHandler) {
        self.log_handlers.register(handler);
    }

    /// A `tracing` layer that forwards events to the registered log handlers.
    pub fn log_layer(&self) -> LogHandlerLayer {
        LogHandlerLayer::new(Arc::clone(&self.log_handlers))
    }

    /// Publish the config to the export table under `"Config"`.
    pub fn publish_config(&self) {
        let exported = self
            .exported_config
            .get_or_init(|| ExportedConfig::from(&self.config));
        self.exports
            .set(CONFIG_EXPORT, exported as *const ExportedConfig as u64);
    }

    /// Map a module and register it.
    pub(crate) fn load_module(&self, path: &Path) -> Result<JobOutcome> {
        if self.modules.contains(path) {
            return Err(Error::AlreadyLoaded(path.to_path_buf()));
        }
        let module = self.loader.load(path)?;
        let entry = self.modules.add(LoadedModule::new(path, module))?;
        tracing::info!(
            module = entry.name(),
            "Module loaded ({})",
            entry.capabilities()
        );
        Ok(JobOutcome::Loaded {
            name: entry.name().to_string(),
            capabilities: entry.capabilities(),
        })
    }

    pub(crate) fn unload_module(&self, path: &Path) -> JobOutcome {
        if self.modules.unload(path) {
            JobOutcome::Unloaded
        } else {
            tracing::warn!("Unload requested for {} which is not loaded", path.display());
            JobOutcome::NotLoaded
        }
    }

    /// Tear down the attachment: unload every module synchronously.
    ///
    /// Returns the number of modules unloaded.
    pub fn detach(&self) -> usize {
        tracing::info!("Shutting down");
        let pending = self.jobs.len();
        if pending > 0 {
            tracing::warn!("Discarding {} queued jobs", pending);
            self.jobs.clear();
        }
        self.modules.unload_all()
    }
}

/// Context handed to module tick hooks.
///
/// Valid only for the duration of the hook call.
pub struct FrameContext<'a> {
    host: &'a HostContext,
    frame: u64,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(host: &'a HostContext, frame: u64) -> Self {
        Self { host, frame }
    }

    /// Index of the current frame, starting at 0.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn host(&self) -> &'a HostContext {
        self.host
    }

    /// Queue a job. Runs during the next frame's drain.
    pub fn enqueue(&self, job: Job) {
        self.host.enqueue(job);
    }

    /// Start suspendable work. The fiber is first resumed next frame.
    pub fn spawn_fiber<F, Fut>(&self, name: impl Into<String>, body: F) -> FiberId
    where
        F: FnOnce(Suspender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.host.spawn_fiber(name, body)
    }
}
