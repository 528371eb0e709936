//! Core of framehost, an in-process frame scheduler and module bridge.
//!
//! This crate provides:
//! - Job queue for module lifecycle requests from any thread
//! - Module registry whose entries outlive an unload until in-flight hooks return
//! - Per-frame scheduler loop driven by the host's frame callback
//! - Event dispatch for frame-present and keyboard events
//! - Cooperative fibers resumed once per frame
//! - Managed runtime bridge over a C ABI

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod exports;
pub mod fiber;
pub mod handlers;
pub mod job;
pub mod logging;
pub mod module;
pub mod runtime;
pub mod scheduler;
mod sync;

pub use bootstrap::{Bootstrap, Materialized};
pub use config::{BootstrapConfig, HostConfig, LogConfig, ModulesConfig, RuntimeConfig};
pub use context::{FrameContext, HostContext, HostContextBuilder};
pub use dispatch::{DispatchReport, KeyboardHandler};
pub use error::{Error, Result};
pub use exports::{CONFIG_EXPORT, ExportTable, ExportedConfig};
pub use fiber::{FiberId, FiberPool, FiberTick, Suspender, yield_frame};
pub use job::{Callback, DrainReport, Job, JobKind, JobOutcome, JobQueue, NativeCallback};
pub use logging::{LogHandler, LogHandlerLayer, LogLevel, LogRecord};
pub use module::{
    Capabilities, Capability, DylibLoader, DylibModule, HookResult, KeyEvent, LoadedModule,
    Module, ModuleLoader, ModuleRegistry, SurfaceHandle,
};
pub use runtime::{
    DylibRuntime, HostApi, IdleRuntime, ManagedRuntime, ManagedTick, NativeFrame, RuntimeBoot,
};
pub use scheduler::{FrameDriver, FrameReport, Scheduler};
