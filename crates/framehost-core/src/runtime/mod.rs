//! Managed runtime bridge.
//!
//! The managed runtime is started once during scheduler setup and hands
//! back a single tick entry point that the scheduler calls every frame.

mod abi;
mod dylib;

use crate::error::Result;

pub use abi::{
    FIBER_DONE, FIBER_YIELD, HostApi, NativeFiberStep, NativeFrame, RawKeyboardHandler,
    RawLogHandler, RawTick, RuntimeBoot, STATUS_INVALID_JOB, STATUS_NO_HOST, STATUS_OK,
};
pub use dylib::{DylibRuntime, START_SYMBOL, StartFn};

/// Per-frame entry point of a started runtime.
pub type ManagedTick = Box<dyn FnMut() + Send>;

/// A runtime the scheduler starts during setup.
pub trait ManagedRuntime: Send {
    /// Short name for log messages.
    fn name(&self) -> &str {
        "runtime"
    }

    /// Start the runtime and return its tick. Any error is fatal.
    fn start(&mut self, api: &HostApi) -> Result<ManagedTick>;
}

impl<F> ManagedRuntime for F
where
    F: FnMut(&HostApi) -> Result<ManagedTick> + Send,
{
    fn start(&mut self, api: &HostApi) -> Result<ManagedTick> {
        self(api)
    }
}

/// Runtime whose tick does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleRuntime;

impl ManagedRuntime for IdleRuntime {
    fn name(&self) -> &str {
        "idle"
    }

    fn start(&mut self, _api: &HostApi) -> Result<ManagedTick> {
        Ok(Box::new(|| {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostContext;
    use crate::error::Error;

    #[test]
    fn test_idle_runtime_ticks() {
        let host = HostContext::builder().build();
        let mut tick = IdleRuntime.start(&HostApi::new(&host)).unwrap();
        tick();
        tick();
    }

    #[test]
    fn test_closure_runtime() {
        let host = HostContext::builder().build();
        let mut runtime = |_: &HostApi| -> Result<ManagedTick> {
            Err(Error::Startup("no entry point".into()))
        };
        let err = runtime.start(&HostApi::new(&host)).err().unwrap();
        assert!(err.is_fatal());
        assert_eq!(runtime.name(), "runtime");
    }
}
