//! Delivery of host events to modules and handlers.
//!
//! Each event is delivered synchronously on the thread the host raises it
//! on. The registry lock is held only while copying the module set; hooks
//! run without it. Every callee is isolated: an error or panic is logged
//! with the callee's identity and dispatch carries on.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::context::HostContext;
use crate::error::Error;
use crate::module::{Capability, HookResult, KeyEvent, LoadedModule, Module, SurfaceHandle};

/// Callback registered for keyboard events.
pub type KeyboardHandler = Arc<dyn Fn(&KeyEvent) + Send + Sync>;

/// Where a hook is being called from, for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookSite {
    Tick,
    Present,
    Keyboard,
}

impl fmt::Display for HookSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookSite::Tick => "Tick",
            HookSite::Present => "Present",
            HookSite::Keyboard => "KeyboardHandler",
        })
    }
}

/// Result of a single guarded hook call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookCall {
    Completed,
    Failed,
    /// The module was released before the call could start.
    Released,
}

/// Call one module hook, catching errors and panics.
pub(crate) fn call_hook(
    module: &LoadedModule,
    site: HookSite,
    hook: impl FnOnce(&dyn Module) -> HookResult,
) -> HookCall {
    let result = catch_unwind(AssertUnwindSafe(|| module.with_module(hook)));

    let error = match result {
        Ok(None) => return HookCall::Released,
        Ok(Some(Ok(()))) => return HookCall::Completed,
        Ok(Some(Err(e))) => Error::Hook(e.to_string()),
        Err(payload) => Error::from_panic(payload),
    };

    tracing::error!(module = module.name(), "{}[{}]: {}", site, module.name(), error);
    HookCall::Failed
}

/// Counts from one event dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callees that completed.
    pub delivered: usize,
    /// Callees that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, call: HookCall) {
        match call {
            HookCall::Completed => self.delivered += 1,
            HookCall::Failed => self.failed += 1,
            HookCall::Released => {}
        }
    }
}

impl HostContext {
    /// Deliver a frame-present event to every module with a present hook.
    pub fn on_frame_present(&self, surface: SurfaceHandle) -> DispatchReport {
        let mut report = DispatchReport::default();
        for module in self.modules().snapshot_with(Capability::Present) {
            report.record(call_hook(&module, HookSite::Present, |m| {
                m.present(surface)
            }));
        }
        report
    }

    /// Deliver a keyboard event to every module with a keyboard hook, then
    /// to every registered keyboard handler.
    pub fn on_keyboard(&self, event: &KeyEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for module in self.modules().snapshot_with(Capability::Keyboard) {
            report.record(call_hook(&module, HookSite::Keyboard, |m| {
                m.keyboard(event)
            }));
        }

        for handler in self.keyboard_handlers().snapshot() {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    tracing::error!("KeyboardHandler error: {}", Error::from_panic(payload));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Capabilities, Module};
    use std::path::Path;
    use std::sync::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<usize>>>,
        fail: bool,
    }

    impl Module for Recorder {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
                .with(Capability::Present)
                .with(Capability::Keyboard)
        }

        fn present(&self, surface: SurfaceHandle) -> HookResult {
            if self.fail {
                return Err("device lost".into());
            }
            self.seen.lock().unwrap().push(surface.raw());
            Ok(())
        }

        fn keyboard(&self, _event: &KeyEvent) -> HookResult {
            if self.fail {
                panic!("keyboard hook exploded");
            }
            Ok(())
        }
    }

    fn host_with(modules: Vec<(&str, bool)>) -> (Arc<HostContext>, Arc<Mutex<Vec<usize>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let host = HostContext::builder().build();
        for (path, fail) in modules {
            let module = Recorder {
                seen: Arc::clone(&seen),
                fail,
            };
            host.modules()
                .add(LoadedModule::new(path, Box::new(module)))
                .unwrap();
        }
        (host, seen)
    }

    #[test]
    fn test_present_isolates_failing_module() {
        let (host, seen) = host_with(vec![("bad.mod", true), ("good.mod", false)]);
        let report = host.on_frame_present(SurfaceHandle::from_raw(7));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_keyboard_reaches_handlers_after_module_panic() {
        let (host, _) = host_with(vec![("bad.mod", true)]);
        let keys = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&keys);
        host.register_keyboard_handler(Arc::new(move |event: &KeyEvent| {
            sink.lock().unwrap().push(event.key);
        }));
        host.register_keyboard_handler(Arc::new(|_: &KeyEvent| panic!("handler exploded")));

        let report = host.on_keyboard(&KeyEvent::pressed(0x20));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(*keys.lock().unwrap(), vec![0x20]);
    }

    #[test]
    fn test_released_module_is_skipped() {
        let (host, seen) = host_with(vec![("A.mod", false)]);
        let stale = host.modules().snapshot();
        host.modules().unload(Path::new("A.mod"));

        let call = call_hook(&stale[0], HookSite::Present, |m| {
            m.present(SurfaceHandle::from_raw(1))
        });
        assert_eq!(call, HookCall::Released);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hook_site_names() {
        assert_eq!(HookSite::Present.to_string(), "Present");
        assert_eq!(HookSite::Keyboard.to_string(), "KeyboardHandler");
    }
}
