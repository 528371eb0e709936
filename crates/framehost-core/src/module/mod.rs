//! Extension modules and the registry that owns them.
//!
//! A module exposes any subset of three hooks:
//!
//! - **tick** - called once per frame from the scheduler thread
//! - **present** - called on the host's render thread when a frame is presented
//! - **keyboard** - called on the host's input thread for every key event
//!
//! Which hooks a module has is read once, when it is loaded, and stored as
//! its [`Capabilities`]. Dispatch sites only visit modules whose
//! capabilities include the hook being dispatched.
//!
//! # Module Structure
//!
//! - `registry` - ordered, lock-guarded set of loaded modules
//! - `loader` - path to module resolution
//! - `dylib` - shared library modules resolved by exported symbol

mod dylib;
mod loader;
mod registry;

use std::ffi::c_void;
use std::fmt;

use crate::context::FrameContext;

pub use dylib::{
    DylibLoader, DylibModule, KEYBOARD_SYMBOL, KeyboardFn, PRESENT_SYMBOL, PresentFn, TICK_SYMBOL,
    TickFn,
};
pub use loader::ModuleLoader;
pub use registry::{LoadedModule, ModuleRegistry};

/// Result returned by module hooks.
pub type HookResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A single hook a module may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Tick,
    Present,
    Keyboard,
}

impl Capability {
    const ALL: [Capability; 3] = [Capability::Tick, Capability::Present, Capability::Keyboard];

    fn bit(self) -> u8 {
        match self {
            Capability::Tick => 1,
            Capability::Present => 1 << 1,
            Capability::Keyboard => 1 << 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Tick => "tick",
            Capability::Present => "present",
            Capability::Keyboard => "keyboard",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of hooks a module provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    bits: u8,
}

impl Capabilities {
    /// A module with no hooks.
    pub const NONE: Capabilities = Capabilities { bits: 0 };

    /// Add a capability.
    pub fn with(mut self, capability: Capability) -> Self {
        self.bits |= capability.bit();
        self
    }

    /// Add a capability when `present` is true.
    pub fn with_if(self, capability: Capability, present: bool) -> Self {
        if present { self.with(capability) } else { self }
    }

    pub fn has(self, capability: Capability) -> bool {
        self.bits & capability.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Iterate the contained capabilities in a fixed order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.has(*c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Capabilities::NONE, Capabilities::with)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Capability::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

/// Opaque handle to the host's presentation surface (e.g. a swap chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(usize);

impl SurfaceHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

/// Keyboard event raised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Virtual key code.
    pub key: u32,
    pub repeats: u16,
    pub scan_code: u8,
    pub is_extended: bool,
    pub with_alt: bool,
    pub was_down_before: bool,
    pub is_up_now: bool,
}

impl KeyEvent {
    /// A fresh key press with no modifiers.
    pub fn pressed(key: u32) -> Self {
        Self {
            key,
            repeats: 1,
            scan_code: 0,
            is_extended: false,
            with_alt: false,
            was_down_before: false,
            is_up_now: false,
        }
    }

    /// The matching key release.
    pub fn released(key: u32) -> Self {
        Self {
            was_down_before: true,
            is_up_now: true,
            ..Self::pressed(key)
        }
    }
}

/// An extension module.
///
/// Hooks not named in [`capabilities`](Module::capabilities) are never
/// called. Errors and panics from hooks are caught and logged by the
/// caller; they never stop dispatch to other modules.
pub trait Module: Send + Sync {
    /// Hooks this module provides. Read once at load time.
    fn capabilities(&self) -> Capabilities;

    /// Per-frame update on the scheduler thread.
    fn tick(&self, _ctx: &FrameContext<'_>) -> HookResult {
        Ok(())
    }

    /// Frame presented on the host's render thread.
    fn present(&self, _surface: SurfaceHandle) -> HookResult {
        Ok(())
    }

    /// Key event on the host's input thread.
    fn keyboard(&self, _event: &KeyEvent) -> HookResult {
        Ok(())
    }
}
