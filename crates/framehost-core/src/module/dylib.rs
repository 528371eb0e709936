//! Shared library modules.
//!
//! A module library exports any of the following C-ABI symbols:
//!
//! ```text
//! void framehost_tick(const framehost_frame* frame);
//! void framehost_present(void* surface);
//! void framehost_keyboard(uint32_t key, uint16_t repeats, uint8_t scan_code,
//!                         int32_t is_extended, int32_t with_alt,
//!                         int32_t was_down_before, int32_t is_up_now);
//! ```
//!
//! `framehost_frame` is [`NativeFrame`]: the [`HostApi`] function table
//! followed by the frame index as a `uint64_t`. It is valid only during the
//! tick call. Through it a module can queue jobs, read and write exports,
//! and start fibers.
//!
//! Missing symbols are not an error; a library exporting none of them
//! loads with no capabilities.
//!
//! [`HostApi`]: crate::runtime::HostApi

use std::ffi::c_void;
use std::path::Path;

use libloading::Library;

use crate::context::FrameContext;
use crate::error::{Error, Result};
use crate::runtime::NativeFrame;

use super::{Capabilities, Capability, HookResult, KeyEvent, Module, ModuleLoader, SurfaceHandle};

/// Per-frame hook symbol.
pub const TICK_SYMBOL: &str = "framehost_tick";
/// Present hook symbol.
pub const PRESENT_SYMBOL: &str = "framehost_present";
/// Keyboard hook symbol.
pub const KEYBOARD_SYMBOL: &str = "framehost_keyboard";

/// Per-frame hook. Receives the current [`NativeFrame`].
pub type TickFn = unsafe extern "C" fn(*const NativeFrame);

/// Present hook. Receives the host's surface handle.
pub type PresentFn = unsafe extern "C" fn(*mut c_void);

/// Keyboard hook. Boolean flags are passed as 0/1.
pub type KeyboardFn = unsafe extern "C" fn(u32, u16, u8, i32, i32, i32, i32);

/// Module backed by a mapped shared library.
pub struct DylibModule {
    tick: Option<TickFn>,
    present: Option<PresentFn>,
    keyboard: Option<KeyboardFn>,
    // Declared last: the hook pointers above are only valid while mapped.
    _library: Library,
}

impl DylibModule {
    /// Map the library at `path` and resolve its hook symbols.
    pub fn open(path: &Path) -> Result<Self> {
        // Safety: loading runs the library's initializers. Modules are
        // trusted code supplied by the user.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::ModuleLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        // Safety: a module exporting a hook symbol promises the signature
        // documented above.
        let tick = unsafe { resolve::<TickFn>(&library, TICK_SYMBOL) };
        let present = unsafe { resolve::<PresentFn>(&library, PRESENT_SYMBOL) };
        let keyboard = unsafe { resolve::<KeyboardFn>(&library, KEYBOARD_SYMBOL) };

        tracing::debug!(
            "Resolved hooks for {}: tick={} present={} keyboard={}",
            path.display(),
            tick.is_some(),
            present.is_some(),
            keyboard.is_some()
        );

        Ok(Self {
            tick,
            present,
            keyboard,
            _library: library,
        })
    }
}

/// Look up an optional function symbol, copying the pointer out.
unsafe fn resolve<T: Copy>(library: &Library, name: &str) -> Option<T> {
    unsafe { library.get::<T>(name.as_bytes()) }
        .ok()
        .map(|symbol| *symbol)
}

impl Module for DylibModule {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
            .with_if(Capability::Tick, self.tick.is_some())
            .with_if(Capability::Present, self.present.is_some())
            .with_if(Capability::Keyboard, self.keyboard.is_some())
    }

    fn tick(&self, ctx: &FrameContext<'_>) -> HookResult {
        if let Some(tick) = self.tick {
            tick_native(tick, ctx);
        }
        Ok(())
    }

    fn present(&self, surface: SurfaceHandle) -> HookResult {
        if let Some(present) = self.present {
            unsafe { present(surface.as_ptr()) };
        }
        Ok(())
    }

    fn keyboard(&self, event: &KeyEvent) -> HookResult {
        if let Some(keyboard) = self.keyboard {
            unsafe {
                keyboard(
                    event.key,
                    event.repeats,
                    event.scan_code,
                    event.is_extended as i32,
                    event.with_alt as i32,
                    event.was_down_before as i32,
                    event.is_up_now as i32,
                )
            };
        }
        Ok(())
    }
}

/// Call a native tick hook with a frame table for `ctx`.
pub(crate) fn tick_native(tick: TickFn, ctx: &FrameContext<'_>) {
    let frame = NativeFrame::new(ctx);
    // Safety: `frame` outlives the call and the hook has the documented
    // signature.
    unsafe { tick(&frame) };
}

/// Loader that maps modules as shared libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Module>> {
        let module = DylibModule::open(path)?;
        tracing::info!(
            "Loaded module {} ({})",
            path.display(),
            module.capabilities()
        );
        Ok(Box::new(module))
    }
}
