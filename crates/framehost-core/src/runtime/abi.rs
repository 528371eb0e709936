//! C ABI handed to the managed runtime and to native modules.
//!
//! The runtime receives a [`HostApi`] inside a [`RuntimeBoot`] when it
//! starts; a native module's tick hook receives one inside a
//! [`NativeFrame`]. Every entry point takes the opaque `host` pointer from
//! that table as its first argument.

use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;

use crate::context::{FrameContext, HostContext};
use crate::job::{Job, RawArg};
use crate::logging::LogRecord;
use crate::module::KeyEvent;

/// Returned by [`HostApi::enqueue_job`] on success.
pub const STATUS_OK: i32 = 0;
/// Returned when the job kind or parameters are invalid.
pub const STATUS_INVALID_JOB: i32 = -1;
/// Returned when the host pointer is null.
pub const STATUS_NO_HOST: i32 = -2;

/// Keyboard handler registered by the runtime. Boolean flags are 0/1.
pub type RawKeyboardHandler = unsafe extern "C" fn(u32, u16, u8, i32, i32, i32, i32);

/// Log handler registered by the runtime: level, timestamp (ns), target,
/// message. The strings are only valid for the duration of the call.
pub type RawLogHandler = unsafe extern "C" fn(u32, u64, *const c_char, *const c_char);

/// Per-frame entry point returned by the runtime.
pub type RawTick = unsafe extern "C" fn();

/// One resumption of a native fiber. Returns [`FIBER_YIELD`] to run again
/// next frame, anything else to finish.
pub type NativeFiberStep = unsafe extern "C" fn(*mut c_void) -> i32;

/// Native fiber finished.
pub const FIBER_DONE: i32 = 0;
/// Native fiber suspends until the next frame.
pub const FIBER_YIELD: i32 = 1;

/// Function table the runtime uses to talk to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostApi {
    pub host: *const c_void,
    pub enqueue_job: unsafe extern "C" fn(*const c_void, u32, *mut c_void, *mut c_void) -> i32,
    pub get_ptr: unsafe extern "C" fn(*const c_void, *const c_char) -> u64,
    pub set_ptr: unsafe extern "C" fn(*const c_void, *const c_char, u64),
    pub register_keyboard_handler: unsafe extern "C" fn(*const c_void, RawKeyboardHandler),
    pub register_log_handler: unsafe extern "C" fn(*const c_void, RawLogHandler),
    /// Start a fiber that calls `step(state)` once per frame until it
    /// stops returning [`FIBER_YIELD`]. `state` must stay valid until then.
    pub spawn_fiber: unsafe extern "C" fn(*const c_void, NativeFiberStep, *mut c_void) -> i32,
}

impl HostApi {
    /// Build the table for `host`. The table must not outlive the host.
    pub fn new(host: &HostContext) -> Self {
        Self {
            host: host as *const HostContext as *const c_void,
            enqueue_job: api_enqueue_job,
            get_ptr: api_get_ptr,
            set_ptr: api_set_ptr,
            register_keyboard_handler: api_register_keyboard_handler,
            register_log_handler: api_register_log_handler,
            spawn_fiber: api_spawn_fiber,
        }
    }
}

/// Frame table passed to a native module's tick hook. Valid only for the
/// duration of the call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeFrame {
    pub api: HostApi,
    /// Index of the current frame, starting at 0.
    pub frame: u64,
}

impl NativeFrame {
    pub fn new(ctx: &FrameContext<'_>) -> Self {
        Self {
            api: HostApi::new(ctx.host()),
            frame: ctx.frame(),
        }
    }
}

/// Start-up exchange with the runtime's start symbol.
///
/// The host fills `api`; the runtime fills `tick` before returning 0.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RuntimeBoot {
    pub api: HostApi,
    pub tick: Option<RawTick>,
}

impl RuntimeBoot {
    pub fn new(api: HostApi) -> Self {
        Self { api, tick: None }
    }
}

unsafe fn host_ref<'a>(host: *const c_void) -> Option<&'a HostContext> {
    unsafe { (host as *const HostContext).as_ref() }
}

unsafe fn name_str<'a>(name: *const c_char) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(name) }.to_str().ok()
}

unsafe extern "C" fn api_enqueue_job(
    host: *const c_void,
    kind: u32,
    parameter: *mut c_void,
    parameter_ex: *mut c_void,
) -> i32 {
    let Some(host) = (unsafe { host_ref(host) }) else {
        return STATUS_NO_HOST;
    };
    match unsafe { Job::from_raw(kind, parameter, parameter_ex) } {
        Ok(job) => {
            host.enqueue(job);
            STATUS_OK
        }
        Err(e) => {
            tracing::error!("Rejected job from runtime: {}", e);
            STATUS_INVALID_JOB
        }
    }
}

unsafe extern "C" fn api_get_ptr(host: *const c_void, name: *const c_char) -> u64 {
    let (Some(host), Some(name)) = (unsafe { host_ref(host) }, unsafe { name_str(name) }) else {
        return 0;
    };
    host.exports().get(name).unwrap_or(0)
}

unsafe extern "C" fn api_set_ptr(host: *const c_void, name: *const c_char, address: u64) {
    let (Some(host), Some(name)) = (unsafe { host_ref(host) }, unsafe { name_str(name) }) else {
        return;
    };
    host.exports().set(name, address);
}

unsafe extern "C" fn api_register_keyboard_handler(
    host: *const c_void,
    handler: RawKeyboardHandler,
) {
    let Some(host) = (unsafe { host_ref(host) }) else {
        return;
    };
    host.register_keyboard_handler(Arc::new(move |event: &KeyEvent| unsafe {
        handler(
            event.key,
            event.repeats,
            event.scan_code,
            event.is_extended as i32,
            event.with_alt as i32,
            event.was_down_before as i32,
            event.is_up_now as i32,
        )
    }));
}

unsafe extern "C" fn api_register_log_handler(host: *const c_void, handler: RawLogHandler) {
    let Some(host) = (unsafe { host_ref(host) }) else {
        return;
    };
    host.register_log_handler(Arc::new(move |record: &LogRecord| {
        let target = c_string(&record.target);
        let message = c_string(&record.message);
        unsafe {
            handler(
                record.level.as_raw(),
                record.timestamp,
                target.as_ptr(),
                message.as_ptr(),
            )
        }
    }));
}

unsafe extern "C" fn api_spawn_fiber(
    host: *const c_void,
    step: NativeFiberStep,
    state: *mut c_void,
) -> i32 {
    let Some(host) = (unsafe { host_ref(host) }) else {
        return STATUS_NO_HOST;
    };
    let state = RawArg(state);
    host.spawn_fiber("native", move |s| async move {
        // Safety: the caller keeps `state` valid until `step` finishes.
        while unsafe { step(state.get()) } == FIBER_YIELD {
            s.next_frame().await;
        }
    });
    STATUS_OK
}

fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}
