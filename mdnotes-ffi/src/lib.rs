//! Bindings to the external notes runtime's C ABI.
//!
//! The runtime library exports five functions:
//!
//! ```c
//! md_notes_runtime* md_notes_runtime_new(void);
//! void md_notes_runtime_free(md_notes_runtime*);
//! uint16_t md_notes_runtime_server_port(md_notes_runtime*);
//! uint8_t md_notes_runtime_open_notes(md_notes_runtime*, const char *);
//! void md_notes_runtime_close_notes(md_notes_runtime*, uint8_t);
//! ```
//!
//! [`create`] wraps them in a [`RuntimeClient`]. Only one runtime exists per
//! process: while any client is alive, `create` returns another handle to it.

use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;

use mdnotes_core::runtime::{
    path_to_c_string, NotesRuntime, RuntimeClient, RuntimeError, RuntimeSlot, SessionId,
};

#[repr(C)]
struct RawRuntime {
    _private: [u8; 0],
}

extern "C" {
    fn md_notes_runtime_new() -> *mut RawRuntime;
    fn md_notes_runtime_free(runtime: *mut RawRuntime);
    fn md_notes_runtime_server_port(runtime: *mut RawRuntime) -> u16;
    fn md_notes_runtime_open_notes(runtime: *mut RawRuntime, path: *const c_char) -> u8;
    fn md_notes_runtime_close_notes(runtime: *mut RawRuntime, notes_id: u8);
}

static RUNTIME: RuntimeSlot = RuntimeSlot::new();

/// Create the process-wide runtime, or return the one already running.
pub fn create() -> Result<RuntimeClient, RuntimeError> {
    RUNTIME.get_or_create(FfiRuntime::new)
}

/// Owned pointer to a runtime created by `md_notes_runtime_new`.
struct FfiRuntime {
    raw: NonNull<RawRuntime>,
}

// SAFETY: the runtime is moved onto the RuntimeClient thread once and only
// ever called and freed from there.
unsafe impl Send for FfiRuntime {}

impl FfiRuntime {
    fn new() -> Result<Self, RuntimeError> {
        // SAFETY: no preconditions; a null return means creation failed.
        let raw = unsafe { md_notes_runtime_new() };
        let raw = NonNull::new(raw).ok_or_else(|| {
            RuntimeError::CreateFailed("md_notes_runtime_new returned null".to_string())
        })?;
        log::info!("Created notes runtime");
        Ok(Self { raw })
    }
}

impl NotesRuntime for FfiRuntime {
    fn open_notes(&mut self, path: &Path) -> Result<SessionId, RuntimeError> {
        let c_path = path_to_c_string(path)?;
        // SAFETY: `raw` is live until drop and `c_path` outlives the call.
        let id = unsafe { md_notes_runtime_open_notes(self.raw.as_ptr(), c_path.as_ptr()) };
        Ok(SessionId(id))
    }

    fn close_notes(&mut self, id: SessionId) {
        // SAFETY: `raw` is live until drop; the runtime ignores unknown ids.
        unsafe { md_notes_runtime_close_notes(self.raw.as_ptr(), id.0) }
    }

    fn server_port(&self) -> u16 {
        // SAFETY: `raw` is live until drop.
        unsafe { md_notes_runtime_server_port(self.raw.as_ptr()) }
    }
}

impl Drop for FfiRuntime {
    fn drop(&mut self) {
        // SAFETY: `raw` came from md_notes_runtime_new and is freed only here.
        unsafe { md_notes_runtime_free(self.raw.as_ptr()) }
        log::info!("Freed notes runtime");
    }
}
