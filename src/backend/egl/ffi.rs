#![allow(missing_docs)]

use super::Error;
use std::os::raw::{c_long, c_void};

pub type khronos_utime_nanoseconds_t = khronos_uint64_t;
pub type khronos_uint64_t = u64;
pub type khronos_ssize_t = c_long;
pub type EGLint = i32;
pub type EGLNativeDisplayType = NativeDisplayType;
pub type EGLNativePixmapType = NativePixmapType;
pub type EGLNativeWindowType = NativeWindowType;
pub type NativeDisplayType = *const c_void;
pub type NativePixmapType = *const c_void;
pub type NativeWindowType = *const c_void;

#[cfg(target_os = "android")]
const EGL_LIBRARY: &str = "libEGL.so";
#[cfg(not(target_os = "android"))]
const EGL_LIBRARY: &str = "libEGL.so.1";

#[cfg(target_os = "android")]
const GLES_LIBRARY: &str = "libGLESv2.so";
#[cfg(not(target_os = "android"))]
const GLES_LIBRARY: &str = "libGLESv2.so.2";

/// Loads libEGL symbols, if not loaded already.
///
/// This normally happens automatically during [`SystemEGL`](super::SystemEGL) creation.
pub fn make_sure_egl_is_loaded() -> Result<(), Error> {
    use std::ffi::CString;
    use std::ptr;

    let lib = match &*egl::LIB {
        Ok(lib) => lib,
        Err(err) => return Err(Error::LibraryLoad(err.to_string().into())),
    };

    egl::LOAD.call_once(|| unsafe {
        egl::load_with(|sym| {
            let name = match CString::new(sym) {
                Ok(name) => name,
                Err(_) => return ptr::null(),
            };
            match lib.get::<*mut c_void>(name.as_bytes_with_nul()) {
                Ok(x) => *x as *const _,
                Err(_) => ptr::null(),
            }
        });
    });

    Ok(())
}

/// Resolves a GL ES entry point, first from `libGLESv2` and then through `eglGetProcAddress`.
pub fn gl_proc_address(symbol: &str) -> *const c_void {
    use std::ffi::CString;

    let name = match CString::new(symbol) {
        Ok(name) => name,
        Err(_) => return std::ptr::null(),
    };

    if let Ok(lib) = &*egl::GLES_LIB {
        if let Ok(x) = unsafe { lib.get::<*mut c_void>(name.as_bytes_with_nul()) } {
            if !x.is_null() {
                return *x as *const _;
            }
        }
    }

    if egl::LOAD.is_completed() {
        unsafe { egl::GetProcAddress(name.as_ptr()) as *const _ }
    } else {
        std::ptr::null()
    }
}

/// Module containing raw egl function bindings
#[allow(clippy::all, missing_debug_implementations)]
pub mod egl {
    use super::*;
    use libloading::Library;
    use std::sync::Once;

    lazy_static::lazy_static! {
        pub static ref LIB: Result<Library, libloading::Error> = unsafe { Library::new(EGL_LIBRARY) };
        pub static ref GLES_LIB: Result<Library, libloading::Error> = unsafe { Library::new(GLES_LIBRARY) };
    }

    pub static LOAD: Once = Once::new();

    include!(concat!(env!("OUT_DIR"), "/egl_bindings.rs"));
}
