//! Common traits and types for EGL rendering
//!
//! The types of this module own the EGL state of one render thread:
//!
//! - [`EGLApi`] is the seam to the EGL driver. [`SystemEGL`] implements it on top of the system
//!   `libEGL`, tests use the scripted `DummyEGL` from the `test` module.
//! - [`EGLConfigChooser`] selects the framebuffer configuration used for every context.
//! - [`EGLHolder`] owns the display/context/surface triple and tolerates repeated or partial
//!   teardown.
//!
//! None of these types are meant to be shared between threads. The render thread owns them and
//! every other thread talks to it through [`renderer`](crate::renderer).

use std::fmt;
use std::os::raw::c_void;

mod error;
pub use self::error::*;

pub mod config;
pub use self::config::{ChosenConfig, ConfigRequirements, EGLConfigChooser};

mod holder;
pub use self::holder::{EGLHolder, EGLState, SurfaceCreationError};

#[cfg(feature = "backend_egl")]
#[allow(non_camel_case_types, dead_code, unused_mut, non_upper_case_globals)]
pub mod ffi;

#[cfg(feature = "backend_egl")]
mod system;
#[cfg(feature = "backend_egl")]
pub use self::system::SystemEGL;


use crate::backend::SwapBuffersError;

/// EGL integer type
pub type EGLint = i32;

macro_rules! egl_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Wraps a raw handle value
            pub const fn from_raw(raw: usize) -> Self {
                $name(raw)
            }

            /// Wraps a raw pointer
            pub fn from_ptr(ptr: *const c_void) -> Self {
                $name(ptr as usize)
            }

            /// The raw handle value
            pub fn raw(self) -> usize {
                self.0
            }

            /// The raw handle as a pointer, as expected by the EGL entry points
            pub fn as_ptr(self) -> *const c_void {
                self.0 as *const c_void
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }
    };
}

egl_handle!(
    /// Initialized or uninitialized `EGLDisplay`
    EGLDisplayRaw
);
egl_handle!(
    /// Immutable `EGLConfig` descriptor
    EGLConfigRaw
);
egl_handle!(
    /// `EGLContext` created by this crate
    EGLContextRaw
);
egl_handle!(
    /// `EGLSurface` created by this crate
    EGLSurfaceRaw
);
egl_handle!(
    /// Platform window (`ANativeWindow*`) an EGL window surface can be created for
    NativeWindow
);

/// EGL attribute names and values consumed by this crate.
///
/// These are the values of the EGL 1.5 registry and do not depend on the `backend_egl` feature.
pub mod attrib {
    #![allow(missing_docs)]
    use super::EGLint;

    pub const NONE: EGLint = 0x3038;
    pub const BUFFER_SIZE: EGLint = 0x3020;
    pub const ALPHA_SIZE: EGLint = 0x3021;
    pub const BLUE_SIZE: EGLint = 0x3022;
    pub const GREEN_SIZE: EGLint = 0x3023;
    pub const RED_SIZE: EGLint = 0x3024;
    pub const DEPTH_SIZE: EGLint = 0x3025;
    pub const STENCIL_SIZE: EGLint = 0x3026;
    pub const CONFIG_CAVEAT: EGLint = 0x3027;
    pub const SAMPLES: EGLint = 0x3031;
    pub const SAMPLE_BUFFERS: EGLint = 0x3032;
    pub const SURFACE_TYPE: EGLint = 0x3033;
    pub const ALPHA_MASK_SIZE: EGLint = 0x303E;
    pub const COLOR_BUFFER_TYPE: EGLint = 0x303F;
    pub const RENDERABLE_TYPE: EGLint = 0x3040;
    pub const CONFORMANT: EGLint = 0x3042;
    pub const CONTEXT_CLIENT_VERSION: EGLint = 0x3098;

    pub const WINDOW_BIT: EGLint = 0x0004;
    pub const OPENGL_ES2_BIT: EGLint = 0x0004;
    pub const RGB_BUFFER: EGLint = 0x308E;
    pub const SLOW_CONFIG: EGLint = 0x3050;
    pub const NON_CONFORMANT_CONFIG: EGLint = 0x3051;
}

/// The part of OpenGL ES the render loop needs itself.
///
/// Everything else is drawn by the native engine with its own function table.
pub trait Gl {
    /// `glViewport`
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
}

/// Driver interface to EGL.
///
/// Every method maps to one EGL entry point. Failures are reported as the decoded value of
/// `eglGetError` right after the call.
pub trait EGLApi: Send {
    /// `eglGetDisplay(EGL_DEFAULT_DISPLAY)`, `None` for `EGL_NO_DISPLAY`
    fn get_display(&self) -> Option<EGLDisplayRaw>;
    /// `eglInitialize`, returning the EGL version
    fn initialize(&self, display: EGLDisplayRaw) -> Result<(EGLint, EGLint), EGLError>;
    /// `eglBindAPI(EGL_OPENGL_ES_API)`
    fn bind_api(&self) -> Result<(), EGLError>;
    /// `eglChooseConfig` without an output buffer, returning the number of matches
    fn choose_config_count(&self, display: EGLDisplayRaw, attribs: &[EGLint]) -> Result<EGLint, EGLError>;
    /// `eglChooseConfig` returning at most `max` configs in driver order
    fn choose_configs(
        &self,
        display: EGLDisplayRaw,
        attribs: &[EGLint],
        max: EGLint,
    ) -> Result<Vec<EGLConfigRaw>, EGLError>;
    /// `eglGetConfigAttrib`
    fn get_config_attrib(
        &self,
        display: EGLDisplayRaw,
        config: EGLConfigRaw,
        attribute: EGLint,
    ) -> Result<EGLint, EGLError>;
    /// `eglCreateContext` without a share context
    fn create_context(
        &self,
        display: EGLDisplayRaw,
        config: EGLConfigRaw,
        attribs: &[EGLint],
    ) -> Result<EGLContextRaw, EGLError>;
    /// `eglCreateWindowSurface`
    fn create_window_surface(
        &self,
        display: EGLDisplayRaw,
        config: EGLConfigRaw,
        window: NativeWindow,
        attribs: &[EGLint],
    ) -> Result<EGLSurfaceRaw, EGLError>;
    /// `eglMakeCurrent`, using the surface for both draw and read
    fn make_current(
        &self,
        display: EGLDisplayRaw,
        surface: Option<EGLSurfaceRaw>,
        context: Option<EGLContextRaw>,
    ) -> Result<(), EGLError>;
    /// `eglSwapBuffers`
    fn swap_buffers(&self, display: EGLDisplayRaw, surface: EGLSurfaceRaw) -> Result<(), EGLError>;
    /// `eglDestroySurface`
    fn destroy_surface(&self, display: EGLDisplayRaw, surface: EGLSurfaceRaw) -> Result<(), EGLError>;
    /// `eglDestroyContext`
    fn destroy_context(&self, display: EGLDisplayRaw, context: EGLContextRaw) -> Result<(), EGLError>;
    /// `eglTerminate`
    fn terminate(&self, display: EGLDisplayRaw) -> Result<(), EGLError>;
    /// GL functions usable while a context of this driver is current
    fn gl(&self) -> &dyn Gl;
}

/// Error that can happen when making a context (and surface) current on the active thread.
#[derive(thiserror::Error, Debug)]
#[error("`eglMakeCurrent` failed: {0}")]
pub struct MakeCurrentError(#[from] pub EGLError);

impl From<EGLError> for SwapBuffersError {
    fn from(err: EGLError) -> SwapBuffersError {
        match err {
            // a power management event took the context with it
            x @ EGLError::ContextLost => SwapBuffersError::ContextLost(Box::new(x)),
            // everything else is answered with a surface recreation
            x => SwapBuffersError::TemporaryFailure(Box::new(x)),
        }
    }
}

impl From<MakeCurrentError> for SwapBuffersError {
    fn from(err: MakeCurrentError) -> SwapBuffersError {
        match err {
            x @ MakeCurrentError(EGLError::ContextLost) => SwapBuffersError::ContextLost(Box::new(x)),
            // EGL_BAD_MATCH, EGL_BAD_ACCESS and friends: the window went away or is bound
            // elsewhere, a new surface fixes it
            x => SwapBuffersError::TemporaryFailure(Box::new(x)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_errors_are_classified() {
        assert!(SwapBuffersError::from(EGLError::ContextLost).is_context_lost());
        assert!(!SwapBuffersError::from(EGLError::BadSurface).is_context_lost());
        assert!(!SwapBuffersError::from(EGLError::BadNativeWindow).is_context_lost());
        assert!(!SwapBuffersError::from(MakeCurrentError(EGLError::BadAccess)).is_context_lost());
        assert!(SwapBuffersError::from(MakeCurrentError(EGLError::ContextLost)).is_context_lost());
    }

    #[test]
    fn handles_debug_print_their_address() {
        let surface = EGLSurfaceRaw::from_raw(0x2a);
        assert_eq!(format!("{:?}", surface), "EGLSurfaceRaw(0x2a)");
        assert_eq!(EGLSurfaceRaw::from_ptr(surface.as_ptr()), surface);
    }
}
