use super::EGLint;

#[derive(thiserror::Error, Debug)]
/// EGL errors
pub enum Error {
    /// The EGL library could not be loaded
    #[error("Failed to load the EGL library: {0}")]
    LibraryLoad(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Unable to obtain a valid EGL Display
    #[error("Unable to obtain a valid EGL Display.")]
    DisplayNotSupported,
    /// `eglInitialize` returned an error
    #[error("Failed to initialize EGL. Err: {0:}")]
    InitFailed(#[source] EGLError),
    /// The EGL implementation does not support creating OpenGL ES contexts
    #[error("The EGL implementation does not support creating OpenGL ES contexts. Err: {0:?}")]
    OpenGlesNotSupported(#[source] Option<EGLError>),
    /// `eglChooseConfig` returned no configs for the requested attributes
    #[error("eglChooseConfig() returned no configs")]
    NoAvailableConfig,
    /// Configs were available, but none of them survived filtering
    #[error("No matching configurations after filtering")]
    NoMatchingConfig,
    /// `eglChooseConfig` itself failed
    #[error("eglChooseConfig() failed. Err: {0:}")]
    ConfigFailed(#[source] EGLError),
    /// Reading an attribute of a config failed
    #[error("eglGetConfigAttrib({attribute:#x}) failed. Err: {source:}")]
    ConfigAttribute {
        /// The queried attribute
        attribute: EGLint,
        /// Underlying error
        #[source]
        source: EGLError,
    },
    /// Context creation failed as one or more requirements could not be met.
    #[error("Context creation failed as one or more requirements could not be met. Err: {0:}")]
    CreationFailed(#[source] EGLError),
}

impl Error {
    /// Returns true for the fatal config selection failures.
    ///
    /// Nothing can be rendered after one of these, there is no retry.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::NoAvailableConfig
                | Error::NoMatchingConfig
                | Error::ConfigFailed(_)
                | Error::ConfigAttribute { .. }
        )
    }
}

/// Raw EGL error
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EGLError {
    /// EGL is not initialized, or could not be initialized, for the specified EGL display connection.
    #[error(
        "EGL is not initialized, or could not be initialized, for the specified EGL display connection."
    )]
    NotInitialized,
    /// EGL cannot access a requested resource (for example a context is bound in another thread).
    #[error("EGL cannot access a requested resource (for example a context is bound in another thread).")]
    BadAccess,
    /// EGL failed to allocate resources for the requested operation.
    #[error("EGL failed to allocate resources for the requested operation.")]
    BadAlloc,
    /// An unrecognized attribute or attribute value was passed in the attribute list.
    #[error("An unrecognized attribute or attribute value was passed in the attribute list.")]
    BadAttribute,
    /// An EGLContext argument does not name a valid EGL rendering context.
    #[error("An EGLContext argument does not name a valid EGL rendering context.")]
    BadContext,
    /// An EGLConfig argument does not name a valid EGL frame buffer configuration.
    #[error("An EGLConfig argument does not name a valid EGL frame buffer configuration.")]
    BadConfig,
    /// The current surface of the calling thread is a window, pixel buffer or pixmap that is no longer valid.
    #[error("The current surface of the calling thread is a window, pixel buffer or pixmap that is no longer valid.")]
    BadCurrentSurface,
    /// An EGLDisplay argument does not name a valid EGL display connection.
    #[error("An EGLDisplay argument does not name a valid EGL display connection.")]
    BadDisplay,
    /// An EGLSurface argument does not name a valid surface (window, pixel buffer or pixmap) configured for GL rendering.
    #[error("An EGLSurface argument does not name a valid surface (window, pixel buffer or pixmap) configured for GL rendering.")]
    BadSurface,
    /// Arguments are inconsistent (for example, a valid context requires buffers not supplied by a valid surface).
    #[error("Arguments are inconsistent (for example, a valid context requires buffers not supplied by a valid surface).")]
    BadMatch,
    /// One or more argument values are invalid.
    #[error("One or more argument values are invalid.")]
    BadParameter,
    /// A NativePixmapType argument does not refer to a valid native pixmap.
    #[error("A NativePixmapType argument does not refer to a valid native pixmap.")]
    BadNativePixmap,
    /// A NativeWindowType argument does not refer to a valid native window.
    #[error("A NativeWindowType argument does not refer to a valid native window.")]
    BadNativeWindow,
    /// A power management event has occurred. The application must destroy all contexts and reinitialise OpenGL ES state and objects to continue rendering.
    #[error("A power management event has occurred. The application must destroy all contexts and reinitialise OpenGL ES state and objects to continue rendering.")]
    ContextLost,
    /// An unknown error
    #[error("An unknown error ({0:x})")]
    Unknown(u32),
}

/// Numeric values of `eglGetError`, as defined by the EGL 1.5 specification.
pub mod codes {
    #![allow(missing_docs)]
    pub const SUCCESS: u32 = 0x3000;
    pub const NOT_INITIALIZED: u32 = 0x3001;
    pub const BAD_ACCESS: u32 = 0x3002;
    pub const BAD_ALLOC: u32 = 0x3003;
    pub const BAD_ATTRIBUTE: u32 = 0x3004;
    pub const BAD_CONFIG: u32 = 0x3005;
    pub const BAD_CONTEXT: u32 = 0x3006;
    pub const BAD_CURRENT_SURFACE: u32 = 0x3007;
    pub const BAD_DISPLAY: u32 = 0x3008;
    pub const BAD_MATCH: u32 = 0x3009;
    pub const BAD_NATIVE_PIXMAP: u32 = 0x300A;
    pub const BAD_NATIVE_WINDOW: u32 = 0x300B;
    pub const BAD_PARAMETER: u32 = 0x300C;
    pub const BAD_SURFACE: u32 = 0x300D;
    pub const CONTEXT_LOST: u32 = 0x300E;
}

impl From<u32> for EGLError {
    fn from(value: u32) -> Self {
        match value {
            codes::NOT_INITIALIZED => EGLError::NotInitialized,
            codes::BAD_ACCESS => EGLError::BadAccess,
            codes::BAD_ALLOC => EGLError::BadAlloc,
            codes::BAD_ATTRIBUTE => EGLError::BadAttribute,
            codes::BAD_CONFIG => EGLError::BadConfig,
            codes::BAD_CONTEXT => EGLError::BadContext,
            codes::BAD_CURRENT_SURFACE => EGLError::BadCurrentSurface,
            codes::BAD_DISPLAY => EGLError::BadDisplay,
            codes::BAD_SURFACE => EGLError::BadSurface,
            codes::BAD_MATCH => EGLError::BadMatch,
            codes::BAD_PARAMETER => EGLError::BadParameter,
            codes::BAD_NATIVE_PIXMAP => EGLError::BadNativePixmap,
            codes::BAD_NATIVE_WINDOW => EGLError::BadNativeWindow,
            codes::CONTEXT_LOST => EGLError::ContextLost,
            x => EGLError::Unknown(x),
        }
    }
}

impl EGLError {
    /// The numeric `eglGetError` value of this error
    pub fn code(&self) -> u32 {
        match *self {
            EGLError::NotInitialized => codes::NOT_INITIALIZED,
            EGLError::BadAccess => codes::BAD_ACCESS,
            EGLError::BadAlloc => codes::BAD_ALLOC,
            EGLError::BadAttribute => codes::BAD_ATTRIBUTE,
            EGLError::BadConfig => codes::BAD_CONFIG,
            EGLError::BadContext => codes::BAD_CONTEXT,
            EGLError::BadCurrentSurface => codes::BAD_CURRENT_SURFACE,
            EGLError::BadDisplay => codes::BAD_DISPLAY,
            EGLError::BadSurface => codes::BAD_SURFACE,
            EGLError::BadMatch => codes::BAD_MATCH,
            EGLError::BadParameter => codes::BAD_PARAMETER,
            EGLError::BadNativePixmap => codes::BAD_NATIVE_PIXMAP,
            EGLError::BadNativeWindow => codes::BAD_NATIVE_WINDOW,
            EGLError::ContextLost => codes::CONTEXT_LOST,
            EGLError::Unknown(x) => x,
        }
    }

    /// Reads `eglGetError` after a call that may have failed.
    #[cfg(feature = "backend_egl")]
    pub(crate) fn from_last_call() -> Result<(), EGLError> {
        match unsafe { super::ffi::egl::GetError() as u32 } {
            codes::SUCCESS => Ok(()),
            x => Err(EGLError::from(x)),
        }
    }
}

#[cfg(feature = "backend_egl")]
pub(crate) fn wrap_egl_call<R, F: FnOnce() -> R>(call: F) -> Result<R, EGLError> {
    let res = call();
    EGLError::from_last_call().map(|()| res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_survive_decoding() {
        for code in codes::NOT_INITIALIZED..=codes::CONTEXT_LOST {
            assert_eq!(EGLError::from(code).code(), code);
        }
        assert_eq!(EGLError::from(0x1234), EGLError::Unknown(0x1234));
    }

    #[test]
    fn config_failures_are_fatal() {
        assert!(Error::NoAvailableConfig.is_configuration_error());
        assert!(Error::NoMatchingConfig.is_configuration_error());
        assert!(!Error::DisplayNotSupported.is_configuration_error());
        assert!(!Error::CreationFailed(EGLError::BadAlloc).is_configuration_error());
    }
}
