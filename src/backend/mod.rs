//! Backend (EGL) helpers
//!
//! Collection of the types used to talk to the platform graphics stack.
//! All of them are meant to be used from a single render thread; see
//! [`renderer`](crate::renderer) for the thread that drives them.
//!
//! Supported graphics backends:
//!
//! - EGL through the system `libEGL` (feature `backend_egl`)
//! - an in-memory scripted EGL for tests (feature `egl_test`)

pub mod egl;

/// Error that can happen when presenting a frame
#[derive(Debug, thiserror::Error)]
pub enum SwapBuffersError {
    /// The corresponding context has been lost and needs to be recreated.
    ///
    /// All the objects associated to it (textures, buffers, programs, etc.)
    /// need to be recreated from scratch. Both the surface and the context
    /// have to be torn down before rendering can resume.
    #[error("The context has been lost, it needs to be recreated: {0}")]
    ContextLost(Box<dyn std::error::Error + Send + Sync>),
    /// A temporary condition caused the swap to fail.
    ///
    /// Most of the time the surface has gone away underneath us. Dropping the
    /// surface and waiting for a new one is enough to recover.
    #[error("A temporary condition caused the page flip to fail: {0}")]
    TemporaryFailure(Box<dyn std::error::Error + Send + Sync>),
}

impl SwapBuffersError {
    /// Returns true if the context has to be recreated to recover.
    pub fn is_context_lost(&self) -> bool {
        matches!(self, SwapBuffersError::ContextLost(_))
    }
}
