//! Ownership of the display/context/surface triple of a render thread

use tracing::{debug, error, info, info_span, warn};

use super::{
    attrib, ChosenConfig, EGLApi, EGLConfigChooser, EGLContextRaw, EGLDisplayRaw, EGLError, EGLSurfaceRaw,
    Error, Gl, MakeCurrentError, NativeWindow,
};
use crate::backend::SwapBuffersError;

/// Error that can happen when creating a window surface
#[derive(thiserror::Error, Debug)]
pub enum SurfaceCreationError {
    /// There is no native window to create the surface for
    #[error("No native window to create a surface for")]
    NoNativeWindow,
    /// [`EGLHolder::prepare`] did not succeed yet
    #[error("No EGL context available")]
    NotPrepared,
    /// `eglCreateWindowSurface` failed
    #[error("Surface creation failed: {0}")]
    EGLSurfaceCreationFailed(#[source] EGLError),
    /// The new surface could not be made current
    #[error(transparent)]
    MakeCurrent(#[from] MakeCurrentError),
}

/// What an [`EGLHolder`] currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EGLState {
    /// No context, [`EGLHolder::prepare`] is needed
    NoContext,
    /// A context but no window surface
    NoSurface,
    /// Context and surface, ready to draw
    Ready,
}

/// Owner of the EGL objects of one render thread.
///
/// Teardown methods are idempotent and never fail: errors are logged and the handle is
/// forgotten regardless, the driver cannot do anything useful with it anymore.
pub struct EGLHolder {
    api: Box<dyn EGLApi>,
    chooser: EGLConfigChooser,
    display: Option<EGLDisplayRaw>,
    config: Option<ChosenConfig>,
    context: Option<EGLContextRaw>,
    surface: Option<EGLSurfaceRaw>,
    span: tracing::Span,
}

impl std::fmt::Debug for EGLHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EGLHolder")
            .field("chooser", &self.chooser)
            .field("display", &self.display)
            .field("config", &self.config)
            .field("context", &self.context)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl EGLHolder {
    /// Create an empty holder, nothing is touched until [`EGLHolder::prepare`]
    pub fn new(api: Box<dyn EGLApi>, chooser: EGLConfigChooser) -> EGLHolder {
        EGLHolder {
            api,
            chooser,
            display: None,
            config: None,
            context: None,
            surface: None,
            span: info_span!("egl_holder"),
        }
    }

    /// Acquires the default display, chooses a config and creates an OpenGL ES 2 context.
    ///
    /// Does nothing if a context already exists. Errors are fatal, there is no way to render
    /// the map without a context.
    pub fn prepare(&mut self) -> Result<(), Error> {
        let _guard = self.span.enter();
        if self.context.is_some() {
            return Ok(());
        }

        let display = match self.display {
            Some(display) => display,
            None => {
                let display = self.api.get_display().ok_or(Error::DisplayNotSupported)?;
                let version = self.api.initialize(display).map_err(|err| {
                    error!(?err, "eglInitialize() failed");
                    Error::InitFailed(err)
                })?;
                info!("EGL Initialized, version {}.{}", version.0, version.1);
                self.display = Some(display);
                display
            }
        };

        self.api.bind_api().map_err(|err| {
            error!(?err, "OpenGLES not supported by the underlying EGL implementation");
            Error::OpenGlesNotSupported(Some(err))
        })?;

        let config = match self.config {
            Some(config) => config,
            None => {
                let config = self.chooser.choose_config(self.api.as_ref(), display)?;
                self.config = Some(config);
                config
            }
        };

        let context_attributes = [attrib::CONTEXT_CLIENT_VERSION, 2, attrib::NONE];
        let context = self
            .api
            .create_context(display, config.config, &context_attributes)
            .map_err(|err| {
                error!(?err, "eglCreateContext() failed");
                Error::CreationFailed(err)
            })?;
        debug!(?context, "EGL context created");
        self.context = Some(context);

        Ok(())
    }

    /// Creates a window surface for `window` and makes it current, replacing any existing one.
    ///
    /// Failures are reported, not fatal: the window may simply be gone already.
    pub fn create_surface(&mut self, window: Option<NativeWindow>) -> Result<(), SurfaceCreationError> {
        let span = self.span.clone();
        let _guard = span.enter();
        let (display, config, context) = match (self.display, self.config, self.context) {
            (Some(display), Some(config), Some(context)) => (display, config, context),
            _ => return Err(SurfaceCreationError::NotPrepared),
        };

        // the old surface would keep the window connected
        self.destroy_surface_inner();

        let window = window.ok_or(SurfaceCreationError::NoNativeWindow)?;
        let surface = self
            .api
            .create_window_surface(display, config.config, window, &[attrib::NONE])
            .map_err(|err| {
                if err == EGLError::BadNativeWindow {
                    error!("createWindowSurface returned EGL_BAD_NATIVE_WINDOW.");
                } else {
                    warn!(?err, "createWindowSurface() failed");
                }
                SurfaceCreationError::EGLSurfaceCreationFailed(err)
            })?;
        self.surface = Some(surface);

        self.api
            .make_current(display, Some(surface), Some(context))
            .map_err(|err| {
                warn!(?err, "eglMakeCurrent() failed");
                MakeCurrentError(err)
            })?;
        Ok(())
    }

    /// Makes the held context and surface current on this thread
    pub fn make_current(&self) -> Result<(), MakeCurrentError> {
        let display = self.display.ok_or(MakeCurrentError(EGLError::NotInitialized))?;
        self.api
            .make_current(display, self.surface, self.context)
            .map_err(MakeCurrentError)
    }

    /// Presents the back buffer
    pub fn swap(&self) -> Result<(), SwapBuffersError> {
        match (self.display, self.surface) {
            (Some(display), Some(surface)) => Ok(self.api.swap_buffers(display, surface)?),
            _ => Err(SwapBuffersError::from(EGLError::BadSurface)),
        }
    }

    /// Destroys the window surface, if any
    pub fn destroy_surface(&mut self) {
        let span = self.span.clone();
        let _guard = span.enter();
        self.destroy_surface_inner();
    }

    fn destroy_surface_inner(&mut self) {
        if let (Some(display), Some(surface)) = (self.display, self.surface.take()) {
            if let Err(err) = self.api.destroy_surface(display, surface) {
                warn!(?err, ?surface, "eglDestroySurface() failed");
            }
        }
    }

    /// Destroys the context, if any
    pub fn destroy_context(&mut self) {
        let _guard = self.span.enter();
        if let (Some(display), Some(context)) = (self.display, self.context.take()) {
            if let Err(err) = self.api.destroy_context(display, context) {
                warn!(?err, ?context, "eglDestroyContext() failed");
            }
        }
    }

    /// Terminates the display connection, if any
    pub fn terminate(&mut self) {
        let _guard = self.span.enter();
        if let Some(display) = self.display.take() {
            if let Err(err) = self.api.terminate(display) {
                warn!(?err, "eglTerminate() failed");
            }
        }
        self.config = None;
    }

    /// Destroys everything in order: surface, context, display
    pub fn cleanup(&mut self) {
        self.destroy_surface();
        self.destroy_context();
        self.terminate();
    }

    /// What this holder currently holds
    pub fn state(&self) -> EGLState {
        match (self.context, self.surface) {
            (None, _) => EGLState::NoContext,
            (Some(_), None) => EGLState::NoSurface,
            (Some(_), Some(_)) => EGLState::Ready,
        }
    }

    /// Whether a context exists
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Whether a window surface exists
    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// The config chosen by [`EGLHolder::prepare`]
    pub fn config(&self) -> Option<&ChosenConfig> {
        self.config.as_ref()
    }

    /// GL functions of the driver
    pub fn gl(&self) -> &dyn Gl {
        self.api.gl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::egl::test::{DummyCall, DummyEGL};
    use crate::backend::egl::ConfigRequirements;

    fn holder(egl: &DummyEGL) -> EGLHolder {
        EGLHolder::new(
            Box::new(egl.clone()),
            EGLConfigChooser::new(ConfigRequirements {
                translucent_surface: false,
                emulator: Some(false),
            }),
        )
    }

    const WINDOW: NativeWindow = NativeWindow::from_raw(0xdead);

    #[test]
    fn prepare_is_idempotent() {
        let egl = DummyEGL::default();
        let mut holder = holder(&egl);
        assert_eq!(holder.state(), EGLState::NoContext);

        holder.prepare().unwrap();
        holder.prepare().unwrap();
        assert_eq!(egl.live_contexts(), 1);
        assert_eq!(egl.count(|c| *c == DummyCall::Initialize), 1);
        assert_eq!(holder.state(), EGLState::NoSurface);
        assert!(holder.config().is_some());
    }

    #[test]
    fn missing_display_is_fatal() {
        let egl = DummyEGL::default();
        egl.set_display_available(false);
        let mut holder = holder(&egl);
        assert!(matches!(holder.prepare(), Err(Error::DisplayNotSupported)));
        assert!(!holder.has_context());
    }

    #[test]
    fn context_creation_failure_is_fatal() {
        let egl = DummyEGL::default();
        egl.fail_context_creation(true);
        let mut holder = holder(&egl);
        assert!(matches!(holder.prepare(), Err(Error::CreationFailed(EGLError::BadAlloc))));
    }

    #[test]
    fn surface_replaces_previous_one() {
        let egl = DummyEGL::default();
        let mut holder = holder(&egl);
        holder.prepare().unwrap();

        holder.create_surface(Some(WINDOW)).unwrap();
        holder.create_surface(Some(WINDOW)).unwrap();
        assert_eq!(egl.live_surfaces(), 1);
        assert_eq!(egl.count(|c| matches!(c, DummyCall::DestroySurface(_))), 1);
        assert_eq!(holder.state(), EGLState::Ready);
        assert!(matches!(egl.current(), Some((Some(_), Some(_)))));

        holder.make_current().unwrap();
        egl.push_make_current_error(EGLError::BadAccess);
        assert_eq!(holder.make_current().unwrap_err().0, EGLError::BadAccess);
    }

    #[test]
    fn surface_failures_are_reported() {
        let egl = DummyEGL::default();
        let mut holder = holder(&egl);
        assert!(matches!(
            holder.create_surface(Some(WINDOW)),
            Err(SurfaceCreationError::NotPrepared)
        ));

        holder.prepare().unwrap();
        assert!(matches!(
            holder.create_surface(None),
            Err(SurfaceCreationError::NoNativeWindow)
        ));

        egl.kill_window(WINDOW);
        assert!(matches!(
            holder.create_surface(Some(WINDOW)),
            Err(SurfaceCreationError::EGLSurfaceCreationFailed(EGLError::BadNativeWindow))
        ));
        assert!(!holder.has_surface());

        egl.push_make_current_error(EGLError::BadMatch);
        assert!(matches!(
            holder.create_surface(Some(NativeWindow::from_raw(0xbeef))),
            Err(SurfaceCreationError::MakeCurrent(_))
        ));
    }

    #[test]
    fn swap_classifies_context_loss() {
        let egl = DummyEGL::default();
        let mut holder = holder(&egl);
        assert!(holder.swap().is_err());

        holder.prepare().unwrap();
        holder.create_surface(Some(WINDOW)).unwrap();
        holder.swap().unwrap();

        egl.push_swap_error(EGLError::ContextLost);
        assert!(holder.swap().unwrap_err().is_context_lost());
        egl.push_swap_error(EGLError::BadNativeWindow);
        assert!(!holder.swap().unwrap_err().is_context_lost());
    }

    #[test]
    fn teardown_is_idempotent() {
        let egl = DummyEGL::default();
        let mut holder = holder(&egl);

        // nothing to tear down yet
        holder.cleanup();
        assert!(egl.calls().iter().all(|c| *c != DummyCall::Terminate));

        holder.prepare().unwrap();
        holder.create_surface(Some(WINDOW)).unwrap();
        holder.destroy_surface();
        holder.destroy_surface();
        holder.destroy_context();
        holder.destroy_context();
        assert_eq!(egl.count(|c| matches!(c, DummyCall::DestroySurface(_))), 1);
        assert_eq!(egl.count(|c| matches!(c, DummyCall::DestroyContext(_))), 1);

        holder.cleanup();
        holder.cleanup();
        assert_eq!(egl.count(|c| *c == DummyCall::Terminate), 1);
        assert!(!egl.is_initialized());
        assert_eq!(egl.live_contexts(), 0);
        assert_eq!(egl.live_surfaces(), 0);
    }

    #[test]
    fn prepare_after_terminate_starts_over() {
        let egl = DummyEGL::default();
        let mut holder = holder(&egl);
        holder.prepare().unwrap();
        holder.cleanup();

        holder.prepare().unwrap();
        assert_eq!(egl.count(|c| *c == DummyCall::Initialize), 2);
        assert_eq!(egl.live_contexts(), 1);
    }
}
