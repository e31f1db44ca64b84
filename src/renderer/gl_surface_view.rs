//! Rendering through a platform GL surface view
//!
//! The widget owns the render thread and the EGL state, the adapter only configures it and
//! forwards scheduling calls. See [`GLSurfaceHost`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::egl::{ConfigRequirements, EGLConfigChooser};
use crate::renderer::{MapRenderer, NativePeer, RenderEvent, RenderFrontend, SurfaceRenderer};

/// When the widget draws frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Only after [`GLSurfaceHost::request_render`]
    WhenDirty,
    /// Continuously
    Continuously,
}

/// The platform widget owning a render thread
pub trait GLSurfaceHost: Send + Sync {
    /// OpenGL ES major version of the contexts the widget creates
    fn set_egl_context_client_version(&self, version: i32);
    /// Config selection for the widget's contexts
    fn set_egl_config_chooser(&self, chooser: EGLConfigChooser);
    /// Callbacks of the widget's render thread
    fn set_renderer(&self, renderer: Arc<dyn SurfaceRenderer>);
    /// When frames are drawn
    fn set_render_mode(&self, mode: RenderMode);
    /// Whether the context survives a pause
    fn set_preserve_egl_context_on_pause(&self, preserve: bool);
    /// Resumes the render thread
    fn on_resume(&self);
    /// Pauses the render thread
    fn on_pause(&self);
    /// Runs `event` on the render thread
    fn queue_event(&self, event: RenderEvent);
    /// Requests a frame
    fn request_render(&self);
}

/// Map renderer of a GL surface view
pub struct GLSurfaceViewMapRenderer {
    renderer: Arc<MapRenderer>,
    host: Arc<dyn GLSurfaceHost>,
}

impl fmt::Debug for GLSurfaceViewMapRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GLSurfaceViewMapRenderer")
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}

impl GLSurfaceViewMapRenderer {
    /// Configures `host` to draw the map with `peer`
    pub fn new(
        host: Arc<dyn GLSurfaceHost>,
        peer: Box<dyn NativePeer>,
        requirements: ConfigRequirements,
    ) -> GLSurfaceViewMapRenderer {
        let renderer = Arc::new(MapRenderer::new(peer));

        host.set_egl_context_client_version(2);
        host.set_egl_config_chooser(EGLConfigChooser::new(requirements));
        host.set_renderer(renderer.clone());
        host.set_render_mode(RenderMode::WhenDirty);
        host.set_preserve_egl_context_on_pause(true);
        debug!(?requirements, "GL surface view configured");

        GLSurfaceViewMapRenderer { renderer, host }
    }

    /// The widget was detached from its window.
    ///
    /// The widget tears down its render thread without calling back, so the engine drops its
    /// GL state here.
    pub fn on_detached_from_window(&self) {
        info!("GL surface view detached, resetting native peer");
        self.renderer.reset();
    }
}

impl RenderFrontend for GLSurfaceViewMapRenderer {
    fn map_renderer(&self) -> &Arc<MapRenderer> {
        &self.renderer
    }

    fn request_render(&self) {
        self.host.request_render();
    }

    fn queue_event(&self, event: RenderEvent) {
        self.host.queue_event(event);
    }

    fn on_start(&self) {
        self.host.on_resume();
    }

    fn on_stop(&self) {
        self.host.on_pause();
    }
}
