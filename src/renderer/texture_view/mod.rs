//! Rendering into a texture view through a private render thread
//!
//! A texture view only provides a native window. [`TextureViewMapRenderer`] spawns a
//! [`RenderThread`] at construction which owns all EGL state and drives the shared
//! [`MapRenderer`]. The view's surface callbacks and lifecycle are forwarded to that thread.

use std::io;
use std::sync::Arc;

use tracing::debug;

use crate::backend::egl::{EGLApi, EGLConfigChooser, EGLHolder, NativeWindow};
use crate::renderer::{MapRenderer, NativePeer, RenderEvent, RenderFrontend};

mod thread;
pub use self::thread::{
    ExitState, RenderThread, RenderThreadOptions, RenderThreadState, SurfaceState, Teardown,
    DEFAULT_THREAD_NAME,
};

/// Map renderer of a texture view
#[derive(Debug)]
pub struct TextureViewMapRenderer {
    renderer: Arc<MapRenderer>,
    thread: RenderThread,
}

impl TextureViewMapRenderer {
    /// Creates the renderer and starts its render thread
    pub fn new(
        api: Box<dyn EGLApi>,
        peer: Box<dyn NativePeer>,
        options: RenderThreadOptions,
    ) -> io::Result<TextureViewMapRenderer> {
        let renderer = Arc::new(MapRenderer::new(peer));
        let holder = EGLHolder::new(api, EGLConfigChooser::new(options.config));
        let thread = RenderThread::spawn(holder, renderer.clone(), &options)?;

        Ok(TextureViewMapRenderer { renderer, thread })
    }

    /// The render thread
    pub fn render_thread(&self) -> &RenderThread {
        &self.thread
    }

    /// See [`RenderThread::on_surface_texture_available`]
    pub fn on_surface_texture_available(&self, window: NativeWindow, width: i32, height: i32) {
        self.thread.on_surface_texture_available(window, width, height);
    }

    /// See [`RenderThread::on_surface_texture_size_changed`]
    pub fn on_surface_texture_size_changed(&self, width: i32, height: i32) {
        self.thread.on_surface_texture_size_changed(width, height);
    }

    /// See [`RenderThread::on_surface_texture_destroyed`]
    pub fn on_surface_texture_destroyed(&self) -> bool {
        self.thread.on_surface_texture_destroyed()
    }

    /// See [`RenderThread::on_surface_texture_updated`]
    pub fn on_surface_texture_updated(&self) {
        self.thread.on_surface_texture_updated();
    }
}

impl RenderFrontend for TextureViewMapRenderer {
    fn map_renderer(&self) -> &Arc<MapRenderer> {
        &self.renderer
    }

    fn request_render(&self) {
        self.thread.request_render();
    }

    fn queue_event(&self, event: RenderEvent) {
        self.thread.queue_event(event);
    }

    fn on_pause(&self) {
        self.thread.on_pause();
    }

    fn on_resume(&self) {
        self.thread.on_resume();
    }

    /// Blocks until the render thread exited, then releases the native engine
    fn on_destroy(&self) {
        self.thread.on_destroy();
        if self.renderer.release() {
            debug!("Native peer released after render thread exit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::egl::test::DummyEGL;
    use crate::backend::egl::ConfigRequirements;
    use crate::renderer::test::{init_logging, PeerCall, PeerLog};

    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    fn renderer(egl: &DummyEGL, log: &PeerLog) -> TextureViewMapRenderer {
        init_logging();
        TextureViewMapRenderer::new(
            Box::new(egl.clone()),
            log.peer(),
            RenderThreadOptions {
                thread_name: "map-render-test".into(),
                config: ConfigRequirements {
                    translucent_surface: true,
                    emulator: Some(false),
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn lifecycle() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        let map = renderer(&egl, &log);

        map.on_start();
        map.on_surface_texture_available(NativeWindow::from_raw(0x10), 300, 200);
        assert!(wait_until(|| log.count(|c| *c == PeerCall::Render) == 1));

        map.on_surface_texture_updated();
        map.on_pause();
        assert_eq!(map.render_thread().state(), RenderThreadState::Paused);
        map.on_resume();

        map.request_render();
        assert!(wait_until(|| log.count(|c| *c == PeerCall::Render) == 2));

        map.on_stop();
        map.on_destroy();
        map.on_destroy();
        assert!(map.render_thread().is_exited());
        assert_eq!(log.releases(), 1);
        assert_eq!(egl.live_contexts(), 0);
    }

    #[test]
    fn events_run_on_the_named_render_thread() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        let map = renderer(&egl, &log);

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        map.queue_event(Box::new(move || {
            *sink.lock().unwrap() = std::thread::current().name().map(str::to_owned);
        }));
        assert!(wait_until(|| seen.lock().unwrap().is_some()));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("map-render-test"));
    }

    #[test]
    fn fps_settings_reach_the_renderer() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        let map = renderer(&egl, &log);

        let reports = Arc::new(Mutex::new(Vec::<f64>::new()));
        let sink = reports.clone();
        map.set_maximum_fps(60);
        map.set_on_fps_changed_listener(Some(Arc::new(move |fps: f64| sink.lock().unwrap().push(fps))));
        assert_eq!(
            map.map_renderer().frame_throttle().frame_budget(),
            Some(Duration::from_nanos(1_000_000_000 / 60))
        );

        map.on_surface_texture_available(NativeWindow::from_raw(0x10), 300, 200);
        assert!(wait_until(|| log.count(|c| *c == PeerCall::Render) == 1));
        map.request_render();
        assert!(wait_until(|| !reports.lock().unwrap().is_empty()));
        assert!(reports.lock().unwrap().iter().all(|fps| *fps <= 60.5));
    }

    #[test]
    fn dropping_stops_the_thread() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        let map = renderer(&egl, &log);
        map.on_surface_texture_available(NativeWindow::from_raw(0x10), 300, 200);
        assert!(wait_until(|| log.count(|c| *c == PeerCall::Render) == 1));

        drop(map);
        assert_eq!(egl.live_contexts(), 0);
        assert_eq!(log.releases(), 1);
    }
}
