//! Frame scheduling for the native map engine
//!
//! [`MapRenderer`] is what a render thread draws with. It forwards the surface lifecycle to the
//! native engine through a [`NativePeerHandle`], caps the frame rate and reports the achieved
//! frame rate to an optional listener.
//!
//! Where the render thread comes from is up to the hosting adapter:
//!
//! - [`texture_view::TextureViewMapRenderer`] runs its own render thread and EGL state machine.
//! - [`gl_surface_view::GLSurfaceViewMapRenderer`] hands the renderer to a platform widget which
//!   owns the thread.
//!
//! Both implement [`RenderFrontend`], the interface the map view talks to.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::backend::egl::{ChosenConfig, Gl};
use crate::utils::lock;

pub mod gl_surface_view;
pub mod texture_view;


/// Work queued for the render thread
pub type RenderEvent = Box<dyn FnOnce() + Send + 'static>;

/// Receives the achieved frame rate after every frame
pub type FpsListener = Arc<dyn Fn(f64) + Send + Sync + 'static>;

/// Error reported by the native engine while rendering a frame
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct NativeError {
    message: String,
}

impl NativeError {
    /// Wraps an engine error message
    pub fn new(message: impl Into<String>) -> NativeError {
        NativeError {
            message: message.into(),
        }
    }
}

/// The native map engine.
///
/// All methods are called on the render thread with the engine's context current, except for
/// the destructor, which may run on any thread.
pub trait NativePeer: Send {
    /// A new context and surface exist
    fn on_surface_created(&mut self);
    /// The surface has a new size
    fn on_surface_changed(&mut self, width: i32, height: i32);
    /// The context is about to be destroyed, GL objects must be released now
    fn on_surface_destroyed(&mut self);
    /// Render one frame
    fn render(&mut self) -> Result<(), NativeError>;
    /// Drop all GL dependent state, the context is gone already
    fn reset(&mut self);
}

/// Owning handle to the native engine.
///
/// The engine is released exactly once, either by [`NativePeerHandle::release`] or when the
/// handle is dropped. Calls after the release are ignored.
#[derive(Default)]
pub struct NativePeerHandle {
    peer: Option<Box<dyn NativePeer>>,
}

impl fmt::Debug for NativePeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePeerHandle")
            .field("released", &self.peer.is_none())
            .finish()
    }
}

impl NativePeerHandle {
    /// Takes ownership of `peer`
    pub fn new(peer: Box<dyn NativePeer>) -> NativePeerHandle {
        NativePeerHandle { peer: Some(peer) }
    }

    /// Whether the engine has been released
    pub fn is_released(&self) -> bool {
        self.peer.is_none()
    }

    /// Releases the engine, returns `false` if it was released already
    pub fn release(&mut self) -> bool {
        match self.peer.take() {
            Some(peer) => {
                debug!("Releasing native peer");
                drop(peer);
                true
            }
            None => false,
        }
    }

    /// The engine, unless released
    pub fn get(&mut self) -> Option<&mut (dyn NativePeer + 'static)> {
        self.peer.as_deref_mut()
    }
}

impl Drop for NativePeerHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Frame rate cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameThrottle {
    frame_budget: Option<Duration>,
}

impl FrameThrottle {
    /// No cap
    pub const fn uncapped() -> FrameThrottle {
        FrameThrottle { frame_budget: None }
    }

    /// Cap at `fps` frames per second, `None` unless `fps` is positive
    pub fn with_maximum_fps(fps: i32) -> Option<FrameThrottle> {
        if fps <= 0 {
            return None;
        }
        Some(FrameThrottle {
            frame_budget: Some(Duration::from_nanos(1_000_000_000 / fps as u64)),
        })
    }

    /// Minimum time a frame takes, if capped
    pub fn frame_budget(&self) -> Option<Duration> {
        self.frame_budget
    }

    /// How long to sleep after a frame that took `render_time`
    pub fn remaining(&self, render_time: Duration) -> Option<Duration> {
        self.frame_budget?
            .checked_sub(render_time)
            .filter(|remaining| !remaining.is_zero())
    }
}

#[derive(Default)]
struct FpsCounter {
    last_frame: Option<Instant>,
    listener: Option<FpsListener>,
}

impl FpsCounter {
    /// Records a frame finished at `now`, returns what to report
    fn frame(&mut self, now: Instant) -> Option<(FpsListener, f64)> {
        let last = self.last_frame.replace(now)?;
        let listener = self.listener.clone()?;
        let elapsed = now.duration_since(last).as_nanos();
        if elapsed == 0 {
            return None;
        }
        Some((listener, 1e9 / elapsed as f64))
    }
}

/// Drives the native engine from a render thread
pub struct MapRenderer {
    peer: Mutex<NativePeerHandle>,
    throttle: Mutex<FrameThrottle>,
    fps: Mutex<FpsCounter>,
}

impl fmt::Debug for MapRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRenderer")
            .field("peer", &*lock(&self.peer))
            .field("throttle", &*lock(&self.throttle))
            .finish_non_exhaustive()
    }
}

impl MapRenderer {
    /// Create a renderer driving `peer`, without frame rate cap
    pub fn new(peer: Box<dyn NativePeer>) -> MapRenderer {
        MapRenderer {
            peer: Mutex::new(NativePeerHandle::new(peer)),
            throttle: Mutex::new(FrameThrottle::uncapped()),
            fps: Mutex::new(FpsCounter::default()),
        }
    }

    /// Caps the frame rate. Values below one are ignored.
    pub fn set_maximum_fps(&self, fps: i32) {
        match FrameThrottle::with_maximum_fps(fps) {
            Some(throttle) => *lock(&self.throttle) = throttle,
            None => warn!(fps, "Ignoring invalid maximum fps"),
        }
    }

    /// The current frame rate cap
    pub fn frame_throttle(&self) -> FrameThrottle {
        *lock(&self.throttle)
    }

    /// Replaces the frame rate listener, `None` removes it
    pub fn set_on_fps_changed_listener(&self, listener: Option<FpsListener>) {
        lock(&self.fps).listener = listener;
    }

    /// Drops the native engine's GL state, used when the context vanished without notice
    pub fn reset(&self) {
        if let Some(peer) = lock(&self.peer).get() {
            peer.reset();
        }
    }

    /// Releases the native engine. Later calls into this renderer do nothing.
    pub fn release(&self) -> bool {
        lock(&self.peer).release()
    }

    fn with_peer(&self, f: impl FnOnce(&mut dyn NativePeer)) {
        match lock(&self.peer).get() {
            Some(peer) => f(peer),
            None => trace!("Native peer released, ignoring call"),
        }
    }
}

/// Callbacks of a render thread.
///
/// Every call happens on the render thread with a current context.
pub trait SurfaceRenderer: Send + Sync {
    /// A context and surface have been created
    fn on_surface_created(&self, gl: &dyn Gl, config: &ChosenConfig);
    /// The surface has a (new) size
    fn on_surface_changed(&self, gl: &dyn Gl, width: i32, height: i32);
    /// The context is about to be destroyed
    fn on_surface_destroyed(&self);
    /// Draw one frame
    fn on_draw_frame(&self, gl: &dyn Gl);
}

impl SurfaceRenderer for MapRenderer {
    fn on_surface_created(&self, _gl: &dyn Gl, config: &ChosenConfig) {
        debug!(pixel_format = ?config.pixel_format, "Surface created");
        self.with_peer(|peer| peer.on_surface_created());
    }

    fn on_surface_changed(&self, gl: &dyn Gl, width: i32, height: i32) {
        gl.viewport(0, 0, width, height);
        self.with_peer(|peer| peer.on_surface_changed(width, height));
    }

    fn on_surface_destroyed(&self) {
        self.with_peer(|peer| peer.on_surface_destroyed());
    }

    #[profiling::function]
    fn on_draw_frame(&self, _gl: &dyn Gl) {
        let start = Instant::now();
        self.with_peer(|peer| {
            if let Err(err) = peer.render() {
                error!(?err, "Error in render");
            }
        });

        let render_time = start.elapsed();
        if let Some(remaining) = self.frame_throttle().remaining(render_time) {
            thread::sleep(remaining);
        }

        let report = lock(&self.fps).frame(Instant::now());
        if let Some((listener, fps)) = report {
            listener(fps);
        }
    }
}

/// What a map view talks to, independent of how rendering is hosted.
///
/// Lifecycle methods mirror the hosting view. All methods may be called from any thread.
pub trait RenderFrontend {
    /// The renderer frames are drawn with
    fn map_renderer(&self) -> &Arc<MapRenderer>;

    /// Requests a frame to be drawn as soon as possible
    fn request_render(&self);

    /// Runs `event` on the render thread before the next frame
    fn queue_event(&self, event: RenderEvent);

    /// The view became visible
    fn on_start(&self) {}

    /// The view is no longer visible
    fn on_stop(&self) {}

    /// The activity has been paused
    fn on_pause(&self) {}

    /// The activity has been resumed
    fn on_resume(&self) {}

    /// The view is going away for good
    fn on_destroy(&self) {}

    /// Caps the frame rate. Values below one are ignored.
    fn set_maximum_fps(&self, fps: i32) {
        self.map_renderer().set_maximum_fps(fps);
    }

    /// Replaces the frame rate listener, `None` removes it
    fn set_on_fps_changed_listener(&self, listener: Option<FpsListener>) {
        self.map_renderer().set_on_fps_changed_listener(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::test::{PeerCall, PeerLog};
    use super::*;
    use crate::backend::egl::test::DummyEGL;
    use crate::backend::egl::EGLApi;

    #[test]
    fn throttle_budget() {
        assert_eq!(FrameThrottle::with_maximum_fps(0), None);
        assert_eq!(FrameThrottle::with_maximum_fps(-3), None);

        let throttle = FrameThrottle::with_maximum_fps(50).unwrap();
        assert_eq!(throttle.frame_budget(), Some(Duration::from_millis(20)));
        assert_eq!(
            throttle.remaining(Duration::from_millis(5)),
            Some(Duration::from_millis(15))
        );
        assert_eq!(throttle.remaining(Duration::from_millis(20)), None);
        assert_eq!(throttle.remaining(Duration::from_millis(35)), None);
        assert_eq!(FrameThrottle::uncapped().remaining(Duration::ZERO), None);
    }

    #[test]
    fn invalid_maximum_fps_is_ignored() {
        let renderer = MapRenderer::new(PeerLog::default().peer());
        renderer.set_maximum_fps(30);
        let capped = renderer.frame_throttle();

        renderer.set_maximum_fps(0);
        renderer.set_maximum_fps(-1);
        assert_eq!(renderer.frame_throttle(), capped);
    }

    #[test]
    fn frames_respect_the_cap() {
        let egl = DummyEGL::default();
        let renderer = MapRenderer::new(PeerLog::default().peer());
        renderer.set_maximum_fps(100);

        let start = Instant::now();
        for _ in 0..5 {
            renderer.on_draw_frame(egl.gl());
        }
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn fps_is_reported_from_the_second_frame() {
        let egl = DummyEGL::default();
        let renderer = MapRenderer::new(PeerLog::default().peer());
        renderer.set_maximum_fps(50);

        let reports = Arc::new(Mutex::new(Vec::<f64>::new()));
        let sink = reports.clone();
        renderer.set_on_fps_changed_listener(Some(Arc::new(move |fps: f64| sink.lock().unwrap().push(fps))));

        renderer.on_draw_frame(egl.gl());
        assert!(reports.lock().unwrap().is_empty());

        renderer.on_draw_frame(egl.gl());
        renderer.on_draw_frame(egl.gl());
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|fps| *fps > 0.0 && *fps <= 50.0));
    }

    #[test]
    fn render_errors_are_not_fatal() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        log.fail_renders(2);
        let renderer = MapRenderer::new(log.peer());

        for _ in 0..3 {
            renderer.on_draw_frame(egl.gl());
        }
        assert_eq!(log.count(|c| *c == PeerCall::Render), 3);
    }

    #[test]
    fn surface_changes_update_the_viewport() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        let renderer = MapRenderer::new(log.peer());

        renderer.on_surface_changed(egl.gl(), 640, 480);
        assert_eq!(egl.viewports(), vec![(0, 0, 640, 480)]);
        assert_eq!(log.calls(), vec![PeerCall::SurfaceChanged(640, 480)]);
    }

    #[test]
    fn peer_is_released_once() {
        let egl = DummyEGL::default();
        let log = PeerLog::default();
        let renderer = MapRenderer::new(log.peer());

        assert!(renderer.release());
        assert!(!renderer.release());
        renderer.on_draw_frame(egl.gl());
        renderer.reset();
        drop(renderer);

        assert_eq!(log.releases(), 1);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn dropping_the_handle_releases() {
        let log = PeerLog::default();
        drop(NativePeerHandle::new(log.peer()));
        assert_eq!(log.releases(), 1);

        let mut handle = NativePeerHandle::default();
        assert!(handle.is_released());
        assert!(!handle.release());
    }
}
