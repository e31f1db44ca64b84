//! Render thread with its own EGL state
//!
//! The thread sleeps on a condition variable until there is something to do. Every wake-up it
//! decides on exactly one [`Step`] while holding the lock and executes it after releasing it:
//!
//! 1. exit, if requested
//! 2. run one queued event
//! 3. tear down the EGL surface and/or context, if armed
//! 4. if a native window is available, the thread is not paused and a frame was requested:
//!    set up EGL, recreate the surface, forward a resize or draw a frame
//! 5. otherwise wait
//!
//! All other threads only change the shared flags.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error, info, info_span, trace, warn};

use crate::backend::egl::{ConfigRequirements, EGLHolder, EGLState, Error, NativeWindow, SurfaceCreationError};
use crate::backend::SwapBuffersError;
use crate::renderer::{RenderEvent, SurfaceRenderer};
use crate::utils::lock;

/// Default name of render threads
pub const DEFAULT_THREAD_NAME: &str = "map-render";

/// Options of a [`RenderThread`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderThreadOptions {
    /// Name of the spawned thread
    pub thread_name: String,
    /// Requirements for the framebuffer config
    pub config: ConfigRequirements,
}

impl Default for RenderThreadOptions {
    fn default() -> Self {
        RenderThreadOptions {
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            config: ConfigRequirements::default(),
        }
    }
}

/// Native window the hosting view handed us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// No window, nothing can be drawn
    Absent,
    /// A window of the given size
    Available {
        /// The window
        window: NativeWindow,
        /// Width in pixels
        width: i32,
        /// Height in pixels
        height: i32,
    },
}

/// Pending EGL teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Nothing to tear down
    None,
    /// Destroy the window surface
    Surface,
    /// Destroy the context
    Context,
    /// Destroy the window surface, then the context
    SurfaceAndContext,
}

impl Teardown {
    fn with_surface(self) -> Teardown {
        match self {
            Teardown::None | Teardown::Surface => Teardown::Surface,
            Teardown::Context | Teardown::SurfaceAndContext => Teardown::SurfaceAndContext,
        }
    }

    fn with_context(self) -> Teardown {
        match self {
            Teardown::None | Teardown::Context => Teardown::Context,
            Teardown::Surface | Teardown::SurfaceAndContext => Teardown::SurfaceAndContext,
        }
    }
}

/// Shutdown progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Running normally
    Running,
    /// Exit was requested, the thread did not acknowledge yet
    ShouldExit,
    /// The thread cleaned up and is gone
    Exited,
}

/// Observable state of a [`RenderThread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderThreadState {
    /// Waiting for a native window
    NoSurface,
    /// A native window is available, EGL is not set up yet
    SurfaceReadyNoContext,
    /// A context exists but no window surface
    SurfaceReadyNoEGLSurface,
    /// Frames can be drawn
    Rendering,
    /// Paused by the hosting view
    Paused,
    /// Exit was requested
    Exiting,
    /// The thread is gone
    Exited,
}

/// What one loop iteration does
pub(crate) enum Step {
    Exit,
    RunEvent(RenderEvent),
    DestroySurface,
    DestroyContext,
    InitializeEgl {
        window: NativeWindow,
        width: i32,
        height: i32,
    },
    RecreateSurface {
        window: NativeWindow,
        width: i32,
        height: i32,
    },
    Resize {
        width: i32,
        height: i32,
    },
    Draw {
        window: NativeWindow,
    },
    Wait,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Exit => f.write_str("Exit"),
            Step::RunEvent(_) => f.write_str("RunEvent"),
            Step::DestroySurface => f.write_str("DestroySurface"),
            Step::DestroyContext => f.write_str("DestroyContext"),
            Step::InitializeEgl { window, width, height } => f
                .debug_struct("InitializeEgl")
                .field("window", window)
                .field("width", width)
                .field("height", height)
                .finish(),
            Step::RecreateSurface { window, width, height } => f
                .debug_struct("RecreateSurface")
                .field("window", window)
                .field("width", width)
                .field("height", height)
                .finish(),
            Step::Resize { width, height } => f
                .debug_struct("Resize")
                .field("width", width)
                .field("height", height)
                .finish(),
            Step::Draw { window } => f.debug_struct("Draw").field("window", window).finish(),
            Step::Wait => f.write_str("Wait"),
        }
    }
}

/// State shared between the render thread and everybody else
pub(crate) struct Shared {
    surface: SurfaceState,
    paused: bool,
    request_render: bool,
    size_changed: bool,
    teardown: Teardown,
    exit: ExitState,
    events: VecDeque<RenderEvent>,
    egl: EGLState,
    error: Option<Error>,
}

impl Default for Shared {
    fn default() -> Self {
        Shared {
            surface: SurfaceState::Absent,
            paused: false,
            request_render: false,
            size_changed: false,
            teardown: Teardown::None,
            exit: ExitState::Running,
            events: VecDeque::new(),
            egl: EGLState::NoContext,
            error: None,
        }
    }
}

impl Shared {
    /// Decides the next step given the EGL objects the render thread holds
    pub(crate) fn next_step(&mut self, egl: EGLState) -> Step {
        if self.exit != ExitState::Running {
            return Step::Exit;
        }

        if let Some(event) = self.events.pop_front() {
            return Step::RunEvent(event);
        }

        match self.teardown {
            Teardown::None => {}
            Teardown::Surface => {
                self.teardown = Teardown::None;
                return Step::DestroySurface;
            }
            Teardown::SurfaceAndContext => {
                self.teardown = Teardown::Context;
                return Step::DestroySurface;
            }
            Teardown::Context => {
                self.teardown = Teardown::None;
                return Step::DestroyContext;
            }
        }

        let SurfaceState::Available { window, width, height } = self.surface else {
            return Step::Wait;
        };
        if self.paused || !self.request_render {
            return Step::Wait;
        }

        match egl {
            EGLState::NoContext => {
                self.size_changed = false;
                Step::InitializeEgl { window, width, height }
            }
            EGLState::NoSurface => {
                self.size_changed = false;
                Step::RecreateSurface { window, width, height }
            }
            // the frame stays requested, it is drawn with the new size next
            EGLState::Ready if self.size_changed => {
                self.size_changed = false;
                Step::Resize { width, height }
            }
            EGLState::Ready => {
                // catch requests arriving while we draw
                self.request_render = false;
                Step::Draw { window }
            }
        }
    }

    /// Forgets `window` unless it was replaced meanwhile and arms `teardown`
    fn drop_window(&mut self, window: NativeWindow, teardown: Teardown) {
        if matches!(self.surface, SurfaceState::Available { window: current, .. } if current == window) {
            self.surface = SurfaceState::Absent;
        }
        self.teardown = match teardown {
            Teardown::None => self.teardown,
            Teardown::Surface => self.teardown.with_surface(),
            Teardown::Context => self.teardown.with_context(),
            Teardown::SurfaceAndContext => self.teardown.with_surface().with_context(),
        };
    }

    fn state(&self) -> RenderThreadState {
        match self.exit {
            ExitState::Exited => return RenderThreadState::Exited,
            ExitState::ShouldExit => return RenderThreadState::Exiting,
            ExitState::Running => {}
        }
        if self.paused {
            return RenderThreadState::Paused;
        }
        match (self.surface, self.egl) {
            (SurfaceState::Absent, _) => RenderThreadState::NoSurface,
            (_, EGLState::NoContext) => RenderThreadState::SurfaceReadyNoContext,
            (_, EGLState::NoSurface) => RenderThreadState::SurfaceReadyNoEGLSurface,
            (_, EGLState::Ready) => RenderThreadState::Rendering,
        }
    }
}

#[derive(Default)]
struct Inner {
    shared: Mutex<Shared>,
    wake: Condvar,
}

impl Inner {
    /// Mutates the shared state and wakes everybody waiting on it
    fn update<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        let mut shared = lock(&self.shared);
        let result = f(&mut shared);
        self.wake.notify_all();
        result
    }
}

/// A dedicated thread owning one [`EGLHolder`] and drawing with a [`SurfaceRenderer`]
pub struct RenderThread {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl fmt::Debug for RenderThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderThread")
            .field("thread_id", &self.thread_id)
            .field("state", &self.state())
            .finish()
    }
}

impl RenderThread {
    /// Starts the thread. It waits for a native window before touching EGL.
    pub fn spawn(
        holder: EGLHolder,
        renderer: Arc<dyn SurfaceRenderer>,
        options: &RenderThreadOptions,
    ) -> io::Result<RenderThread> {
        let inner = Arc::new(Inner::default());

        let render_loop = RenderLoop {
            inner: inner.clone(),
            holder,
            renderer,
            announced: false,
        };
        let handle = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || render_loop.run())?;
        debug!(name = %options.thread_name, "Render thread spawned");

        Ok(RenderThread {
            inner,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// A native window of the given size became available
    pub fn on_surface_texture_available(&self, window: NativeWindow, width: i32, height: i32) {
        self.inner.update(|shared| {
            if let SurfaceState::Available { window: previous, .. } = shared.surface {
                if previous != window {
                    shared.teardown = shared.teardown.with_surface();
                }
            }
            shared.surface = SurfaceState::Available { window, width, height };
            shared.request_render = true;
        });
    }

    /// The native window was resized
    pub fn on_surface_texture_size_changed(&self, width: i32, height: i32) {
        self.inner.update(|shared| {
            if let SurfaceState::Available { window, .. } = shared.surface {
                shared.surface = SurfaceState::Available { window, width, height };
            }
            shared.size_changed = true;
            shared.request_render = true;
        });
    }

    /// The native window is going away.
    ///
    /// Always returns `true`: the hosting view may release the window right away, the EGL
    /// surface is torn down on the render thread.
    pub fn on_surface_texture_destroyed(&self) -> bool {
        self.inner.update(|shared| {
            shared.surface = SurfaceState::Absent;
            shared.teardown = shared.teardown.with_surface();
            shared.request_render = false;
        });
        true
    }

    /// A frame was composited. Ignored.
    pub fn on_surface_texture_updated(&self) {}

    /// Requests a frame to be drawn
    pub fn request_render(&self) {
        self.inner.update(|shared| shared.request_render = true);
    }

    /// Runs `event` on the render thread before the next frame
    pub fn queue_event(&self, event: RenderEvent) {
        self.inner.update(|shared| {
            if shared.exit == ExitState::Running {
                shared.events.push_back(event);
            } else {
                warn!("Render thread is exiting, dropping queued event");
            }
        });
    }

    /// Stops drawing until [`RenderThread::on_resume`]. Queued events still run.
    pub fn on_pause(&self) {
        self.inner.update(|shared| shared.paused = true);
    }

    /// Resumes drawing
    pub fn on_resume(&self) {
        self.inner.update(|shared| shared.paused = false);
    }

    /// Whether the thread is paused
    pub fn is_paused(&self) -> bool {
        lock(&self.inner.shared).paused
    }

    /// Stops the thread and waits until it cleaned up. Calling it again returns right away.
    ///
    /// There is no timeout, a hanging frame blocks the caller. From the render thread itself
    /// the exit is only requested.
    pub fn on_destroy(&self) {
        if thread::current().id() == self.thread_id {
            error!("on_destroy called from the render thread, not waiting for it to exit");
            self.request_exit();
            return;
        }

        let mut shared = lock(&self.inner.shared);
        if shared.exit == ExitState::Running {
            shared.exit = ExitState::ShouldExit;
        }
        self.inner.wake.notify_all();
        while shared.exit != ExitState::Exited {
            shared = self
                .inner
                .wake
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(shared);

        if let Some(handle) = lock(&self.handle).take() {
            if handle.join().is_err() {
                warn!("Render thread panicked");
            }
        }
    }

    fn request_exit(&self) {
        self.inner.update(|shared| {
            if shared.exit == ExitState::Running {
                shared.exit = ExitState::ShouldExit;
            }
        });
    }

    /// The current state
    pub fn state(&self) -> RenderThreadState {
        lock(&self.inner.shared).state()
    }

    /// Whether the thread cleaned up and is gone
    pub fn is_exited(&self) -> bool {
        lock(&self.inner.shared).exit == ExitState::Exited
    }

    /// The error that stopped the thread, if EGL could not be set up
    pub fn take_error(&self) -> Option<Error> {
        lock(&self.inner.shared).error.take()
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.on_destroy();
    }
}

/// State owned by the render thread
struct RenderLoop {
    inner: Arc<Inner>,
    holder: EGLHolder,
    renderer: Arc<dyn SurfaceRenderer>,
    /// The renderer was told about the current context
    announced: bool,
}

impl RenderLoop {
    fn run(self) {
        let span = info_span!("render_thread");
        let _guard = span.enter();
        info!("Render thread started");

        // releases `on_destroy` callers, even if the loop or its cleanup panics
        let inner = self.inner.clone();
        let _exited = scopeguard::guard((), move |()| {
            inner.update(|shared| {
                shared.exit = ExitState::Exited;
                shared.events.clear();
            });
            info!("Render thread exited");
        });
        let mut this = scopeguard::guard(self, RenderLoop::exit);

        loop {
            let step = this.next_step();
            trace!(?step, "Render thread step");
            match step {
                Step::Exit => break,
                Step::Wait => continue,
                Step::RunEvent(event) => event(),
                Step::DestroySurface => {
                    debug!("Destroying EGL surface");
                    this.holder.destroy_surface();
                }
                Step::DestroyContext => {
                    debug!("Destroying EGL context");
                    this.destroy_context();
                }
                Step::InitializeEgl { window, width, height } => {
                    if let Err(err) = this.holder.prepare() {
                        error!(?err, "Unable to set up EGL, stopping the render thread");
                        this.inner.update(|shared| shared.error = Some(err));
                        break;
                    }
                    this.create_surface(window, width, height);
                }
                Step::RecreateSurface { window, width, height } => {
                    this.create_surface(window, width, height);
                }
                Step::Resize { width, height } => {
                    this.renderer.on_surface_changed(this.holder.gl(), width, height);
                }
                Step::Draw { window } => this.draw(window),
            }
        }
    }

    fn next_step(&self) -> Step {
        let egl = self.holder.state();
        let mut shared = lock(&self.inner.shared);
        shared.egl = egl;
        loop {
            match shared.next_step(egl) {
                Step::Wait => {
                    shared = self
                        .inner
                        .wake
                        .wait(shared)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                step => return step,
            }
        }
    }

    fn create_surface(&mut self, window: NativeWindow, width: i32, height: i32) {
        match self.holder.create_surface(Some(window)) {
            Ok(()) => {}
            Err(SurfaceCreationError::MakeCurrent(err)) => {
                self.lost(window, SwapBuffersError::from(err));
                return;
            }
            Err(err) => {
                warn!(?err, "Unable to create a surface, waiting for a new one");
                self.inner
                    .update(|shared| shared.drop_window(window, Teardown::Surface));
                return;
            }
        }

        if !self.announced {
            if let Some(config) = self.holder.config().copied() {
                self.renderer.on_surface_created(self.holder.gl(), &config);
            }
            self.announced = true;
        }
        self.renderer.on_surface_changed(self.holder.gl(), width, height);
    }

    /// Forgets `window` and arms the teardown `err` calls for
    fn lost(&self, window: NativeWindow, err: SwapBuffersError) {
        let teardown = match err {
            SwapBuffersError::ContextLost(_) => {
                warn!(?err, "Context lost. Waiting for re-acquire");
                Teardown::SurfaceAndContext
            }
            SwapBuffersError::TemporaryFailure(_) => {
                warn!(?err, "Surface unusable. Waiting for a new one");
                Teardown::Surface
            }
        };
        self.inner.update(|shared| shared.drop_window(window, teardown));
    }

    #[profiling::function]
    fn draw(&mut self, window: NativeWindow) {
        self.renderer.on_draw_frame(self.holder.gl());

        if let Err(err) = self.holder.swap() {
            self.lost(window, err);
        }
    }

    fn destroy_context(&mut self) {
        if self.announced {
            self.announced = false;
            let renderer = &self.renderer;
            if panic::catch_unwind(AssertUnwindSafe(|| renderer.on_surface_destroyed())).is_err() {
                error!("Renderer panicked while releasing its GL state");
            }
        }
        self.holder.destroy_context();
    }

    fn exit(mut self) {
        if thread::panicking() {
            error!("Render thread panicked, cleaning up");
            self.announced = false;
        }
        self.holder.destroy_surface();
        self.destroy_context();
        self.holder.cleanup();

        let egl = self.holder.state();
        self.inner.update(|shared| shared.egl = egl);
    }
}
