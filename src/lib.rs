#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
// Allow acronyms like EGL
#![allow(clippy::upper_case_acronyms)]

//! # map-renderer: the render thread behind an embedded map view
//!
//! This crate owns the part of a map view that talks to the GPU: it selects an EGL framebuffer
//! configuration, creates and recreates the EGL display/context/surface triple, and drives a native
//! map engine's render calls from exactly one thread per surface.
//!
//! ## Structure of the crate
//!
//! - [`backend`] contains the EGL plumbing: raw bindings, the [`EGLApi`](backend::egl::EGLApi)
//!   driver seam, config selection and the [`EGLHolder`](backend::egl::EGLHolder) that owns the
//!   handles of one render thread.
//! - [`renderer`] contains the [`MapRenderer`](renderer::MapRenderer) frontend scheduler and its two
//!   hosting adapters: [`TextureViewMapRenderer`](renderer::texture_view::TextureViewMapRenderer),
//!   which owns a private render thread, and
//!   [`GLSurfaceViewMapRenderer`](renderer::gl_surface_view::GLSurfaceViewMapRenderer), which lets
//!   the platform widget own it.
//! - [`utils`] contains small platform helpers.
//!
//! ## Threading
//!
//! All EGL calls and all calls into the native engine happen on the render thread. Other threads
//! only flip flags and enqueue work through [`RenderFrontend`](renderer::RenderFrontend). Queued work
//! runs in submission order and always before the next frame.
//!
//! ### Logging
//!
//! This crate makes extensive use of [`tracing`] for its internal logging.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```

pub mod backend;
pub mod renderer;
pub mod utils;
