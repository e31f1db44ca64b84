//! [`EGLApi`] implementation on top of the system EGL library

use std::mem::MaybeUninit;
use std::ptr;

use tracing::{debug, info, warn};

use super::{
    attrib, ffi, wrap_egl_call, EGLApi, EGLConfigRaw, EGLContextRaw, EGLDisplayRaw, EGLError, EGLSurfaceRaw,
    EGLint, Error, Gl, NativeWindow,
};

type ViewportFn = extern "system" fn(i32, i32, i32, i32);

/// GL function table resolved from the system GLES library
#[derive(Debug, Default)]
struct SystemGl {
    viewport: Option<ViewportFn>,
}

impl Gl for SystemGl {
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        match self.viewport {
            Some(viewport) => viewport(x, y, width, height),
            None => warn!("glViewport is not available, ignoring viewport change"),
        }
    }
}

/// The system `libEGL`, loaded once per process.
#[derive(Debug)]
pub struct SystemEGL {
    gl: SystemGl,
}

impl SystemEGL {
    /// Loads `libEGL` and resolves the GL functions needed by the render loop.
    pub fn new() -> Result<SystemEGL, Error> {
        ffi::make_sure_egl_is_loaded()?;

        let symbol = ffi::gl_proc_address("glViewport");
        let viewport = if symbol.is_null() {
            warn!("Unable to resolve glViewport");
            None
        } else {
            // SAFETY: glViewport has this signature on every GLES implementation
            Some(unsafe { std::mem::transmute::<*const std::os::raw::c_void, ViewportFn>(symbol) })
        };
        debug!("EGL library loaded");

        Ok(SystemEGL {
            gl: SystemGl { viewport },
        })
    }
}

impl EGLApi for SystemEGL {
    fn get_display(&self) -> Option<EGLDisplayRaw> {
        let display = unsafe { ffi::egl::GetDisplay(ffi::egl::DEFAULT_DISPLAY) };
        if display == ffi::egl::NO_DISPLAY {
            None
        } else {
            Some(EGLDisplayRaw::from_ptr(display))
        }
    }

    fn initialize(&self, display: EGLDisplayRaw) -> Result<(EGLint, EGLint), EGLError> {
        let mut major: MaybeUninit<ffi::egl::types::EGLint> = MaybeUninit::uninit();
        let mut minor: MaybeUninit<ffi::egl::types::EGLint> = MaybeUninit::uninit();

        wrap_egl_call(|| unsafe { ffi::egl::Initialize(display.as_ptr(), major.as_mut_ptr(), minor.as_mut_ptr()) })?;

        let major = unsafe { major.assume_init() };
        let minor = unsafe { minor.assume_init() };
        info!("EGL Version: {:?}", (major, minor));

        Ok((major, minor))
    }

    fn bind_api(&self) -> Result<(), EGLError> {
        wrap_egl_call(|| unsafe { ffi::egl::BindAPI(ffi::egl::OPENGL_ES_API) }).map(|_| ())
    }

    fn choose_config_count(&self, display: EGLDisplayRaw, attribs: &[EGLint]) -> Result<EGLint, EGLError> {
        let mut num_configs = 0;
        wrap_egl_call(|| unsafe {
            ffi::egl::ChooseConfig(
                display.as_ptr(),
                attribs.as_ptr(),
                ptr::null_mut(),
                0,
                &mut num_configs,
            )
        })?;
        Ok(num_configs)
    }

    fn choose_configs(
        &self,
        display: EGLDisplayRaw,
        attribs: &[EGLint],
        max: EGLint,
    ) -> Result<Vec<EGLConfigRaw>, EGLError> {
        let mut num_configs = max;
        let mut config_ids: Vec<ffi::egl::types::EGLConfig> = Vec::with_capacity(max.max(0) as usize);
        wrap_egl_call(|| unsafe {
            ffi::egl::ChooseConfig(
                display.as_ptr(),
                attribs.as_ptr(),
                config_ids.as_mut_ptr(),
                max,
                &mut num_configs,
            )
        })?;
        unsafe {
            config_ids.set_len(num_configs.clamp(0, max) as usize);
        }

        Ok(config_ids.into_iter().map(EGLConfigRaw::from_ptr).collect())
    }

    fn get_config_attrib(
        &self,
        display: EGLDisplayRaw,
        config: EGLConfigRaw,
        attribute: EGLint,
    ) -> Result<EGLint, EGLError> {
        let mut value = 0;
        wrap_egl_call(|| unsafe {
            ffi::egl::GetConfigAttrib(display.as_ptr(), config.as_ptr(), attribute, &mut value)
        })?;
        Ok(value)
    }

    fn create_context(
        &self,
        display: EGLDisplayRaw,
        config: EGLConfigRaw,
        attribs: &[EGLint],
    ) -> Result<EGLContextRaw, EGLError> {
        let context = wrap_egl_call(|| unsafe {
            ffi::egl::CreateContext(
                display.as_ptr(),
                config.as_ptr(),
                ffi::egl::NO_CONTEXT,
                attribs.as_ptr(),
            )
        })?;
        if context == ffi::egl::NO_CONTEXT {
            return Err(EGLError::BadContext);
        }
        Ok(EGLContextRaw::from_ptr(context))
    }

    fn create_window_surface(
        &self,
        display: EGLDisplayRaw,
        config: EGLConfigRaw,
        window: NativeWindow,
        attribs: &[EGLint],
    ) -> Result<EGLSurfaceRaw, EGLError> {
        let surface = wrap_egl_call(|| unsafe {
            ffi::egl::CreateWindowSurface(display.as_ptr(), config.as_ptr(), window.as_ptr(), attribs.as_ptr())
        })?;
        if surface == ffi::egl::NO_SURFACE {
            return Err(EGLError::BadSurface);
        }
        Ok(EGLSurfaceRaw::from_ptr(surface))
    }

    fn make_current(
        &self,
        display: EGLDisplayRaw,
        surface: Option<EGLSurfaceRaw>,
        context: Option<EGLContextRaw>,
    ) -> Result<(), EGLError> {
        let surface = surface.map_or(ffi::egl::NO_SURFACE, EGLSurfaceRaw::as_ptr);
        let context = context.map_or(ffi::egl::NO_CONTEXT, EGLContextRaw::as_ptr);
        wrap_egl_call(|| unsafe { ffi::egl::MakeCurrent(display.as_ptr(), surface, surface, context) })
            .map(|_| ())
    }

    fn swap_buffers(&self, display: EGLDisplayRaw, surface: EGLSurfaceRaw) -> Result<(), EGLError> {
        wrap_egl_call(|| unsafe { ffi::egl::SwapBuffers(display.as_ptr(), surface.as_ptr()) }).map(|_| ())
    }

    fn destroy_surface(&self, display: EGLDisplayRaw, surface: EGLSurfaceRaw) -> Result<(), EGLError> {
        wrap_egl_call(|| unsafe { ffi::egl::DestroySurface(display.as_ptr(), surface.as_ptr()) }).map(|_| ())
    }

    fn destroy_context(&self, display: EGLDisplayRaw, context: EGLContextRaw) -> Result<(), EGLError> {
        wrap_egl_call(|| unsafe { ffi::egl::DestroyContext(display.as_ptr(), context.as_ptr()) }).map(|_| ())
    }

    fn terminate(&self, display: EGLDisplayRaw) -> Result<(), EGLError> {
        wrap_egl_call(|| unsafe { ffi::egl::Terminate(display.as_ptr()) }).map(|_| ())
    }

    fn gl(&self) -> &dyn Gl {
        &self.gl
    }
}

// attribute values are shared with the generated bindings, keep them in sync
const _: () = {
    assert!(attrib::NONE == ffi::egl::NONE as EGLint);
    assert!(attrib::CONFORMANT == ffi::egl::CONFORMANT as EGLint);
    assert!(attrib::CONTEXT_CLIENT_VERSION == ffi::egl::CONTEXT_CLIENT_VERSION as EGLint);
};
