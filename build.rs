#[cfg(feature = "backend_egl")]
fn egl_generate() {
    use gl_generator::{Api, Fallbacks, Profile, Registry};
    use std::{env, fs::File, path::PathBuf};

    let dest = PathBuf::from(&env::var("OUT_DIR").unwrap());

    let mut file = File::create(dest.join("egl_bindings.rs")).unwrap();
    Registry::new(
        Api::Egl,
        (1, 5),
        Profile::Core,
        Fallbacks::All,
        ["EGL_KHR_create_context"],
    )
    .write_bindings(gl_generator::GlobalGenerator, &mut file)
    .unwrap();
}

fn main() {
    #[cfg(feature = "backend_egl")]
    egl_generate();
}
