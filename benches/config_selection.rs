use criterion::{black_box, criterion_group, criterion_main, Criterion};
use map_renderer::backend::egl::test::{DummyConfig, DummyEGL};
use map_renderer::backend::egl::{attrib, ConfigRequirements, EGLApi, EGLConfigChooser};

/// A driver-like mix of usable and unusable configs
fn configs(count: usize) -> Vec<DummyConfig> {
    (0..count)
        .map(|i| {
            let depth = if i % 3 == 0 { 16 } else { 24 };
            let config = match i % 5 {
                0 => DummyConfig::rgb565(depth),
                1 => DummyConfig::rgbx8888(depth),
                2 => DummyConfig::rgba8888(depth),
                3 => DummyConfig::rgb888(depth).with_samples(1, 4),
                _ => DummyConfig::rgb888(depth),
            };
            if i % 7 == 0 {
                config.with_caveat(attrib::SLOW_CONFIG)
            } else {
                config
            }
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let chooser = EGLConfigChooser::new(ConfigRequirements {
        translucent_surface: false,
        emulator: Some(false),
    });

    for count in [8, 64, 256] {
        let egl = DummyEGL::with_configs(configs(count));
        let display = egl.get_display().expect("dummy display");
        egl.initialize(display).expect("dummy initialize");

        c.bench_function(&format!("choose_config {}", count), |b| {
            b.iter(|| chooser.choose_config(black_box(&egl), display))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
