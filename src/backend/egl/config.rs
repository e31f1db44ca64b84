//! Framebuffer configuration selection
//!
//! [`EGLConfigChooser`] queries every config supporting at least RGB565 with a 16 bit depth and
//! 8 bit stencil buffer, drops everything the map engine cannot use and ranks the rest. The best
//! match is deterministic for a given driver: ties are broken by the enumeration order.

use std::cmp::Ordering;

use tracing::{debug, error, info, instrument, warn};

use super::{attrib, EGLApi, EGLConfigRaw, EGLDisplayRaw, EGLint, Error};
use crate::utils::device::DeviceProfile;

/// Requirements for the surface the chosen config will be used with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigRequirements {
    /// The surface needs an alpha channel so the map can be composited over other content
    pub translucent_surface: bool,
    /// Whether we run on an emulated GPU.
    ///
    /// `None` detects this through [`DeviceProfile::detect`] at selection time.
    pub emulator: Option<bool>,
}

/// Color buffer layout of a config, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferFormat {
    /// RGB888 without alpha, in a 24 bit buffer
    Format24Bit,
    /// RGBA8888
    Format32BitAlpha,
    /// RGB888 padded to 32 bits
    Format32BitNoAlpha,
    /// RGB565
    Format16Bit,
    /// Anything else, never chosen
    Unknown,
}

impl BufferFormat {
    fn classify(bits: EGLint, red: EGLint, green: EGLint, blue: EGLint, alpha: EGLint) -> BufferFormat {
        match (bits, red, green, blue, alpha) {
            (16, 5, 6, 5, 0) => BufferFormat::Format16Bit,
            (32, 8, 8, 8, 0) => BufferFormat::Format32BitNoAlpha,
            (32, 8, 8, 8, 8) => BufferFormat::Format32BitAlpha,
            (24, 8, 8, 8, 0) => BufferFormat::Format24Bit,
            _ => BufferFormat::Unknown,
        }
    }
}

/// Depth/stencil layout of a config, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DepthStencilFormat {
    /// 24 bit depth, 8 bit stencil
    Format24Depth8Stencil,
    /// 16 bit depth, 8 bit stencil
    Format16Depth8Stencil,
}

/// Decoded attributes of a config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Size of the color buffer in bits
    pub buffer_bits: u8,
    /// Red, green and blue bits
    pub color_bits: (u8, u8, u8),
    /// Alpha bits
    pub alpha_bits: u8,
    /// Depth bits
    pub depth_bits: u8,
    /// Stencil bits
    pub stencil_bits: u8,
    /// Classified color buffer layout
    pub buffer_format: BufferFormat,
    /// Classified depth/stencil layout
    pub depth_stencil_format: DepthStencilFormat,
    /// The config does not claim OpenGL ES 2 conformance
    pub not_conformant: bool,
    /// The config has a caveat (slow or non-conformant)
    pub caveat: bool,
}

/// A selected config together with what we know about it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChosenConfig {
    /// The config handle to create contexts and surfaces with
    pub config: EGLConfigRaw,
    /// Its decoded attributes
    pub pixel_format: PixelFormat,
}

/// Attributes read from the driver for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigAttributes {
    caveat: EGLint,
    conformant: EGLint,
    bits: EGLint,
    red: EGLint,
    green: EGLint,
    blue: EGLint,
    alpha: EGLint,
    depth: EGLint,
    stencil: EGLint,
    sample_buffers: EGLint,
    samples: EGLint,
}

impl ConfigAttributes {
    fn query(api: &dyn EGLApi, display: EGLDisplayRaw, config: EGLConfigRaw) -> Result<Self, Error> {
        let get = |attribute: EGLint| {
            api.get_config_attrib(display, config, attribute).map_err(|source| {
                error!(attribute, ?source, "eglGetConfigAttrib() failed");
                Error::ConfigAttribute { attribute, source }
            })
        };

        Ok(ConfigAttributes {
            caveat: get(attrib::CONFIG_CAVEAT)?,
            conformant: get(attrib::CONFORMANT)?,
            bits: get(attrib::BUFFER_SIZE)?,
            red: get(attrib::RED_SIZE)?,
            green: get(attrib::GREEN_SIZE)?,
            blue: get(attrib::BLUE_SIZE)?,
            alpha: get(attrib::ALPHA_SIZE)?,
            depth: get(attrib::DEPTH_SIZE)?,
            stencil: get(attrib::STENCIL_SIZE)?,
            sample_buffers: get(attrib::SAMPLE_BUFFERS)?,
            samples: get(attrib::SAMPLES)?,
        })
    }

    /// Depth, stencil and anti-aliasing filter
    fn usable(&self) -> bool {
        (self.depth == 24 || self.depth == 16)
            && self.stencil == 8
            && self.sample_buffers == 0
            && self.samples == 0
    }

    fn pixel_format(&self) -> PixelFormat {
        let depth_stencil_format = if self.depth == 16 && self.stencil == 8 {
            DepthStencilFormat::Format16Depth8Stencil
        } else {
            DepthStencilFormat::Format24Depth8Stencil
        };

        PixelFormat {
            buffer_bits: saturate(self.bits),
            color_bits: (saturate(self.red), saturate(self.green), saturate(self.blue)),
            alpha_bits: saturate(self.alpha),
            depth_bits: saturate(self.depth),
            stencil_bits: saturate(self.stencil),
            buffer_format: BufferFormat::classify(self.bits, self.red, self.green, self.blue, self.alpha),
            depth_stencil_format,
            not_conformant: (self.conformant & attrib::OPENGL_ES2_BIT) != attrib::OPENGL_ES2_BIT,
            caveat: self.caveat != attrib::NONE,
        }
    }
}

/// Clamps a driver reported bit count into `0..=255`
fn saturate(bits: EGLint) -> u8 {
    u8::try_from(bits.max(0)).unwrap_or(u8::MAX)
}

/// A config that survived filtering, ordered by quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    pixel_format: PixelFormat,
    index: usize,
    config: EGLConfigRaw,
}

impl Candidate {
    fn rank(&self) -> (BufferFormat, DepthStencilFormat, bool, bool, usize) {
        (
            self.pixel_format.buffer_format,
            self.pixel_format.depth_stencil_format,
            self.pixel_format.not_conformant,
            self.pixel_format.caveat,
            self.index,
        )
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Selects the framebuffer config used by the map engine
#[derive(Debug, Clone, Copy, Default)]
pub struct EGLConfigChooser {
    requirements: ConfigRequirements,
}

impl EGLConfigChooser {
    /// Create a chooser for the given surface requirements
    pub fn new(requirements: ConfigRequirements) -> EGLConfigChooser {
        EGLConfigChooser { requirements }
    }

    /// The requirements this chooser selects for
    pub fn requirements(&self) -> ConfigRequirements {
        self.requirements
    }

    /// Attribute list passed to `eglChooseConfig`.
    ///
    /// Asks for everything with at least RGB565, 16 bit depth and 8 bit stencil. On emulated GPUs
    /// the conformance and color buffer type are left unspecified, software implementations
    /// frequently misreport them.
    pub fn config_attributes(&self, emulator: bool) -> Vec<EGLint> {
        let mut out: Vec<EGLint> = Vec::with_capacity(25);

        out.extend_from_slice(&[attrib::CONFIG_CAVEAT, attrib::NONE]);
        out.extend_from_slice(&[attrib::SURFACE_TYPE, attrib::WINDOW_BIT]);
        out.extend_from_slice(&[attrib::BUFFER_SIZE, 16]);
        out.extend_from_slice(&[attrib::RED_SIZE, 5]);
        out.extend_from_slice(&[attrib::GREEN_SIZE, 6]);
        out.extend_from_slice(&[attrib::BLUE_SIZE, 5]);
        let alpha = if self.requirements.translucent_surface { 8 } else { 0 };
        out.extend_from_slice(&[attrib::ALPHA_SIZE, alpha]);
        out.extend_from_slice(&[attrib::DEPTH_SIZE, 16]);
        out.extend_from_slice(&[attrib::STENCIL_SIZE, 8]);
        if !emulator {
            out.extend_from_slice(&[attrib::CONFORMANT, attrib::OPENGL_ES2_BIT]);
            out.extend_from_slice(&[attrib::COLOR_BUFFER_TYPE, attrib::RGB_BUFFER]);
        }
        out.extend_from_slice(&[attrib::RENDERABLE_TYPE, attrib::OPENGL_ES2_BIT]);
        out.push(attrib::NONE);

        out
    }

    /// Finds the best config for rendering the map on `display`.
    ///
    /// Fails if the driver reports no config at all or if none of them has a usable
    /// depth/stencil/color layout. Both are fatal: nothing can be rendered without a config.
    #[instrument(level = "debug", skip(self, api, display))]
    pub fn choose_config(&self, api: &dyn EGLApi, display: EGLDisplayRaw) -> Result<ChosenConfig, Error> {
        let emulator = self
            .requirements
            .emulator
            .unwrap_or_else(|| DeviceProfile::detect().is_emulator());
        info!("In emulator: {}", emulator);
        let attributes = self.config_attributes(emulator);

        let num_configs = api
            .choose_config_count(display, &attributes)
            .map_err(|err| {
                error!(?err, "eglChooseConfig(NULL) failed");
                Error::ConfigFailed(err)
            })?;
        if num_configs < 1 {
            error!("eglChooseConfig() returned no configs.");
            return Err(Error::NoAvailableConfig);
        }

        let configs = api
            .choose_configs(display, &attributes, num_configs)
            .map_err(|err| {
                error!(?err, "eglChooseConfig() failed");
                Error::ConfigFailed(err)
            })?;
        debug!("{} candidate configs", configs.len());

        let mut candidates = Vec::with_capacity(configs.len());
        for (i, config) in configs.into_iter().enumerate() {
            let attributes = ConfigAttributes::query(api, display, config)?;
            if !attributes.usable() {
                continue;
            }
            let pixel_format = attributes.pixel_format();
            // ignore formats we don't recognise
            if pixel_format.buffer_format == BufferFormat::Unknown {
                continue;
            }
            candidates.push(Candidate {
                pixel_format,
                index: i + 1,
                config,
            });
        }

        let best = candidates
            .into_iter()
            .min()
            .ok_or(Error::NoMatchingConfig)?;

        if best.pixel_format.caveat {
            warn!("Chosen config has a caveat.");
        }
        if best.pixel_format.not_conformant {
            warn!("Chosen config is not conformant.");
        }
        info!("Selected color format: {:?}", best.pixel_format);

        Ok(ChosenConfig {
            config: best.config,
            pixel_format: best.pixel_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::egl::test::{DummyConfig, DummyEGL};

    fn chooser() -> EGLConfigChooser {
        EGLConfigChooser::new(ConfigRequirements {
            translucent_surface: false,
            emulator: Some(false),
        })
    }

    fn choose(configs: Vec<DummyConfig>) -> Result<ChosenConfig, Error> {
        let egl = DummyEGL::with_configs(configs);
        let display = egl.get_display().unwrap();
        egl.initialize(display).unwrap();
        chooser().choose_config(&egl, display)
    }

    #[test]
    fn prefers_24_bit_over_other_color_formats() {
        let chosen = choose(vec![
            DummyConfig::rgb565(24),
            DummyConfig::rgbx8888(24),
            DummyConfig::rgba8888(24),
            DummyConfig::rgb888(24),
        ])
        .unwrap();
        assert_eq!(chosen.config, EGLConfigRaw::from_raw(DummyConfig::handle_for(3)));
        assert_eq!(chosen.pixel_format.buffer_format, BufferFormat::Format24Bit);
    }

    #[test]
    fn color_format_order() {
        let chosen = choose(vec![
            DummyConfig::rgb565(24),
            DummyConfig::rgbx8888(24),
            DummyConfig::rgba8888(24),
        ])
        .unwrap();
        assert_eq!(chosen.pixel_format.buffer_format, BufferFormat::Format32BitAlpha);

        let chosen = choose(vec![DummyConfig::rgb565(24), DummyConfig::rgbx8888(24)]).unwrap();
        assert_eq!(chosen.pixel_format.buffer_format, BufferFormat::Format32BitNoAlpha);
    }

    #[test]
    fn prefers_deeper_depth_buffer() {
        let chosen = choose(vec![DummyConfig::rgb888(16), DummyConfig::rgb888(24)]).unwrap();
        assert_eq!(chosen.config, EGLConfigRaw::from_raw(DummyConfig::handle_for(1)));
        assert_eq!(
            chosen.pixel_format.depth_stencil_format,
            DepthStencilFormat::Format24Depth8Stencil
        );
    }

    #[test]
    fn penalties_break_ties() {
        let chosen = choose(vec![
            DummyConfig::rgb888(24).with_caveat(attrib::SLOW_CONFIG),
            DummyConfig::rgb888(24).with_conformant(0),
            DummyConfig::rgb888(24),
        ])
        .unwrap();
        assert_eq!(chosen.config, EGLConfigRaw::from_raw(DummyConfig::handle_for(2)));

        // non conformance weighs more than a caveat
        let chosen = choose(vec![
            DummyConfig::rgb888(24).with_conformant(0),
            DummyConfig::rgb888(24).with_caveat(attrib::SLOW_CONFIG),
        ])
        .unwrap();
        assert_eq!(chosen.config, EGLConfigRaw::from_raw(DummyConfig::handle_for(1)));
        assert!(chosen.pixel_format.caveat);
    }

    #[test]
    fn degraded_config_is_still_returned() {
        let chosen = choose(vec![DummyConfig::rgb565(16)
            .with_caveat(attrib::SLOW_CONFIG)
            .with_conformant(0)])
        .unwrap();
        assert!(chosen.pixel_format.caveat);
        assert!(chosen.pixel_format.not_conformant);

        let chosen = choose(vec![
            DummyConfig::rgb888(24).with_caveat(attrib::NON_CONFORMANT_CONFIG),
            DummyConfig::rgb888(24).with_caveat(attrib::SLOW_CONFIG),
        ])
        .unwrap();
        assert_eq!(chosen.config, EGLConfigRaw::from_raw(DummyConfig::handle_for(0)));
        assert!(chosen.pixel_format.caveat);
        assert!(!chosen.pixel_format.not_conformant);
    }

    #[test]
    fn oversized_bit_counts_saturate() {
        let attributes = ConfigAttributes {
            caveat: attrib::NONE,
            conformant: attrib::OPENGL_ES2_BIT,
            bits: 1024,
            red: 300,
            green: 8,
            blue: 8,
            alpha: -1,
            depth: 24,
            stencil: 8,
            sample_buffers: 0,
            samples: 0,
        };
        let format = attributes.pixel_format();
        assert_eq!(format.buffer_bits, u8::MAX);
        assert_eq!(format.color_bits, (u8::MAX, 8, 8));
        assert_eq!(format.alpha_bits, 0);
        assert_eq!(format.depth_bits, 24);
    }

    #[test]
    fn first_enumerated_wins_on_equal_configs() {
        let configs = vec![DummyConfig::rgb888(24), DummyConfig::rgb888(24), DummyConfig::rgb888(24)];
        let first = choose(configs.clone()).unwrap();
        for _ in 0..8 {
            assert_eq!(choose(configs.clone()).unwrap(), first);
        }
        assert_eq!(first.config, EGLConfigRaw::from_raw(DummyConfig::handle_for(0)));
    }

    #[test]
    fn empty_config_list_is_fatal() {
        let err = choose(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::NoAvailableConfig));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn unusable_configs_are_filtered() {
        let err = choose(vec![
            DummyConfig::rgb888(24).with_stencil(0),
            DummyConfig::rgb888(32),
            DummyConfig::rgb888(24).with_samples(1, 4),
            DummyConfig::rgb888(24).with_color(32, 10, 10, 10, 2),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::NoMatchingConfig));
    }

    #[test]
    fn attribute_failure_is_reported() {
        let egl = DummyEGL::with_configs(vec![DummyConfig::rgb888(24)]);
        egl.fail_config_attrib(attrib::SAMPLES);
        let display = egl.get_display().unwrap();
        egl.initialize(display).unwrap();
        let err = chooser().choose_config(&egl, display).unwrap_err();
        assert!(matches!(err, Error::ConfigAttribute { attribute, .. } if attribute == attrib::SAMPLES));
    }

    #[test]
    fn query_attributes() {
        let attributes = chooser().config_attributes(false);
        assert_eq!(attributes.len(), 25);
        assert_eq!(attributes.last(), Some(&attrib::NONE));
        assert!(attributes.windows(2).any(|w| w == [attrib::ALPHA_SIZE, 0]));
        assert!(attributes.windows(2).any(|w| w == [attrib::CONFORMANT, attrib::OPENGL_ES2_BIT]));

        let translucent = EGLConfigChooser::new(ConfigRequirements {
            translucent_surface: true,
            emulator: Some(false),
        });
        assert!(translucent
            .config_attributes(false)
            .windows(2)
            .any(|w| w == [attrib::ALPHA_SIZE, 8]));
    }

    #[test]
    fn emulator_relaxes_conformance() {
        let attributes = chooser().config_attributes(true);
        assert_eq!(attributes.len(), 21);
        assert!(!attributes.contains(&attrib::CONFORMANT));
        assert!(!attributes.contains(&attrib::COLOR_BUFFER_TYPE));
        assert!(attributes.windows(2).any(|w| w == [attrib::RENDERABLE_TYPE, attrib::OPENGL_ES2_BIT]));
    }
}
