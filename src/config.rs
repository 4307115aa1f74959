//! Calculation configuration
//!
//! [InstrumentConfig] is an immutable value: it is assembled with
//! [ConfigBuilder] before a calculation and handed to it by reference.
//! Per-call parameters live in [CalcParams].

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{
    normalization::Normalization,
    options::{InstrumentOptions, OptionsError},
    spectrum::Source,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pixelscale must be a positive number of arcsec, found {0}")]
    Pixelscale(f64),
    #[error("detector identifier is empty")]
    Detector,
    #[error("detector_position ({0}, {1}) is not finite")]
    DetectorPosition(f64, f64),
    #[error("resource limit {0} must be positive")]
    Limit(&'static str),
    #[error("invalid instrument option")]
    Options(#[from] OptionsError),
}
type Result<T> = std::result::Result<T, ConfigError>;

/// Rounding rule applied when converting a field of view to pixels
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Rounding {
    /// Round half to even, `2.5 -> 2`
    #[default]
    #[strum(to_string = "half_even")]
    HalfEven,
    /// Round half up, `2.5 -> 3`
    #[strum(to_string = "half_up")]
    HalfUp,
}
impl Rounding {
    pub fn round(&self, x: f64) -> f64 {
        match self {
            Rounding::HalfEven => x.round_ties_even(),
            Rounding::HalfUp => (x + 0.5).floor(),
        }
    }
}

/// Memory guards checked before any propagation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Largest side of any sampled grid [px]
    pub max_grid: usize,
    /// Memory budget for the intermediate fields [bytes]
    pub memory_budget: usize,
    /// Number of fields alive at the same time
    pub concurrent_fields: usize,
}
impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_grid: 16384,
            memory_budget: 4 << 30,
            concurrent_fields: 4,
        }
    }
}

/// Instrument configuration for one calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub instrument: String,
    pub detector: String,
    pub aperture: Option<String>,
    pub detector_position: Option<(f64, f64)>,
    /// Detector pixel scale [arcsec/px]
    pub pixelscale: f64,
    pub filter: Option<String>,
    pub image_mask: Option<String>,
    pub pupil_mask: Option<String>,
    pub options: InstrumentOptions,
    pub rounding: Rounding,
    pub limits: ResourceLimits,
    /// Field of view used when neither fov_arcsec nor fov_pixels is given [arcsec]
    pub default_fov_arcsec: f64,
}
impl InstrumentConfig {
    pub fn builder(
        instrument: impl ToString,
        detector: impl ToString,
        pixelscale: f64,
    ) -> ConfigBuilder {
        ConfigBuilder::new(instrument, detector, pixelscale)
    }
    /// A calculation is coronagraphic when an occulting image mask is set
    pub fn is_coronagraphic(&self) -> bool {
        self.image_mask.is_some()
    }
}

/// [InstrumentConfig] builder
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: InstrumentConfig,
}
impl ConfigBuilder {
    pub fn new(instrument: impl ToString, detector: impl ToString, pixelscale: f64) -> Self {
        Self {
            config: InstrumentConfig {
                instrument: instrument.to_string(),
                detector: detector.to_string(),
                aperture: None,
                detector_position: None,
                pixelscale,
                filter: None,
                image_mask: None,
                pupil_mask: None,
                options: Default::default(),
                rounding: Default::default(),
                limits: Default::default(),
                default_fov_arcsec: 5.,
            },
        }
    }
    pub fn detector(mut self, detector: impl ToString) -> Self {
        self.config.detector = detector.to_string();
        self
    }
    pub fn aperture(mut self, aperture: impl ToString) -> Self {
        self.config.aperture = Some(aperture.to_string());
        self
    }
    /// Detector pixel coordinates (x, y), truncated to integers at resolution
    pub fn detector_position(mut self, x: f64, y: f64) -> Self {
        self.config.detector_position = Some((x, y));
        self
    }
    pub fn pixelscale(mut self, pixelscale: f64) -> Self {
        self.config.pixelscale = pixelscale;
        self
    }
    pub fn filter(mut self, filter: impl ToString) -> Self {
        self.config.filter = Some(filter.to_string());
        self
    }
    pub fn image_mask(mut self, mask: impl ToString) -> Self {
        self.config.image_mask = Some(mask.to_string());
        self
    }
    pub fn pupil_mask(mut self, mask: impl ToString) -> Self {
        self.config.pupil_mask = Some(mask.to_string());
        self
    }
    pub fn options(mut self, options: InstrumentOptions) -> Self {
        self.config.options = options;
        self
    }
    /// Sets one option from its string key and value
    pub fn option(mut self, key: &str, value: &str) -> Result<Self> {
        self.config.options = self.config.options.with(key, value)?;
        Ok(self)
    }
    pub fn rounding(mut self, rounding: Rounding) -> Self {
        self.config.rounding = rounding;
        self
    }
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.config.limits = limits;
        self
    }
    pub fn default_fov_arcsec(mut self, fov: f64) -> Self {
        self.config.default_fov_arcsec = fov;
        self
    }
    pub fn build(self) -> Result<InstrumentConfig> {
        let config = self.config;
        if !(config.pixelscale.is_finite() && config.pixelscale > 0.) {
            return Err(ConfigError::Pixelscale(config.pixelscale));
        }
        if config.detector.trim().is_empty() {
            return Err(ConfigError::Detector);
        }
        if let Some((x, y)) = config.detector_position {
            if !(x.is_finite() && y.is_finite()) {
                return Err(ConfigError::DetectorPosition(x, y));
            }
        }
        let ResourceLimits {
            max_grid,
            memory_budget,
            concurrent_fields,
        } = config.limits;
        if max_grid == 0 {
            return Err(ConfigError::Limit("max_grid"));
        }
        if memory_budget == 0 {
            return Err(ConfigError::Limit("memory_budget"));
        }
        if concurrent_fields == 0 {
            return Err(ConfigError::Limit("concurrent_fields"));
        }
        Ok(config)
    }
}

/// Per-call calculation parameters
#[derive(Debug, Clone, Default)]
pub struct CalcParams {
    pub oversample: Option<usize>,
    pub fft_oversample: Option<usize>,
    pub detector_oversample: Option<usize>,
    /// Field of view [arcsec]
    pub fov_arcsec: Option<f64>,
    /// Field of view [detector px]
    pub fov_pixels: Option<usize>,
    /// Monochromatic wavelength [m]
    pub monochromatic: Option<f64>,
    pub source: Option<Source>,
    pub normalize: Normalization,
    pub nlambda: Option<usize>,
}
impl CalcParams {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn oversample(self, value: usize) -> Self {
        Self {
            oversample: Some(value),
            ..self
        }
    }
    pub fn fft_oversample(self, value: usize) -> Self {
        Self {
            fft_oversample: Some(value),
            ..self
        }
    }
    pub fn detector_oversample(self, value: usize) -> Self {
        Self {
            detector_oversample: Some(value),
            ..self
        }
    }
    pub fn fov_arcsec(self, value: f64) -> Self {
        Self {
            fov_arcsec: Some(value),
            ..self
        }
    }
    pub fn fov_pixels(self, value: usize) -> Self {
        Self {
            fov_pixels: Some(value),
            ..self
        }
    }
    pub fn monochromatic(self, wavelength: f64) -> Self {
        Self {
            monochromatic: Some(wavelength),
            ..self
        }
    }
    pub fn source(self, source: impl Into<Source>) -> Self {
        Self {
            source: Some(source.into()),
            ..self
        }
    }
    pub fn normalize(self, normalize: Normalization) -> Self {
        Self { normalize, ..self }
    }
    pub fn nlambda(self, value: usize) -> Self {
        Self {
            nlambda: Some(value),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_rules() {
        assert_eq!(Rounding::HalfEven.round(2.5), 2.);
        assert_eq!(Rounding::HalfEven.round(3.5), 4.);
        assert_eq!(Rounding::HalfUp.round(2.5), 3.);
        assert_eq!(Rounding::HalfUp.round(2.4999), 2.);
        assert_eq!(Rounding::default(), Rounding::HalfEven);
    }

    #[test]
    fn builder() -> std::result::Result<(), ConfigError> {
        let config = InstrumentConfig::builder("imager", "IMG1", 0.031)
            .filter("F200W")
            .detector_position(1024.7, 99.2)
            .option("parity", "even")?
            .build()?;
        assert_eq!(config.filter.as_deref(), Some("F200W"));
        assert_eq!(config.options.parity, crate::Parity::Even);
        assert!(!config.is_coronagraphic());
        Ok(())
    }

    #[test]
    fn invalid_configs() {
        assert!(matches!(
            InstrumentConfig::builder("imager", "IMG1", 0.).build(),
            Err(ConfigError::Pixelscale(_))
        ));
        assert!(matches!(
            InstrumentConfig::builder("imager", " ", 0.031).build(),
            Err(ConfigError::Detector)
        ));
        assert!(matches!(
            InstrumentConfig::builder("imager", "IMG1", 0.031)
                .detector_position(f64::NAN, 3.)
                .build(),
            Err(ConfigError::DetectorPosition(..))
        ));
        assert!(matches!(
            InstrumentConfig::builder("imager", "IMG1", 0.031)
                .option("parity", "3"),
            Err(ConfigError::Options(_))
        ));
    }
}
