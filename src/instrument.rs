//! Instrument presets
//!
//! An [Instrument] bundles the reference collaborators of an instrument:
//! its aperture table, its filter profiles and its propagation engine.

use std::path::Path;

use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    aperture::{Aperture, ApertureError, ApertureTable, SubarrayBounds},
    calc::Collaborators,
    config::ConfigBuilder,
    engine::{Fraunhofer, Occulter, Pupil, PupilMask},
    spectrum::{FilterError, FilterTable},
    InstrumentConfig,
};

/// Built-in instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum Preset {
    #[strum(to_string = "imager")]
    Imager,
    #[strum(to_string = "coronagraph")]
    Coronagraph,
}

#[derive(Debug, Clone)]
pub struct Instrument {
    name: String,
    detector: String,
    /// Detector pixel scale [arcsec/px]
    pixelscale: f64,
    apertures: ApertureTable,
    filters: FilterTable,
    engine: Fraunhofer,
}
impl Instrument {
    /// Near-infrared imager: two 2048x2048 detectors at 31mas/px
    pub fn imager() -> Result<Self, ApertureError> {
        let sub = |name: &str, detector: &str, x0: usize, y0: usize, side: usize| Aperture {
            name: name.to_string(),
            detector: detector.to_string(),
            center: ((x0 + side / 2) as f64, (y0 + side / 2) as f64),
            subarray: SubarrayBounds {
                x0,
                y0,
                x1: x0 + side,
                y1: y0 + side,
            },
        };
        let apertures = ApertureTable::new()
            .detector("IMG1", (2048, 2048))
            .detector("IMG2", (2048, 2048))
            .with_aperture(sub("IMG1_SUB160", "IMG1", 944, 944, 160))?
            .with_aperture(sub("IMG1_SUB64", "IMG1", 0, 1984, 64))?
            .with_aperture(sub("IMG2_SUB160", "IMG2", 944, 944, 160))?;
        Ok(Self {
            name: Preset::Imager.to_string(),
            detector: "IMG1".to_string(),
            pixelscale: 0.031,
            apertures,
            filters: FilterTable::new(),
            engine: Fraunhofer::new(Pupil::new(6.5).obscuration(0.1).spiders(3, 0.01))
                .charge_diffusion(0.25),
        })
    }
    /// Occulting spot coronagraph feeding a 63mas/px detector
    pub fn coronagraph() -> Result<Self, ApertureError> {
        let apertures = ApertureTable::new()
            .detector("CORON", (2048, 2048))
            .with_aperture(Aperture {
                name: "CORON_MASK210R".to_string(),
                detector: "CORON".to_string(),
                center: (160., 160.),
                subarray: SubarrayBounds {
                    x0: 0,
                    y0: 0,
                    x1: 320,
                    y1: 320,
                },
            })?
            .with_aperture(Aperture {
                name: "CORON_MASK335R".to_string(),
                detector: "CORON".to_string(),
                center: (480., 160.),
                subarray: SubarrayBounds {
                    x0: 320,
                    y0: 0,
                    x1: 640,
                    y1: 320,
                },
            })?;
        let engine = Fraunhofer::new(Pupil::new(6.5).obscuration(0.1).spiders(3, 0.01))
            .occulter("MASK210R", Occulter::new(0.4))
            .occulter("MASK335R", Occulter::new(0.65))
            .pupil_mask("CIRCLYOT", PupilMask::new(0.25, 0.85))
            .charge_diffusion(0.25);
        Ok(Self {
            name: Preset::Coronagraph.to_string(),
            detector: "CORON".to_string(),
            pixelscale: 0.063,
            apertures,
            filters: FilterTable::new(),
            engine,
        })
    }
    pub fn preset(preset: Preset) -> Result<Self, ApertureError> {
        match preset {
            Preset::Imager => Self::imager(),
            Preset::Coronagraph => Self::coronagraph(),
        }
    }
    /// Replaces the aperture table with one loaded from a CSV file
    pub fn apertures_csv<P: AsRef<Path>>(self, path: P) -> Result<Self, ApertureError> {
        Ok(Self {
            apertures: ApertureTable::from_csv(path)?,
            ..self
        })
    }
    /// Replaces the filter profiles with the ones found in a directory
    pub fn filters_dir<P: AsRef<Path>>(self, path: P) -> Result<Self, FilterError> {
        Ok(Self {
            filters: FilterTable::from_dir(path)?,
            ..self
        })
    }
    pub fn engine(self, engine: Fraunhofer) -> Self {
        Self { engine, ..self }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// A configuration builder for the default detector of the instrument
    pub fn configure(&self) -> ConfigBuilder {
        InstrumentConfig::builder(&self.name, &self.detector, self.pixelscale)
    }
    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            apertures: &self.apertures,
            filters: &self.filters,
            engine: &self.engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn presets() -> Result<(), Box<dyn std::error::Error>> {
        for preset in Preset::iter() {
            let instrument = Instrument::preset(preset)?;
            let config = instrument.configure().build()?;
            assert_eq!(config.instrument, preset.to_string());
            assert!(instrument
                .collaborators()
                .apertures
                .full_frame(&config.detector)
                .is_some());
        }
        assert_eq!(Preset::from_str("Coronagraph")?, Preset::Coronagraph);
        Ok(())
    }
}
