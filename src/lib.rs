//! # PSF calculations
//!
//! Point spread function products of a space telescope instrument.
//!
//! A calculation reconciles the detector position, aperture and source
//! offset of an [InstrumentConfig], plans the oversampled grids, resolves the
//! source spectrum into weighted wavelengths, propagates through a
//! [PropagationEngine] and normalizes the result to the entrance pupil, the
//! exit pupil or the final image.
//!
//! ```no_run
//! use psf_calc::{calc_psf, CalcParams, Instrument, Normalization, Trace};
//!
//! # fn main() -> anyhow::Result<()> {
//! let imager = Instrument::imager()?;
//! let config = imager
//!     .configure()
//!     .filter("F200W")
//!     .option("source_offset_r", "0.2")?
//!     .build()?;
//! let params = CalcParams::new()
//!     .fov_arcsec(2.)
//!     .normalize(Normalization::ExitPupil);
//! let psf = calc_psf(&config, &params, &imager.collaborators(), &Trace::new("F200W"))?;
//! psf.save("psf_F200W.npz")?;
//! # Ok(())
//! # }
//! ```

pub mod aperture;
mod calc;
pub mod config;
pub mod engine;
mod error;
mod instrument;
pub mod normalization;
pub mod options;
pub mod position;
pub mod product;
pub mod sampling;
pub mod spectrum;
mod trace;

pub use aperture::{Aperture, ApertureGeometry, ApertureTable, SubarrayBounds};
pub use calc::{calc_datacube, calc_psf, Collaborators};
pub use config::{CalcParams, ConfigBuilder, InstrumentConfig, ResourceLimits, Rounding};
pub use engine::{EngineOutput, EngineRequest, Fraunhofer, PropagationEngine};
pub use error::{Error, ErrorKind, Result};
pub use instrument::{Instrument, Preset};
pub use normalization::Normalization;
pub use options::{InstrumentOptions, OptionKey, OutputMode, Parity};
pub use position::{ResolvedPosition, SourceOffset};
pub use product::{Plane, PlaneHeader, PlaneKind, PsfProduct};
pub use sampling::SamplingPlan;
pub use spectrum::{
    Blackbody, FilterProfile, FilterProfiles, FilterTable, FlatSpectrum, Source, Spectrum,
    SpectrumSample, TabulatedSpectrum, WeightTable,
};
pub use trace::Trace;

/// Arcsecond to radian conversion factor
pub const ARCSEC2RAD: f64 = std::f64::consts::PI / 180. / 3600.;
