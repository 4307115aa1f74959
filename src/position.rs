//! Position resolver
//!
//! Reconciles the detector, aperture, detector position, source offset and
//! coronagraph shift of a configuration into one [ResolvedPosition].

use std::{fmt, ops::Sub};

use serde::{Deserialize, Serialize};

use crate::{
    aperture::{ApertureGeometry, SubarrayBounds},
    config::InstrumentConfig,
    options::InstrumentOptions,
    trace::Trace,
};

/// Largest disagreement tolerated between the polar and cartesian offsets [arcsec]
pub const OFFSET_TOLERANCE: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("unknown aperture_name {0:?}")]
    UnknownAperture(String),
    #[error("unknown detector {0:?}")]
    UnknownDetector(String),
    #[error("detector_position ({0}, {1}) is outside the {2}x{3} pixels of detector {4}")]
    OutOfBounds(f64, f64, usize, usize, String),
    #[error(
        "source_offset_r/theta ({0}, {1}) and source_offset_x/y ({2}, {3}) describe different offsets"
    )]
    Conflict(f64, f64, f64, f64),
}
type Result<T> = std::result::Result<T, PositionError>;

/// Wraps an angle to [0, 360) degrees
fn wrap_degrees(theta: f64) -> f64 {
    let theta = theta.rem_euclid(360.);
    if theta >= 360. {
        0.
    } else {
        theta
    }
}

/// Source offset with respect to the aperture reference point
///
/// Angles are position angles in degrees, counterclockwise from +Y;
/// distances are in arcsec. The variant holds the authoritative
/// representation, the other one is derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SourceOffset {
    Polar { r: f64, theta: f64 },
    Cartesian { x: f64, y: f64 },
}
impl Default for SourceOffset {
    fn default() -> Self {
        SourceOffset::Cartesian { x: 0., y: 0. }
    }
}
impl SourceOffset {
    pub fn polar(r: f64, theta: f64) -> Self {
        SourceOffset::Polar { r, theta }
    }
    pub fn cartesian(x: f64, y: f64) -> Self {
        SourceOffset::Cartesian { x, y }
    }
    /// Cartesian components `(x, y)` [arcsec]
    pub fn xy(&self) -> (f64, f64) {
        match *self {
            SourceOffset::Cartesian { x, y } => (x, y),
            SourceOffset::Polar { r, theta } => {
                let (s, c) = theta.to_radians().sin_cos();
                (-r * s, r * c)
            }
        }
    }
    /// Polar components `(r, theta)` with `r >= 0` and `theta` in [0, 360)
    pub fn r_theta(&self) -> (f64, f64) {
        match *self {
            SourceOffset::Polar { r, theta } if r >= 0. => (r, wrap_degrees(theta)),
            SourceOffset::Polar { r, theta } => (-r, wrap_degrees(theta + 180.)),
            SourceOffset::Cartesian { x, y } => {
                let r = x.hypot(y);
                if r == 0. {
                    (0., 0.)
                } else {
                    (r, wrap_degrees((-x).atan2(y).to_degrees()))
                }
            }
        }
    }
    pub fn to_cartesian(self) -> Self {
        let (x, y) = self.xy();
        SourceOffset::Cartesian { x, y }
    }
    pub fn to_polar(self) -> Self {
        let (r, theta) = self.r_theta();
        SourceOffset::Polar { r, theta }
    }
    /// Distance between two offsets [arcsec]
    pub fn distance(&self, other: &Self) -> f64 {
        let (x0, y0) = self.xy();
        let (x1, y1) = other.xy();
        (x0 - x1).hypot(y0 - y1)
    }
    pub fn is_zero(&self) -> bool {
        let (x, y) = self.xy();
        x == 0. && y == 0.
    }
    /// The source offset requested by the option keys
    pub fn from_options(options: &InstrumentOptions) -> Result<Self> {
        let &InstrumentOptions {
            source_offset_r,
            source_offset_theta,
            source_offset_x,
            source_offset_y,
            ..
        } = options;
        let polar = (source_offset_r.is_some() || source_offset_theta.is_some()).then(|| {
            SourceOffset::polar(
                source_offset_r.unwrap_or_default(),
                source_offset_theta.unwrap_or_default(),
            )
        });
        let cartesian = (source_offset_x.is_some() || source_offset_y.is_some()).then(|| {
            SourceOffset::cartesian(
                source_offset_x.unwrap_or_default(),
                source_offset_y.unwrap_or_default(),
            )
        });
        match (polar, cartesian) {
            (None, None) => Ok(Default::default()),
            (Some(offset), None) | (None, Some(offset)) => Ok(offset),
            (Some(polar), Some(cartesian)) => {
                if polar.distance(&cartesian) <= OFFSET_TOLERANCE {
                    Ok(cartesian)
                } else {
                    let (r, theta) = polar.r_theta();
                    let (x, y) = cartesian.xy();
                    Err(PositionError::Conflict(r, theta, x, y))
                }
            }
        }
    }
}
impl Sub for SourceOffset {
    type Output = SourceOffset;

    fn sub(self, rhs: Self) -> Self::Output {
        let (x0, y0) = self.xy();
        let (x1, y1) = rhs.xy();
        SourceOffset::cartesian(x0 - x1, y0 - y1)
    }
}
impl fmt::Display for SourceOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.xy();
        let (r, theta) = self.r_theta();
        write!(
            f,
            "(x: {x:.4}, y: {y:.4})arcsec (r: {r:.4}arcsec, theta: {theta:.2}deg)"
        )
    }
}

/// Canonical geometry of a calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPosition {
    pub detector: String,
    pub aperture: String,
    /// Integer detector pixel `(x, y)`
    pub detector_position: (usize, usize),
    pub subarray: SubarrayBounds,
    /// Source offset as requested
    pub source_offset: SourceOffset,
    /// Occulter displacement `(x, y)` [arcsec]
    pub coron_shift: (f64, f64),
    /// Source position relative to the occulter, the output arrays center
    pub effective_offset: SourceOffset,
}

/// Resolves the geometry of a configuration against an aperture lookup
pub struct PositionResolver<'a> {
    apertures: &'a dyn ApertureGeometry,
}
impl<'a> PositionResolver<'a> {
    pub fn new(apertures: &'a dyn ApertureGeometry) -> Self {
        Self { apertures }
    }
    pub fn resolve(&self, config: &InstrumentConfig, trace: &Trace) -> Result<ResolvedPosition> {
        let aperture = match &config.aperture {
            Some(name) => {
                let aperture = self
                    .apertures
                    .aperture(name)
                    .ok_or_else(|| PositionError::UnknownAperture(name.clone()))?;
                if aperture.detector != config.detector {
                    trace.info(format_args!(
                        "aperture {} selects detector {} (was {})",
                        aperture.name, aperture.detector, config.detector
                    ));
                }
                aperture
            }
            None => self
                .apertures
                .full_frame(&config.detector)
                .ok_or_else(|| PositionError::UnknownDetector(config.detector.clone()))?,
        };
        let (nx, ny) = self
            .apertures
            .detector_size(&aperture.detector)
            .ok_or_else(|| PositionError::UnknownDetector(aperture.detector.clone()))?;

        let (x, y) = config.detector_position.unwrap_or(aperture.center);
        if !(x.is_finite() && y.is_finite())
            || x < 0.
            || y < 0.
            || x >= nx as f64
            || y >= ny as f64
        {
            return Err(PositionError::OutOfBounds(
                x,
                y,
                nx,
                ny,
                aperture.detector.clone(),
            ));
        }
        let detector_position = (x.trunc() as usize, y.trunc() as usize);
        if !aperture.subarray.contains(detector_position) {
            trace.warn(format_args!(
                "detector_position {:?} lies outside aperture {} {}",
                detector_position, aperture.name, aperture.subarray
            ));
        }

        let source_offset = SourceOffset::from_options(&config.options)?;
        let coron_shift = (
            config.options.coron_shift_x.unwrap_or_default(),
            config.options.coron_shift_y.unwrap_or_default(),
        );
        let effective_offset =
            source_offset - SourceOffset::cartesian(coron_shift.0, coron_shift.1);
        trace.debug(format_args!(
            "{} @ {:?}, source offset {}, coron shift {:?}, effective {}",
            aperture.name, detector_position, source_offset, coron_shift, effective_offset
        ));
        Ok(ResolvedPosition {
            detector: aperture.detector,
            aperture: aperture.name,
            detector_position,
            subarray: aperture.subarray,
            source_offset,
            coron_shift,
            effective_offset,
        })
    }
}
