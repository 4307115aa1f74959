//! Sampling planner
//!
//! Derives the detector grid size and the oversampling factors of a
//! calculation. Coronagraphic calculations sample the occulter plane with
//! `fft_oversample` and the final image with `detector_oversample`; all
//! other calculations use a single oversampling factor.

use serde::{Deserialize, Serialize};

use crate::{
    config::{CalcParams, InstrumentConfig, ResourceLimits, Rounding},
    options::Parity,
    trace::Trace,
};

/// Oversampling factor used when none is given
pub const DEFAULT_OVERSAMPLE: usize = 4;
/// Detector oversampling factor of coronagraphic calculations when none is given
pub const DEFAULT_CORON_DETECTOR_OVERSAMPLE: usize = 2;
/// Bytes of one complex double precision sample
const COMPLEX_SAMPLE_BYTES: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("fov_arcsec must be positive and finite, found {0}")]
    FovArcsec(f64),
    #[error("fov_arcsec {0} rounds to zero pixels at {1} arcsec/px")]
    FovTooSmall(f64, f64),
    #[error("fov_pixels must be positive, found {0}")]
    FovPixels(usize),
    #[error("fov_arcsec {0} converts to {1}px at {2} arcsec/px, conflicting with fov_pixels {3}")]
    FovConflict(f64, usize, f64, usize),
    #[error("{0} must be at least 1, found {1}")]
    Oversample(&'static str, usize),
    #[error(
        "oversample {0:?}, fft_oversample {1:?} and detector_oversample {2:?} must agree for a non-coronagraphic calculation"
    )]
    OversampleConflict(Option<usize>, Option<usize>, Option<usize>),
    #[error("{0} grid of {1}px exceeds the {2}px limit")]
    GridLimit(&'static str, usize, usize),
    #[error(
        "{0} grid of {1}px needs ~{2} bytes for {3} concurrent fields, over the {4} bytes budget"
    )]
    MemoryBudget(&'static str, usize, usize, usize, usize),
}
impl SamplingError {
    /// Whether the error is a resource exhaustion rather than a configuration mistake
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            SamplingError::GridLimit(..) | SamplingError::MemoryBudget(..)
        )
    }
}
type Result<T> = std::result::Result<T, SamplingError>;

/// Converts a field of view in arcsec into a detector pixel count
///
/// The ratio `fov_arcsec / pixelscale` is rounded with `rounding`, then
/// bumped by one pixel if it disagrees with `parity`. Ratios larger than
/// `max_grid` are rejected before any integer conversion.
pub fn fov_to_pixels(
    fov_arcsec: f64,
    pixelscale: f64,
    parity: Parity,
    rounding: Rounding,
    max_grid: usize,
) -> Result<usize> {
    if !(fov_arcsec.is_finite() && fov_arcsec > 0.) {
        return Err(SamplingError::FovArcsec(fov_arcsec));
    }
    let ratio = rounding.round(fov_arcsec / pixelscale);
    if ratio > max_grid as f64 {
        return Err(SamplingError::GridLimit("detector", ratio as usize, max_grid));
    }
    let n = ratio as usize;
    let n = match parity {
        Parity::Odd if n % 2 == 0 => n.checked_add(1),
        Parity::Even if n % 2 == 1 => n.checked_add(1),
        _ => Some(n),
    }
    .ok_or(SamplingError::GridLimit("detector", usize::MAX, max_grid))?;
    if n == 0 {
        Err(SamplingError::FovTooSmall(fov_arcsec, pixelscale))
    } else {
        Ok(n)
    }
}

/// Grid sizes and oversampling factors of a calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPlan {
    /// Detector pixel scale [arcsec/px]
    pub pixelscale: f64,
    /// Detector grid side [px]
    pub detector_grid: usize,
    /// Occulter plane oversampling
    pub fft_oversample: usize,
    /// Final image oversampling
    pub detector_oversample: usize,
    pub coronagraphic: bool,
}
impl SamplingPlan {
    /// Plans the sampling of a calculation
    pub fn new(config: &InstrumentConfig, params: &CalcParams, trace: &Trace) -> Result<Self> {
        let pixelscale = config.pixelscale;
        let parity = config.options.parity;
        let detector_grid = match (params.fov_pixels, params.fov_arcsec) {
            (Some(0), _) => return Err(SamplingError::FovPixels(0)),
            (Some(fov_pixels), None) => fov_pixels,
            (Some(fov_pixels), Some(fov_arcsec)) => {
                let n = fov_to_pixels(
                    fov_arcsec,
                    pixelscale,
                    Parity::None,
                    config.rounding,
                    config.limits.max_grid,
                )?;
                if n != fov_pixels {
                    return Err(SamplingError::FovConflict(
                        fov_arcsec, n, pixelscale, fov_pixels,
                    ));
                }
                fov_pixels
            }
            (None, Some(fov_arcsec)) => fov_to_pixels(
                fov_arcsec,
                pixelscale,
                parity,
                config.rounding,
                config.limits.max_grid,
            )?,
            (None, None) => fov_to_pixels(
                config.default_fov_arcsec,
                pixelscale,
                parity,
                config.rounding,
                config.limits.max_grid,
            )?,
        };

        let coronagraphic = config.is_coronagraphic();
        let (fft_oversample, detector_oversample) = Self::oversampling(params, coronagraphic)?;
        let plan = Self {
            pixelscale,
            detector_grid,
            fft_oversample,
            detector_oversample,
            coronagraphic,
        };
        plan.check(&config.limits)?;
        trace.debug(format_args!("{plan}"));
        Ok(plan)
    }
    fn oversampling(params: &CalcParams, coronagraphic: bool) -> Result<(usize, usize)> {
        let &CalcParams {
            oversample,
            fft_oversample,
            detector_oversample,
            ..
        } = params;
        for (name, value) in [
            ("oversample", oversample),
            ("fft_oversample", fft_oversample),
            ("detector_oversample", detector_oversample),
        ] {
            if value == Some(0) {
                return Err(SamplingError::Oversample(name, 0));
            }
        }
        if coronagraphic {
            Ok((
                fft_oversample.or(oversample).unwrap_or(DEFAULT_OVERSAMPLE),
                detector_oversample
                    .or(oversample)
                    .unwrap_or(DEFAULT_CORON_DETECTOR_OVERSAMPLE),
            ))
        } else {
            let mut given = [oversample, fft_oversample, detector_oversample]
                .into_iter()
                .flatten();
            let first = given.next().unwrap_or(DEFAULT_OVERSAMPLE);
            if given.all(|x| x == first) {
                Ok((first, first))
            } else {
                Err(SamplingError::OversampleConflict(
                    oversample,
                    fft_oversample,
                    detector_oversample,
                ))
            }
        }
    }
    fn check(&self, limits: &ResourceLimits) -> Result<()> {
        let mut grids = vec![("oversampled", self.detector_oversample)];
        if self.coronagraphic {
            grids.push(("occulter plane", self.fft_oversample));
        }
        for (name, factor) in grids {
            let side = self
                .detector_grid
                .checked_mul(factor)
                .filter(|&side| side <= limits.max_grid)
                .ok_or(SamplingError::GridLimit(
                    name,
                    self.detector_grid.saturating_mul(factor),
                    limits.max_grid,
                ))?;
            let bytes = side
                .saturating_mul(side)
                .saturating_mul(COMPLEX_SAMPLE_BYTES)
                .saturating_mul(limits.concurrent_fields);
            if bytes > limits.memory_budget {
                return Err(SamplingError::MemoryBudget(
                    name,
                    side,
                    bytes,
                    limits.concurrent_fields,
                    limits.memory_budget,
                ));
            }
        }
        Ok(())
    }
    /// Oversampled output grid side [px]
    pub fn oversampled_grid(&self) -> usize {
        self.detector_grid.saturating_mul(self.detector_oversample)
    }
    /// Occulter plane grid side [px]
    pub fn fft_grid(&self) -> usize {
        self.detector_grid.saturating_mul(self.fft_oversample)
    }
    /// Oversampled output pixel scale [arcsec/px]
    pub fn oversampled_pixelscale(&self) -> f64 {
        self.pixelscale / self.detector_oversample as f64
    }
    /// Occulter plane pixel scale [arcsec/px]
    pub fn fft_pixelscale(&self) -> f64 {
        self.pixelscale / self.fft_oversample as f64
    }
    /// Field of view [arcsec]
    pub fn fov_arcsec(&self) -> f64 {
        self.detector_grid as f64 * self.pixelscale
    }
}
impl std::fmt::Display for SamplingPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}px detector grid ({:.3}arcsec), oversampled {}px (x{})",
            self.detector_grid,
            self.fov_arcsec(),
            self.oversampled_grid(),
            self.detector_oversample
        )?;
        if self.coronagraphic {
            write!(
                f,
                ", occulter plane {}px (x{})",
                self.fft_grid(),
                self.fft_oversample
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;

    const MAX: usize = 16384;

    fn config() -> InstrumentConfig {
        InstrumentConfig::builder("imager", "IMG1", 0.031)
            .build()
            .unwrap()
    }
    fn coron_config() -> InstrumentConfig {
        InstrumentConfig::builder("imager", "IMG2", 0.063)
            .image_mask("MASK210R")
            .build()
            .unwrap()
    }

    #[test]
    fn parity_differs_by_one() -> Result<()> {
        let pixelscale = 0.031;
        for fov in [1., 2.5, 3.1, 5., 7.77, 10.] {
            let odd = fov_to_pixels(fov, pixelscale, Parity::Odd, Rounding::HalfEven, MAX)?;
            let even = fov_to_pixels(fov, pixelscale, Parity::Even, Rounding::HalfEven, MAX)?;
            assert_eq!(odd % 2, 1);
            assert_eq!(even % 2, 0);
            assert_eq!(odd.abs_diff(even), 1, "fov: {fov}");
        }
        Ok(())
    }

    #[test]
    fn parity_rounding() -> Result<()> {
        // 10 / 4 = 2.5
        assert_eq!(fov_to_pixels(10., 4., Parity::None, Rounding::HalfEven, MAX)?, 2);
        assert_eq!(fov_to_pixels(10., 4., Parity::None, Rounding::HalfUp, MAX)?, 3);
        assert_eq!(fov_to_pixels(10., 4., Parity::Odd, Rounding::HalfEven, MAX)?, 3);
        assert_eq!(fov_to_pixels(10., 4., Parity::Even, Rounding::HalfUp, MAX)?, 4);
        assert!(matches!(
            fov_to_pixels(0.01, 4., Parity::None, Rounding::HalfEven, MAX),
            Err(SamplingError::FovTooSmall(..))
        ));
        assert!(matches!(
            fov_to_pixels(-1., 4., Parity::None, Rounding::HalfEven, MAX),
            Err(SamplingError::FovArcsec(_))
        ));
        Ok(())
    }

    #[test]
    fn fov_pixels_with_oversample() -> Result<()> {
        let params = CalcParams::new().fov_pixels(512).oversample(2);
        let plan = SamplingPlan::new(&config(), &params, &Trace::silent())?;
        assert_eq!(plan.detector_grid, 512);
        assert_eq!(plan.oversampled_grid(), 1024);
        Ok(())
    }

    #[test]
    fn fov_pixels_bypass_parity() -> Result<()> {
        let config = InstrumentConfig::builder("imager", "IMG1", 0.031)
            .option("parity", "odd")
            .unwrap()
            .build()
            .unwrap();
        let trace = Trace::silent();
        let plan = SamplingPlan::new(&config, &CalcParams::new().fov_pixels(64), &trace)?;
        assert_eq!(plan.detector_grid, 64);
        let plan = SamplingPlan::new(&config, &CalcParams::new().fov_arcsec(1.984), &trace)?;
        assert_eq!(plan.detector_grid, 65);
        Ok(())
    }

    #[test]
    fn fov_conflict() {
        // 1.984 / 0.031 = 64
        let consistent = CalcParams::new().fov_arcsec(1.984).fov_pixels(64);
        assert!(SamplingPlan::new(&config(), &consistent, &Trace::silent()).is_ok());
        let conflicting = CalcParams::new().fov_arcsec(1.984).fov_pixels(80);
        assert!(matches!(
            SamplingPlan::new(&config(), &conflicting, &Trace::silent()),
            Err(SamplingError::FovConflict(_, 64, _, 80))
        ));
    }

    #[test]
    fn default_fov() -> Result<()> {
        let plan = SamplingPlan::new(&config(), &CalcParams::new(), &Trace::silent())?;
        assert_eq!(plan.detector_grid, 161);
        assert_eq!(plan.fft_oversample, DEFAULT_OVERSAMPLE);
        assert_eq!(plan.detector_oversample, DEFAULT_OVERSAMPLE);
        Ok(())
    }

    #[test]
    fn non_coronagraphic_oversampling_collapses() -> Result<()> {
        let params = CalcParams::new().fov_pixels(32).detector_oversample(3);
        let plan = SamplingPlan::new(&config(), &params, &Trace::silent())?;
        assert_eq!((plan.fft_oversample, plan.detector_oversample), (3, 3));
        let params = CalcParams::new()
            .fov_pixels(32)
            .fft_oversample(4)
            .detector_oversample(2);
        assert!(matches!(
            SamplingPlan::new(&config(), &params, &Trace::silent()),
            Err(SamplingError::OversampleConflict(..))
        ));
        Ok(())
    }

    #[test]
    fn coronagraphic_oversampling() -> Result<()> {
        let params = CalcParams::new().fov_pixels(32);
        let plan = SamplingPlan::new(&coron_config(), &params, &Trace::silent())?;
        assert_eq!((plan.fft_oversample, plan.detector_oversample), (4, 2));
        assert_eq!(plan.fft_grid(), 128);
        assert_eq!(plan.oversampled_grid(), 64);
        let params = CalcParams::new()
            .fov_pixels(32)
            .oversample(3)
            .fft_oversample(8);
        let plan = SamplingPlan::new(&coron_config(), &params, &Trace::silent())?;
        assert_eq!((plan.fft_oversample, plan.detector_oversample), (8, 3));
        Ok(())
    }

    #[test]
    fn zero_oversample() {
        let params = CalcParams::new().oversample(0);
        assert!(matches!(
            SamplingPlan::new(&config(), &params, &Trace::silent()),
            Err(SamplingError::Oversample("oversample", 0))
        ));
    }

    #[test]
    fn resource_limits() {
        let params = CalcParams::new().fov_pixels(4096).oversample(8);
        let err = SamplingPlan::new(&config(), &params, &Trace::silent()).unwrap_err();
        assert!(matches!(err, SamplingError::GridLimit("oversampled", 32768, _)));
        assert!(err.is_resource());
        let tight = InstrumentConfig::builder("imager", "IMG1", 0.031)
            .limits(ResourceLimits {
                memory_budget: 1 << 20,
                ..Default::default()
            })
            .build()
            .unwrap();
        let params = CalcParams::new().fov_pixels(256).oversample(2);
        assert!(matches!(
            SamplingPlan::new(&tight, &params, &Trace::silent()),
            Err(SamplingError::MemoryBudget(..))
        ));
    }

    #[test]
    fn oversized_fov_pixels() {
        let params = CalcParams::new().fov_pixels(usize::MAX / 2).oversample(4);
        let err = SamplingPlan::new(&config(), &params, &Trace::silent()).unwrap_err();
        assert!(matches!(err, SamplingError::GridLimit("oversampled", _, 16384)));
        assert!(err.is_resource());
        let coron = CalcParams::new()
            .fov_pixels(usize::MAX / 3)
            .fft_oversample(8)
            .detector_oversample(1);
        let err = SamplingPlan::new(&coron_config(), &coron, &Trace::silent()).unwrap_err();
        assert!(err.is_resource());
    }

    #[test]
    fn oversized_fov_arcsec() {
        let even = InstrumentConfig::builder("imager", "IMG1", 0.031)
            .option("parity", "even")
            .unwrap()
            .build()
            .unwrap();
        let params = CalcParams::new().fov_arcsec(1e300);
        let err = SamplingPlan::new(&even, &params, &Trace::silent()).unwrap_err();
        assert!(matches!(err, SamplingError::GridLimit("detector", _, 16384)));
        assert!(err.is_resource());
        assert!(matches!(
            fov_to_pixels(1e300, 0.031, Parity::Even, Rounding::HalfUp, usize::MAX),
            Err(SamplingError::GridLimit(..))
        ));
    }
}
