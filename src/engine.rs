//! Propagation engine interface
//!
//! The pipeline hands a fully resolved [EngineRequest] to a
//! [PropagationEngine] and gets back the intensity planes and the pupil
//! totals needed for normalization. [Fraunhofer] is the reference engine.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::{
    config::InstrumentConfig, position::ResolvedPosition, sampling::SamplingPlan,
    spectrum::SpectrumSample, trace::Trace,
};

mod fraunhofer;
pub mod mft;
mod pupil;
pub use fraunhofer::{Fraunhofer, Occulter};
pub use pupil::{Pupil, PupilMask};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown image_mask {0:?}, expected one of: {1}")]
    UnknownImageMask(String, String),
    #[error("unknown pupil_mask {0:?}, expected one of: {1}")]
    UnknownPupilMask(String, String),
    #[error("invalid pupil: {0}")]
    Pupil(&'static str),
    #[error("no light reaches the {0}")]
    NoLight(&'static str),
}
pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything an engine needs for one calculation
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    pub config: &'a InstrumentConfig,
    pub position: &'a ResolvedPosition,
    pub plan: &'a SamplingPlan,
    pub spectrum: &'a SpectrumSample,
    pub trace: &'a Trace,
}

/// Spectrally weighted engine output
///
/// Intensities are scaled to a unit entrance pupil intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub entrance_total: f64,
    pub exit_total: f64,
    pub ideal_oversampled: DMatrix<f64>,
    pub ideal_detector: DMatrix<f64>,
    pub distorted_oversampled: DMatrix<f64>,
    pub distorted_detector: DMatrix<f64>,
}
impl EngineOutput {
    /// Multiplies every plane by `factor`
    pub fn scale(self, factor: f64) -> Self {
        Self {
            ideal_oversampled: self.ideal_oversampled * factor,
            ideal_detector: self.ideal_detector * factor,
            distorted_oversampled: self.distorted_oversampled * factor,
            distorted_detector: self.distorted_detector * factor,
            ..self
        }
    }
}

/// Optical propagation through the instrument
pub trait PropagationEngine: Send + Sync {
    /// Checks that the engine knows the masks of a configuration
    ///
    /// Called before any propagation.
    fn check(&self, _config: &InstrumentConfig) -> Result<()> {
        Ok(())
    }
    fn propagate(&self, request: &EngineRequest<'_>) -> Result<EngineOutput>;
}

/// Sums `factor x factor` pixel blocks
pub fn rebin(image: &DMatrix<f64>, factor: usize) -> DMatrix<f64> {
    if factor <= 1 {
        return image.clone();
    }
    let (rows, cols) = (image.nrows() / factor, image.ncols() / factor);
    DMatrix::from_fn(rows, cols, |i, j| {
        image
            .view((i * factor, j * factor), (factor, factor))
            .sum()
    })
}

/// Maps `items` in parallel, at most `width` at a time, and folds the results in order
pub fn bounded_fold<T, R, A, M, F>(
    items: &[T],
    width: usize,
    init: A,
    map: M,
    mut fold: F,
) -> A
where
    T: Sync,
    R: Send,
    M: Fn(&T) -> R + Sync,
    F: FnMut(A, R) -> A,
{
    items.chunks(width.max(1)).fold(init, |acc, chunk| {
        let results: Vec<R> = chunk.par_iter().map(&map).collect();
        results.into_iter().fold(acc, &mut fold)
    })
}
