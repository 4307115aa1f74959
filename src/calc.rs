//! PSF calculations
//!
//! [calc_psf] validates the whole request (geometry, sampling and spectrum)
//! before the propagation engine is invoked, then normalizes the engine
//! output and assembles the product. [calc_datacube] repeats a monochromatic
//! calculation per wavelength and stacks the results.

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;

use crate::{
    aperture::ApertureGeometry,
    config::{CalcParams, InstrumentConfig},
    engine::{EngineRequest, PropagationEngine},
    position::PositionResolver,
    product::{ProductContext, PsfProduct},
    sampling::SamplingPlan,
    spectrum::{FilterProfiles, SpectralResolver, SpectrumSample},
    trace::Trace,
    Result,
};

/// External services of a calculation
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub apertures: &'a dyn ApertureGeometry,
    pub filters: &'a dyn FilterProfiles,
    pub engine: &'a dyn PropagationEngine,
}

/// Computes a PSF product
pub fn calc_psf(
    config: &InstrumentConfig,
    params: &CalcParams,
    collaborators: &Collaborators<'_>,
    trace: &Trace,
) -> Result<PsfProduct> {
    let position = PositionResolver::new(collaborators.apertures).resolve(config, trace)?;
    let plan = SamplingPlan::new(config, params, trace)?;
    let spectrum = SpectralResolver::new(collaborators.filters).resolve(config, params, trace)?;
    collaborators.engine.check(config)?;

    trace.info(format_args!(
        "{} PSF: {} @ {:?}, {}, {} wavelengths",
        config.instrument,
        position.aperture,
        position.detector_position,
        plan,
        spectrum.len()
    ));
    let output = collaborators.engine.propagate(&EngineRequest {
        config,
        position: &position,
        plan: &plan,
        spectrum: &spectrum,
        trace,
    })?;
    let output = params.normalize.apply(output, trace)?;
    Ok(PsfProduct::assemble(
        output,
        &ProductContext {
            config,
            position: &position,
            plan: &plan,
            spectrum: &spectrum,
            normalization: params.normalize,
        },
    ))
}

/// Computes a PSF datacube, one normalized monochromatic slice per wavelength
///
/// Without explicit `wavelengths` [m], the wavelengths of the source
/// spectrum resolved through the filter are used.
pub fn calc_datacube(
    config: &InstrumentConfig,
    params: &CalcParams,
    wavelengths: Option<Vec<f64>>,
    collaborators: &Collaborators<'_>,
    trace: &Trace,
    progress: Option<ProgressBar>,
) -> Result<PsfProduct> {
    PositionResolver::new(collaborators.apertures).resolve(config, trace)?;
    SamplingPlan::new(config, params, trace)?;
    let wavelengths = match wavelengths {
        Some(wavelengths) => wavelengths,
        None => SpectralResolver::new(collaborators.filters)
            .resolve(config, params, trace)?
            .wavelengths()
            .to_vec(),
    };
    for &wavelength in &wavelengths {
        SpectrumSample::monochromatic(wavelength)?;
    }
    collaborators.engine.check(config)?;

    trace.info(format_args!(
        "{} datacube of {} wavelengths",
        config.instrument,
        wavelengths.len()
    ));
    let pb = progress.unwrap_or_else(ProgressBar::hidden);
    pb.set_length(wavelengths.len() as u64);
    // one slice per thread bounds the number of fields alive at the same time
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.limits.concurrent_fields)
        .build()?;
    let slices = pool.install(|| {
        wavelengths
            .into_par_iter()
            .enumerate()
            .progress_with(pb)
            .map(|(i, wavelength)| {
                let params = params.clone().monochromatic(wavelength);
                calc_psf(
                    config,
                    &params,
                    collaborators,
                    &trace.child(format_args!("slice{i:03}")),
                )
            })
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(PsfProduct::stack(slices)?)
}
