use std::collections::BTreeMap;

use nalgebra::{Complex, DMatrix};
use serde::{Deserialize, Serialize};

use super::{
    bounded_fold, mft, rebin, EngineError, EngineOutput, EngineRequest, PropagationEngine, Pupil,
    PupilMask, Result,
};
use crate::{config::InstrumentConfig, ARCSEC2RAD};

/// Occulting spot coronagraph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Occulter {
    /// Spot radius [arcsec]
    pub radius_arcsec: f64,
    /// Lyot stop used when no pupil mask is selected
    pub lyot: PupilMask,
}
impl Occulter {
    pub fn new(radius_arcsec: f64) -> Self {
        Self {
            radius_arcsec,
            lyot: PupilMask::new(0.2, 0.9),
        }
    }
    pub fn lyot(self, lyot: PupilMask) -> Self {
        Self { lyot, ..self }
    }
}

struct Monochromatic {
    weight: f64,
    exit_total: f64,
    image: DMatrix<f64>,
}

/// Fraunhofer propagation with matrix Fourier transforms
///
/// The pupil field is normalized to a unit intensity over the unobscured
/// entrance disk. Coronagraphic masks use the Babinet formulation: the light
/// blocked by the spot is propagated back to the Lyot plane and subtracted.
/// Detector charge diffusion is modelled as a Gaussian blur of the
/// oversampled image.
#[derive(Debug, Clone, Default)]
pub struct Fraunhofer {
    pupil: Pupil,
    occulters: BTreeMap<String, Occulter>,
    pupil_masks: BTreeMap<String, PupilMask>,
    /// Charge diffusion standard deviation [detector px]
    charge_diffusion: f64,
}
impl Fraunhofer {
    pub fn new(pupil: Pupil) -> Self {
        Self {
            pupil,
            ..Default::default()
        }
    }
    pub fn occulter(mut self, name: impl ToString, occulter: Occulter) -> Self {
        self.occulters.insert(name.to_string(), occulter);
        self
    }
    pub fn pupil_mask(mut self, name: impl ToString, mask: PupilMask) -> Self {
        self.pupil_masks.insert(name.to_string(), mask);
        self
    }
    pub fn charge_diffusion(self, sigma: f64) -> Self {
        Self {
            charge_diffusion: sigma,
            ..self
        }
    }
    pub fn pupil(&self) -> &Pupil {
        &self.pupil
    }
    fn names<T>(map: &BTreeMap<String, T>) -> String {
        map.keys().cloned().collect::<Vec<_>>().join(", ")
    }
    fn masks(&self, config: &InstrumentConfig) -> Result<(Option<Occulter>, Option<PupilMask>)> {
        let occulter = config
            .image_mask
            .as_ref()
            .map(|name| {
                self.occulters.get(name).copied().ok_or_else(|| {
                    EngineError::UnknownImageMask(name.clone(), Self::names(&self.occulters))
                })
            })
            .transpose()?;
        let pupil_mask = config
            .pupil_mask
            .as_ref()
            .map(|name| {
                self.pupil_masks.get(name).copied().ok_or_else(|| {
                    EngineError::UnknownPupilMask(name.clone(), Self::names(&self.pupil_masks))
                })
            })
            .transpose()?;
        Ok((occulter, pupil_mask.or(occulter.map(|o| o.lyot))))
    }
    fn monochromatic(
        &self,
        request: &EngineRequest<'_>,
        entrance: &DMatrix<Complex<f64>>,
        occulter: Option<&Occulter>,
        stop: Option<&DMatrix<f64>>,
        wavelength: f64,
        weight: f64,
    ) -> Monochromatic {
        let plan = request.plan;
        let n = self.pupil.samples;
        // arcsec per λ/D
        let lod = wavelength / self.pupil.diameter / ARCSEC2RAD;
        let (x, y) = request.position.effective_offset.xy();
        let mut field = entrance.component_mul(&mft::tilt(n, (x / lod, y / lod)));

        if let Some(occulter) = occulter {
            let pixelscale = plan.fft_pixelscale();
            let half = (occulter.radius_arcsec / pixelscale).ceil() as usize + 1;
            let m = (2 * half + 1).min(plan.fft_grid());
            let du = pixelscale / lod;
            let c = 0.5 * (m as f64 - 1.);
            let spot = DMatrix::from_fn(m, m, |i, j| {
                let r = (i as f64 - c).hypot(j as f64 - c) * pixelscale;
                if r <= occulter.radius_arcsec {
                    1.
                } else {
                    0.
                }
            });
            let blocked = mft::forward(&field, m, du).zip_map(&spot, |e, s| e * s);
            field -= mft::inverse(&blocked, n, du);
        }
        if let Some(stop) = stop {
            field
                .iter_mut()
                .zip(stop.iter())
                .for_each(|(e, &s)| *e *= s);
        }
        let exit_total = field.iter().map(|e| e.norm_sqr()).sum::<f64>();

        let m = plan.oversampled_grid();
        let du = plan.oversampled_pixelscale() / lod;
        if m as f64 * du > n as f64 {
            request.trace.warn(format_args!(
                "{:.1}λ/D field of view aliased by the {n} samples pupil at {wavelength:e}m",
                m as f64 * du
            ));
        }
        let image = mft::forward(&field, m, du).map(|e| e.norm_sqr());
        Monochromatic {
            weight,
            exit_total,
            image,
        }
    }
}

/// Normalized Gaussian kernel sampled over +/- 3 sigma
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3. * sigma).ceil() as i64;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.into_iter().map(|k| k / total).collect()
}

/// Separable Gaussian blur, zero padded
fn blur(image: &DMatrix<f64>, sigma: f64) -> DMatrix<f64> {
    if sigma <= 0. {
        return image.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    let (rows, cols) = image.shape();
    let convolve = |src: &DMatrix<f64>, along_rows: bool| {
        DMatrix::from_fn(rows, cols, |i, j| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let d = k as i64 - radius;
                    let (ii, jj) = if along_rows {
                        (i as i64 + d, j as i64)
                    } else {
                        (i as i64, j as i64 + d)
                    };
                    (ii >= 0 && jj >= 0 && (ii as usize) < rows && (jj as usize) < cols)
                        .then(|| w * src[(ii as usize, jj as usize)])
                })
                .sum::<f64>()
        })
    };
    convolve(&convolve(image, true), false)
}

impl PropagationEngine for Fraunhofer {
    fn check(&self, config: &InstrumentConfig) -> Result<()> {
        self.pupil.check()?;
        self.masks(config).map(|_| ())
    }
    fn propagate(&self, request: &EngineRequest<'_>) -> Result<EngineOutput> {
        self.check(request.config)?;
        let (occulter, pupil_mask) = self.masks(request.config)?;

        let disk = self.pupil.disk().sum();
        let amplitude = disk.recip().sqrt();
        let entrance = self
            .pupil
            .transmission()
            .map(|t| Complex::new(t * amplitude, 0.));
        let stop = pupil_mask.map(|mask| mask.transmission(&self.pupil));
        if let Some(stop) = &stop {
            if stop.component_mul(&self.pupil.transmission()).sum() == 0. {
                return Err(EngineError::NoLight("exit pupil"));
            }
        }

        request.trace.debug(format_args!(
            "propagating {} wavelengths through a {}px pupil{}",
            request.spectrum.len(),
            self.pupil.samples,
            request
                .config
                .image_mask
                .as_ref()
                .map(|mask| format!(" and occulter {mask}"))
                .unwrap_or_default()
        ));
        let samples: Vec<(f64, f64)> = request.spectrum.iter().collect();
        let m = request.plan.oversampled_grid();
        let (exit_total, ideal_oversampled) = bounded_fold(
            &samples,
            request.config.limits.concurrent_fields,
            (0., DMatrix::<f64>::zeros(m, m)),
            |&(wavelength, weight)| {
                self.monochromatic(
                    request,
                    &entrance,
                    occulter.as_ref(),
                    stop.as_ref(),
                    wavelength,
                    weight,
                )
            },
            |(total, image), mono| {
                (
                    total + mono.weight * mono.exit_total,
                    image + mono.image * mono.weight,
                )
            },
        );
        if exit_total <= 0. {
            return Err(EngineError::NoLight("exit pupil"));
        }

        let os = request.plan.detector_oversample;
        let distorted_oversampled = blur(&ideal_oversampled, self.charge_diffusion * os as f64);
        Ok(EngineOutput {
            entrance_total: 1.,
            exit_total,
            ideal_detector: rebin(&ideal_oversampled, os),
            distorted_detector: rebin(&distorted_oversampled, os),
            ideal_oversampled,
            distorted_oversampled,
        })
    }
}
