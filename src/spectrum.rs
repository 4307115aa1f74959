//! Spectral weighting
//!
//! A calculation source is one of the [Source] variants. It is resolved once,
//! together with the filter response, into a [SpectrumSample]: the ordered
//! wavelengths and normalized weights the propagation engine iterates over.

use std::{fmt, sync::Arc};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{config::CalcParams, config::InstrumentConfig, trace::Trace};

mod filter;
pub use filter::{
    default_nlambda, parse_filter_name, FilterClass, FilterError, FilterProfile, FilterProfiles,
    FilterTable,
};

#[derive(Debug, thiserror::Error)]
pub enum SpectrumError {
    #[error("source wavelengths ({0}) and weights ({1}) have different lengths")]
    Length(usize, usize),
    #[error("source spectrum is empty")]
    Empty,
    #[error("source wavelength #{0} must be positive and finite, found {1}")]
    Wavelength(usize, f64),
    #[error("source weight #{0} must be non-negative and finite, found {1}")]
    Weight(usize, f64),
    #[error("source weights are all zero")]
    ZeroWeight,
    #[error("nlambda must be at least 1, found {0}")]
    Nlambda(usize),
    #[error("monochromatic wavelength must be positive and finite, found {0}")]
    Monochromatic(f64),
    #[error("a filter is required to weight a source spectrum")]
    NoFilter,
    #[error("filter profile lookup failed")]
    Filter(#[from] FilterError),
}
type Result<T> = std::result::Result<T, SpectrumError>;

/// Fraction of the filter peak throughput bounding the integration band
pub const BAND_THRESHOLD: f64 = 0.01;
/// Trapezoid sub-steps per wavelength bin
pub const BIN_SUBSTEPS: usize = 16;

const PLANCK: f64 = 6.62607015e-34;
const LIGHT_SPEED: f64 = 2.99792458e8;
const BOLTZMANN: f64 = 1.380649e-23;

/// Source spectral energy distribution
pub trait Spectrum: Send + Sync + fmt::Debug {
    /// Relative photon flux density at `wavelength` [m]
    fn photon_flux(&self, wavelength: f64) -> f64;
}

/// Constant photon flux density
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSpectrum;
impl Spectrum for FlatSpectrum {
    fn photon_flux(&self, _wavelength: f64) -> f64 {
        1.
    }
}

/// Black body photon radiance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blackbody {
    /// Temperature [K]
    pub temperature: f64,
}
impl Blackbody {
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }
}
impl Spectrum for Blackbody {
    fn photon_flux(&self, wavelength: f64) -> f64 {
        // B_lambda / (hc/lambda), constant factors dropped
        let x = PLANCK * LIGHT_SPEED / (wavelength * BOLTZMANN * self.temperature);
        1. / (wavelength.powi(4) * x.exp_m1())
    }
}

/// Photon flux density tabulated at increasing wavelengths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedSpectrum {
    wavelength: Vec<f64>,
    flux: Vec<f64>,
}
impl TabulatedSpectrum {
    pub fn new(wavelength: Vec<f64>, flux: Vec<f64>) -> Result<Self> {
        if wavelength.len() != flux.len() {
            return Err(SpectrumError::Length(wavelength.len(), flux.len()));
        }
        if wavelength.is_empty() {
            return Err(SpectrumError::Empty);
        }
        if let Some((i, &l)) = wavelength
            .iter()
            .enumerate()
            .find(|&(i, &l)| !(l.is_finite() && l > 0.) || (i > 0 && l <= wavelength[i - 1]))
        {
            return Err(SpectrumError::Wavelength(i, l));
        }
        if let Some((i, &f)) = flux
            .iter()
            .enumerate()
            .find(|&(_, &f)| !(f.is_finite() && f >= 0.))
        {
            return Err(SpectrumError::Weight(i, f));
        }
        Ok(Self { wavelength, flux })
    }
}
impl Spectrum for TabulatedSpectrum {
    fn photon_flux(&self, wavelength: f64) -> f64 {
        let w = &self.wavelength;
        let n = w.len();
        if wavelength < w[0] || wavelength > w[n - 1] {
            return 0.;
        }
        if n == 1 {
            return self.flux[0];
        }
        let i = w.partition_point(|&x| x <= wavelength).clamp(1, n - 1);
        let (l0, l1) = (w[i - 1], w[i]);
        let (f0, f1) = (self.flux[i - 1], self.flux[i]);
        f0 + (f1 - f0) * (wavelength - l0) / (l1 - l0)
    }
}

/// Explicit wavelengths [m] and weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    pub wavelengths: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Calculation source
#[derive(Debug, Clone)]
pub enum Source {
    /// Spectrum weighted by the filter response
    Spectrum(Arc<dyn Spectrum>),
    /// Wavelengths and weights used verbatim
    Table(WeightTable),
    /// `(wavelengths, weights)` used verbatim
    Pair(Vec<f64>, Vec<f64>),
}
impl Source {
    pub fn spectrum(spectrum: impl Spectrum + 'static) -> Self {
        Source::Spectrum(Arc::new(spectrum))
    }
}
impl From<WeightTable> for Source {
    fn from(table: WeightTable) -> Self {
        Source::Table(table)
    }
}
impl From<(Vec<f64>, Vec<f64>)> for Source {
    fn from((wavelengths, weights): (Vec<f64>, Vec<f64>)) -> Self {
        Source::Pair(wavelengths, weights)
    }
}

/// Ordered wavelengths [m] and weights summing to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSample {
    wavelengths: Vec<f64>,
    weights: Vec<f64>,
}
impl SpectrumSample {
    /// Validates the samples and normalizes the weights, preserving the order
    pub fn new(wavelengths: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if wavelengths.len() != weights.len() {
            return Err(SpectrumError::Length(wavelengths.len(), weights.len()));
        }
        if wavelengths.is_empty() {
            return Err(SpectrumError::Empty);
        }
        if let Some((i, &l)) = wavelengths
            .iter()
            .enumerate()
            .find(|&(_, &l)| !(l.is_finite() && l > 0.))
        {
            return Err(SpectrumError::Wavelength(i, l));
        }
        if let Some((i, &w)) = weights
            .iter()
            .enumerate()
            .find(|&(_, &w)| !(w.is_finite() && w >= 0.))
        {
            return Err(SpectrumError::Weight(i, w));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0. {
            return Err(SpectrumError::ZeroWeight);
        }
        Ok(Self {
            wavelengths,
            weights: weights.into_iter().map(|w| w / total).collect(),
        })
    }
    pub fn monochromatic(wavelength: f64) -> Result<Self> {
        if !(wavelength.is_finite() && wavelength > 0.) {
            return Err(SpectrumError::Monochromatic(wavelength));
        }
        Ok(Self {
            wavelengths: vec![wavelength],
            weights: vec![1.],
        })
    }
    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }
    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
    /// Iterator over `(wavelength, weight)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .cloned()
            .zip(self.weights.iter().cloned())
    }
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
    /// Weighted mean wavelength [m]
    pub fn mean_wavelength(&self) -> f64 {
        self.iter().map(|(l, w)| l * w).sum()
    }
}

/// Resolves the source of a calculation against the filter profiles
pub struct SpectralResolver<'a> {
    filters: &'a dyn FilterProfiles,
}
impl<'a> SpectralResolver<'a> {
    pub fn new(filters: &'a dyn FilterProfiles) -> Self {
        Self { filters }
    }
    pub fn resolve(
        &self,
        config: &InstrumentConfig,
        params: &CalcParams,
        trace: &Trace,
    ) -> Result<SpectrumSample> {
        if let Some(wavelength) = params.monochromatic {
            if params.source.is_some() {
                trace.warn(format_args!(
                    "monochromatic wavelength {wavelength:e}m overrides the source spectrum"
                ));
            }
            return SpectrumSample::monochromatic(wavelength);
        }
        // weight tables carry their own wavelengths
        let nlambda = || -> Result<usize> {
            match params
                .nlambda
                .unwrap_or_else(|| default_nlambda(config.filter.as_deref()))
            {
                0 => Err(SpectrumError::Nlambda(0)),
                n => Ok(n),
            }
        };
        let sample = match &params.source {
            Some(Source::Table(WeightTable {
                wavelengths,
                weights,
            }))
            | Some(Source::Pair(wavelengths, weights)) => {
                SpectrumSample::new(wavelengths.clone(), weights.clone())?
            }
            Some(Source::Spectrum(spectrum)) => {
                self.weigh(config, spectrum.as_ref(), nlambda()?)?
            }
            None => self.weigh(config, &FlatSpectrum, nlambda()?)?,
        };
        if let Some((lo, hi)) = sample
            .wavelengths()
            .iter()
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()
        {
            trace.debug(format_args!(
                "{} wavelengths in [{lo:.4e}, {hi:.4e}]m, mean {:.4e}m",
                sample.len(),
                sample.mean_wavelength()
            ));
        }
        Ok(sample)
    }
    fn weigh(
        &self,
        config: &InstrumentConfig,
        spectrum: &dyn Spectrum,
        nlambda: usize,
    ) -> Result<SpectrumSample> {
        let filter = config.filter.as_deref().ok_or(SpectrumError::NoFilter)?;
        let profile = self.filters.profile(filter)?;
        let (lo, hi) = profile.band(BAND_THRESHOLD);
        if hi <= lo {
            return SpectrumSample::monochromatic(lo);
        }
        let width = (hi - lo) / nlambda as f64;
        let h = width / BIN_SUBSTEPS as f64;
        let f = |l: f64| profile.at(l) * spectrum.photon_flux(l);
        let (wavelengths, weights): (Vec<f64>, Vec<f64>) = (0..nlambda)
            .map(|i| {
                let a = lo + width * i as f64;
                let integral = (0..BIN_SUBSTEPS)
                    .map(|j| {
                        let l = a + h * j as f64;
                        0.5 * h * (f(l) + f(l + h))
                    })
                    .sum::<f64>();
                (a + 0.5 * width, integral)
            })
            .unzip();
        SpectrumSample::new(wavelengths, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(filter: &str) -> InstrumentConfig {
        InstrumentConfig::builder("imager", "IMG1", 0.031)
            .filter(filter)
            .build()
            .unwrap()
    }

    #[test]
    fn monochromatic_ignores_nlambda() -> Result<()> {
        let filters = FilterTable::new();
        let params = CalcParams::new()
            .monochromatic(9.876e-6)
            .nlambda(7)
            .source(Source::spectrum(Blackbody::new(5800.)));
        let sample =
            SpectralResolver::new(&filters).resolve(&config("F1000W"), &params, &Trace::silent())?;
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.wavelengths(), &[9.876e-6]);
        assert_eq!(sample.weights(), &[1.]);
        Ok(())
    }

    #[test]
    fn default_nlambda_from_filter() -> Result<()> {
        let filters = FilterTable::new();
        let resolver = SpectralResolver::new(&filters);
        for (filter, n) in [("F200W", 10), ("F335M", 5), ("F187N", 3)] {
            let sample = resolver.resolve(&config(filter), &CalcParams::new(), &Trace::silent())?;
            assert_eq!(sample.len(), n, "{filter}");
            let total: f64 = sample.weights().iter().sum();
            assert!((total - 1.).abs() < 1e-12);
            assert!(sample.wavelengths().windows(2).all(|w| w[1] > w[0]));
        }
        Ok(())
    }

    #[test]
    fn flat_spectrum_through_top_hat() -> Result<()> {
        let filters = FilterTable::new();
        let sample = SpectralResolver::new(&filters).resolve(
            &config("F200W"),
            &CalcParams::new().nlambda(4),
            &Trace::silent(),
        )?;
        for w in sample.weights() {
            assert!((w - 0.25).abs() < 1e-3, "{w}");
        }
        assert!((sample.mean_wavelength() - 2e-6).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn blackbody_tilts_weights() -> Result<()> {
        let filters = FilterTable::new();
        // Rayleigh-Jeans tail: photon flux falls with wavelength
        let sample = SpectralResolver::new(&filters).resolve(
            &config("F1000W"),
            &CalcParams::new().source(Source::spectrum(Blackbody::new(5800.))),
            &Trace::silent(),
        )?;
        let w = sample.weights();
        assert!(w[0] > w[w.len() - 1]);
        Ok(())
    }

    #[test]
    fn pair_used_verbatim() -> Result<()> {
        let filters = FilterTable::new();
        let params = CalcParams::new().source((vec![3e-6, 1e-6, 2e-6], vec![2., 1., 1.]));
        let sample =
            SpectralResolver::new(&filters).resolve(&config("F200W"), &params, &Trace::silent())?;
        assert_eq!(sample.wavelengths(), &[3e-6, 1e-6, 2e-6]);
        assert_eq!(sample.weights(), &[0.5, 0.25, 0.25]);
        Ok(())
    }

    #[test]
    fn weight_tables_ignore_nlambda() -> Result<()> {
        let filters = FilterTable::new();
        let resolver = SpectralResolver::new(&filters);
        let table = WeightTable {
            wavelengths: vec![1.9e-6, 2.1e-6],
            weights: vec![1., 3.],
        };
        let params = CalcParams::new().source(table).nlambda(0);
        let sample = resolver.resolve(&config("F200W"), &params, &Trace::silent())?;
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.weights(), &[0.25, 0.75]);
        let flat = CalcParams::new().nlambda(0);
        assert!(matches!(
            resolver.resolve(&config("F200W"), &flat, &Trace::silent()),
            Err(SpectrumError::Nlambda(0))
        ));
        Ok(())
    }

    #[test]
    fn invalid_sources() {
        let filters = FilterTable::new();
        let resolver = SpectralResolver::new(&filters);
        let resolve = |source: Source| {
            resolver.resolve(
                &config("F200W"),
                &CalcParams::new().source(source),
                &Trace::silent(),
            )
        };
        assert!(matches!(
            resolve((vec![1e-6, 2e-6], vec![1.]).into()),
            Err(SpectrumError::Length(2, 1))
        ));
        assert!(matches!(
            resolve((Vec::<f64>::new(), Vec::<f64>::new()).into()),
            Err(SpectrumError::Empty)
        ));
        assert!(matches!(
            resolve((vec![1e-6, -2e-6], vec![1., 1.]).into()),
            Err(SpectrumError::Wavelength(1, _))
        ));
        assert!(matches!(
            resolve((vec![1e-6], vec![-1.]).into()),
            Err(SpectrumError::Weight(0, _))
        ));
        assert!(matches!(
            resolve(
                WeightTable {
                    wavelengths: vec![1e-6],
                    weights: vec![0.]
                }
                .into()
            ),
            Err(SpectrumError::ZeroWeight)
        ));
        assert!(matches!(
            resolver.resolve(
                &config("F200W"),
                &CalcParams::new().nlambda(0),
                &Trace::silent()
            ),
            Err(SpectrumError::Nlambda(0))
        ));
        let no_filter = InstrumentConfig::builder("imager", "IMG1", 0.031)
            .build()
            .unwrap();
        assert!(matches!(
            resolver.resolve(&no_filter, &CalcParams::new(), &Trace::silent()),
            Err(SpectrumError::NoFilter)
        ));
    }

    #[test]
    fn tabulated_spectrum() -> Result<()> {
        let spectrum = TabulatedSpectrum::new(vec![1e-6, 2e-6], vec![1., 3.])?;
        assert!((spectrum.photon_flux(1.5e-6) - 2.).abs() < 1e-12);
        assert_eq!(spectrum.photon_flux(2.5e-6), 0.);
        assert!(TabulatedSpectrum::new(vec![2e-6, 1e-6], vec![1., 1.]).is_err());
        Ok(())
    }
}
