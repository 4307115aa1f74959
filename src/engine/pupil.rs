use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::{EngineError, Result};

/// Telescope entrance pupil
///
/// A circular aperture with a central obscuration and evenly spaced spiders,
/// sampled over `samples` points across the diameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pupil {
    /// Diameter [m]
    pub diameter: f64,
    /// Central obscuration diameter as a fraction of the pupil diameter
    pub obscuration: f64,
    pub spiders: usize,
    /// Spider width as a fraction of the pupil diameter
    pub spider_width: f64,
    pub samples: usize,
}
impl Default for Pupil {
    fn default() -> Self {
        Self {
            diameter: 6.5,
            obscuration: 0.1,
            spiders: 3,
            spider_width: 0.01,
            samples: 256,
        }
    }
}
impl Pupil {
    pub fn new(diameter: f64) -> Self {
        Self {
            diameter,
            ..Default::default()
        }
    }
    pub fn obscuration(self, obscuration: f64) -> Self {
        Self {
            obscuration,
            ..self
        }
    }
    pub fn spiders(self, spiders: usize, spider_width: f64) -> Self {
        Self {
            spiders,
            spider_width,
            ..self
        }
    }
    pub fn samples(self, samples: usize) -> Self {
        Self { samples, ..self }
    }
    pub(super) fn check(&self) -> Result<()> {
        if !(self.diameter.is_finite() && self.diameter > 0.) {
            return Err(EngineError::Pupil("diameter must be positive"));
        }
        if !(0f64..1.).contains(&self.obscuration) {
            return Err(EngineError::Pupil("obscuration must be in [0, 1)"));
        }
        if !(0f64..1.).contains(&self.spider_width) {
            return Err(EngineError::Pupil("spider width must be in [0, 1)"));
        }
        if self.samples < 8 {
            return Err(EngineError::Pupil("at least 8 samples are required"));
        }
        Ok(())
    }
    /// Normalized coordinates `(x, y)` of pupil sample `(i, j)`, the pupil radius being 1
    pub(super) fn coordinates(&self, i: usize, j: usize) -> (f64, f64) {
        let n = self.samples as f64;
        let c = 0.5 * (n - 1.);
        (2. * (j as f64 - c) / n, 2. * (i as f64 - c) / n)
    }
    /// Unobscured disk transmission
    pub(super) fn disk(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.samples, self.samples, |i, j| {
            let (x, y) = self.coordinates(i, j);
            if x.hypot(y) <= 1. {
                1.
            } else {
                0.
            }
        })
    }
    /// Primary mirror transmission, obscuration and spiders included
    pub(super) fn transmission(&self) -> DMatrix<f64> {
        let half_width = self.spider_width;
        let angles: Vec<_> = (0..self.spiders)
            .map(|k| std::f64::consts::TAU * k as f64 / self.spiders as f64)
            .collect();
        let mut t = self.disk();
        for i in 0..self.samples {
            for j in 0..self.samples {
                let (x, y) = self.coordinates(i, j);
                let r = x.hypot(y);
                let in_spider = angles.iter().any(|a| {
                    let (s, c) = a.sin_cos();
                    // distance to the spider ray from the center along (-sin a, cos a)
                    let along = -x * s + y * c;
                    let across = x * c + y * s;
                    along >= 0. && across.abs() <= half_width
                });
                if r < self.obscuration || in_spider {
                    t[(i, j)] = 0.;
                }
            }
        }
        t
    }
}

/// Annular pupil plane stop, radii as fractions of the pupil radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PupilMask {
    pub inner: f64,
    pub outer: f64,
}
impl PupilMask {
    pub fn new(inner: f64, outer: f64) -> Self {
        Self { inner, outer }
    }
    pub(super) fn transmission(&self, pupil: &Pupil) -> DMatrix<f64> {
        DMatrix::from_fn(pupil.samples, pupil.samples, |i, j| {
            let (x, y) = pupil.coordinates(i, j);
            let r = x.hypot(y);
            if r >= self.inner && r <= self.outer {
                1.
            } else {
                0.
            }
        })
    }
}
