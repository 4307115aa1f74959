use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::OutputMode;

/// Image planes of a PSF product
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumIter, EnumString, Display)]
pub enum PlaneKind {
    /// Ideal oversampled image
    #[strum(to_string = "OVERSAMP")]
    Oversampled,
    /// Ideal detector sampled image
    #[strum(to_string = "DET_SAMP")]
    DetectorSampled,
    /// Distorted oversampled image
    #[strum(to_string = "OVERDIST")]
    OversampledDistorted,
    /// Distorted detector sampled image
    #[strum(to_string = "DET_DIST")]
    DetectorDistorted,
}
impl PlaneKind {
    /// Planes of an output mode, in product order
    pub fn for_mode(mode: OutputMode) -> Vec<PlaneKind> {
        use PlaneKind::*;
        match mode {
            OutputMode::Oversampled => vec![Oversampled, OversampledDistorted],
            OutputMode::DetectorSampled => vec![DetectorSampled, DetectorDistorted],
            OutputMode::Both => vec![
                Oversampled,
                DetectorSampled,
                OversampledDistorted,
                DetectorDistorted,
            ],
        }
    }
    pub fn is_oversampled(&self) -> bool {
        matches!(
            self,
            PlaneKind::Oversampled | PlaneKind::OversampledDistorted
        )
    }
    pub fn is_distorted(&self) -> bool {
        matches!(
            self,
            PlaneKind::OversampledDistorted | PlaneKind::DetectorDistorted
        )
    }
}

/// Plane metadata
///
/// Offsets and shifts are in arcsec, angles in degrees, wavelengths in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneHeader {
    pub extname: String,
    pub instrument: String,
    /// Oversampling of the plane with respect to the detector pixels
    pub oversample: usize,
    /// Plane pixel scale [arcsec/px]
    pub pixelscale: f64,
    pub normalization: String,
    pub source_offset_r: f64,
    pub source_offset_theta: f64,
    pub source_offset_x: f64,
    pub source_offset_y: f64,
    pub effective_offset_x: f64,
    pub effective_offset_y: f64,
    pub coron_shift_x: f64,
    pub coron_shift_y: f64,
    pub detector: String,
    pub aperture: String,
    pub detector_position: (usize, usize),
    pub filter: Option<String>,
    pub image_mask: Option<String>,
    pub pupil_mask: Option<String>,
    pub wavelengths: Vec<f64>,
    pub weights: Vec<f64>,
    pub nlambda: usize,
    pub fov_pixels: usize,
    pub fov_arcsec: f64,
    /// Wavelength of each datacube slice, by slice index
    pub slice_wavelengths: BTreeMap<usize, f64>,
}

/// One image plane, a single image or a datacube
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub kind: PlaneKind,
    pub header: PlaneHeader,
    pub slices: Vec<DMatrix<f64>>,
    /// Datacube planes keep their wavelength axis, even with a single slice
    pub cube: bool,
}
impl Plane {
    /// The first (or only) image
    pub fn image(&self) -> &DMatrix<f64> {
        &self.slices[0]
    }
    pub fn is_cube(&self) -> bool {
        self.cube
    }
    /// Array shape, `[ny, nx]` or `[nλ, ny, nx]`
    pub fn shape(&self) -> Vec<u64> {
        let (ny, nx) = self.image().shape();
        if self.is_cube() {
            vec![self.slices.len() as u64, ny as u64, nx as u64]
        } else {
            vec![ny as u64, nx as u64]
        }
    }
    /// Sum of every slice
    pub fn totals(&self) -> Vec<f64> {
        self.slices.iter().map(|slice| slice.sum()).collect()
    }
}
