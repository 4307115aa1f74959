//! PSF products
//!
//! A [PsfProduct] bundles up to four image planes, selected by the
//! [OutputMode](crate::OutputMode) option:
//!  - `OVERSAMP`: ideal image at the oversampled pixel scale
//!  - `DET_SAMP`: ideal image at the detector pixel scale
//!  - `OVERDIST`: distorted image at the oversampled pixel scale
//!  - `DET_DIST`: distorted image at the detector pixel scale
//!
//! Each plane is either one image or a datacube of monochromatic images.

use std::{collections::BTreeMap, path::PathBuf};

use nalgebra::DMatrix;

use crate::{
    config::InstrumentConfig, engine::EngineOutput, normalization::Normalization,
    position::ResolvedPosition, sampling::SamplingPlan, spectrum::SpectrumSample,
};

mod plane;
mod writer;
pub use plane::{Plane, PlaneHeader, PlaneKind};
pub use writer::header_path;

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("failed to access {1:?}")]
    Io(#[source] std::io::Error, PathBuf),
    #[error("failed to (de)serialize the plane headers")]
    Pickle(#[from] serde_pickle::Error),
    #[error("plane {0} not found in {1:?}")]
    Missing(String, PathBuf),
    #[error("plane {0} has an invalid shape {1:?}")]
    Shape(String, Vec<usize>),
    #[error("cannot stack an empty list of products")]
    EmptyStack,
    #[error("cannot stack products with different {0}")]
    Mismatch(&'static str),
}
pub type Result<T> = std::result::Result<T, ProductError>;

/// Calculation context recorded in the plane headers
#[derive(Debug, Clone, Copy)]
pub struct ProductContext<'a> {
    pub config: &'a InstrumentConfig,
    pub position: &'a ResolvedPosition,
    pub plan: &'a SamplingPlan,
    pub spectrum: &'a SpectrumSample,
    pub normalization: Normalization,
}
impl<'a> ProductContext<'a> {
    fn header(&self, kind: PlaneKind) -> PlaneHeader {
        let Self {
            config,
            position,
            plan,
            spectrum,
            normalization,
        } = *self;
        let (oversample, pixelscale) = if kind.is_oversampled() {
            (plan.detector_oversample, plan.oversampled_pixelscale())
        } else {
            (1, plan.pixelscale)
        };
        let (source_offset_r, source_offset_theta) = position.source_offset.r_theta();
        let (source_offset_x, source_offset_y) = position.source_offset.xy();
        let (effective_offset_x, effective_offset_y) = position.effective_offset.xy();
        PlaneHeader {
            extname: kind.to_string(),
            instrument: config.instrument.clone(),
            oversample,
            pixelscale,
            normalization: normalization.to_string(),
            source_offset_r,
            source_offset_theta,
            source_offset_x,
            source_offset_y,
            effective_offset_x,
            effective_offset_y,
            coron_shift_x: position.coron_shift.0,
            coron_shift_y: position.coron_shift.1,
            detector: position.detector.clone(),
            aperture: position.aperture.clone(),
            detector_position: position.detector_position,
            filter: config.filter.clone(),
            image_mask: config.image_mask.clone(),
            pupil_mask: config.pupil_mask.clone(),
            wavelengths: spectrum.wavelengths().to_vec(),
            weights: spectrum.weights().to_vec(),
            nlambda: spectrum.len(),
            fov_pixels: plan.detector_grid,
            fov_arcsec: plan.fov_arcsec(),
            slice_wavelengths: BTreeMap::new(),
        }
    }
}

/// Multi-plane PSF product
#[derive(Debug, Clone, PartialEq)]
pub struct PsfProduct {
    planes: Vec<Plane>,
}
impl PsfProduct {
    /// Packages the normalized engine output according to the output mode
    pub fn assemble(output: EngineOutput, context: &ProductContext<'_>) -> Self {
        let EngineOutput {
            ideal_oversampled,
            ideal_detector,
            distorted_oversampled,
            distorted_detector,
            ..
        } = output;
        let mut images: BTreeMap<PlaneKind, DMatrix<f64>> = [
            (PlaneKind::Oversampled, ideal_oversampled),
            (PlaneKind::DetectorSampled, ideal_detector),
            (PlaneKind::OversampledDistorted, distorted_oversampled),
            (PlaneKind::DetectorDistorted, distorted_detector),
        ]
        .into_iter()
        .collect();
        let planes = PlaneKind::for_mode(context.config.options.output_mode)
            .into_iter()
            .filter_map(|kind| {
                images.remove(&kind).map(|image| Plane {
                    kind,
                    header: context.header(kind),
                    slices: vec![image],
                    cube: false,
                })
            })
            .collect();
        Self { planes }
    }
    /// Stacks single-wavelength products into datacubes
    ///
    /// Slice `i` of every plane comes from `products[i]`; its wavelength is
    /// recorded under key `i` of the header `slice_wavelengths`.
    pub fn stack(products: Vec<PsfProduct>) -> Result<Self> {
        let mut products = products.into_iter();
        let mut cube = products.next().ok_or(ProductError::EmptyStack)?;
        for plane in cube.planes.iter_mut() {
            plane.cube = true;
            plane.header.slice_wavelengths =
                BTreeMap::from([(0, mean_wavelength(&plane.header))]);
        }
        for product in products {
            if product.planes.len() != cube.planes.len() {
                return Err(ProductError::Mismatch("planes"));
            }
            for (plane, slice) in cube.planes.iter_mut().zip(product.planes) {
                if plane.kind != slice.kind {
                    return Err(ProductError::Mismatch("planes"));
                }
                if plane.image().shape() != slice.image().shape() {
                    return Err(ProductError::Mismatch("image shapes"));
                }
                let index = plane.slices.len();
                plane
                    .header
                    .slice_wavelengths
                    .insert(index, mean_wavelength(&slice.header));
                plane.slices.extend(slice.slices);
            }
        }
        for plane in cube.planes.iter_mut() {
            let header = &mut plane.header;
            header.wavelengths = header.slice_wavelengths.values().cloned().collect();
            header.weights = vec![1.; header.wavelengths.len()];
            header.nlambda = header.wavelengths.len();
        }
        Ok(cube)
    }
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }
    pub fn plane(&self, kind: PlaneKind) -> Option<&Plane> {
        self.planes.iter().find(|plane| plane.kind == kind)
    }
    pub fn len(&self) -> usize {
        self.planes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}

fn mean_wavelength(header: &PlaneHeader) -> f64 {
    header
        .wavelengths
        .iter()
        .zip(&header.weights)
        .map(|(l, w)| l * w)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aperture::ApertureTable, position::PositionResolver, CalcParams, OutputMode, Trace,
    };

    fn output(n: usize, os: usize) -> EngineOutput {
        let image = DMatrix::from_fn(n * os, n * os, |i, j| (i + j) as f64);
        EngineOutput {
            entrance_total: 1.,
            exit_total: 1.,
            ideal_detector: crate::engine::rebin(&image, os),
            distorted_detector: crate::engine::rebin(&image, os) * 0.5,
            distorted_oversampled: &image * 0.5,
            ideal_oversampled: image,
        }
    }

    fn assemble(mode: OutputMode, wavelength: f64) -> PsfProduct {
        let config = InstrumentConfig::builder("imager", "IMG1", 0.031)
            .option("output_mode", &mode.to_string())
            .unwrap()
            .option("source_offset_r", "0.5")
            .unwrap()
            .build()
            .unwrap();
        let apertures = ApertureTable::new().detector("IMG1", (2048, 2048));
        let trace = Trace::silent();
        let position = PositionResolver::new(&apertures)
            .resolve(&config, &trace)
            .unwrap();
        let plan = SamplingPlan::new(
            &config,
            &CalcParams::new().fov_pixels(8).oversample(2),
            &trace,
        )
        .unwrap();
        let spectrum = SpectrumSample::monochromatic(wavelength).unwrap();
        let context = ProductContext {
            config: &config,
            position: &position,
            plan: &plan,
            spectrum: &spectrum,
            normalization: Normalization::Last,
        };
        PsfProduct::assemble(output(8, 2), &context)
    }

    #[test]
    fn planes_per_mode() {
        let both = assemble(OutputMode::Both, 2e-6);
        let names: Vec<_> = both.planes().iter().map(|p| p.kind.to_string()).collect();
        assert_eq!(names, ["OVERSAMP", "DET_SAMP", "OVERDIST", "DET_DIST"]);
        assert_eq!(assemble(OutputMode::Oversampled, 2e-6).len(), 2);
        let det = assemble(OutputMode::DetectorSampled, 2e-6);
        assert_eq!(det.len(), 2);
        assert!(det.plane(PlaneKind::Oversampled).is_none());
        assert_eq!(det.planes()[0].image().shape(), (8, 8));
    }

    #[test]
    fn headers() {
        let product = assemble(OutputMode::Both, 2e-6);
        let over = &product.plane(PlaneKind::Oversampled).unwrap().header;
        assert_eq!(over.oversample, 2);
        assert!((over.pixelscale - 0.0155).abs() < 1e-12);
        assert_eq!(over.normalization, "last");
        assert!((over.source_offset_r - 0.5).abs() < 1e-12);
        assert!((over.source_offset_y - 0.5).abs() < 1e-12);
        assert_eq!(over.aperture, "IMG1_FULL");
        assert_eq!(over.detector_position, (1024, 1024));
        let det = &product.plane(PlaneKind::DetectorDistorted).unwrap().header;
        assert_eq!(det.oversample, 1);
        assert_eq!(det.fov_pixels, 8);
        assert!((det.fov_arcsec - 0.248).abs() < 1e-12);
    }

    #[test]
    fn datacube() -> Result<()> {
        let cube = PsfProduct::stack(vec![
            assemble(OutputMode::Both, 2e-6),
            assemble(OutputMode::Both, 3e-6),
            assemble(OutputMode::Both, 4e-6),
        ])?;
        let plane = cube.plane(PlaneKind::DetectorSampled).unwrap();
        assert!(plane.is_cube());
        assert_eq!(plane.shape(), vec![3, 8, 8]);
        assert_eq!(plane.header.slice_wavelengths.get(&2), Some(&4e-6));
        assert_eq!(plane.header.nlambda, 3);
        assert!(!assemble(OutputMode::Both, 2e-6).planes()[0].is_cube());
        let one = PsfProduct::stack(vec![assemble(OutputMode::Both, 2e-6)])?;
        let plane = one.plane(PlaneKind::DetectorSampled).unwrap();
        assert!(plane.is_cube());
        assert_eq!(plane.shape(), vec![1, 8, 8]);
        assert!(matches!(
            PsfProduct::stack(vec![]),
            Err(ProductError::EmptyStack)
        ));
        assert!(matches!(
            PsfProduct::stack(vec![
                assemble(OutputMode::Both, 2e-6),
                assemble(OutputMode::Oversampled, 3e-6),
            ]),
            Err(ProductError::Mismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn save_and_load() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = std::env::temp_dir().join("psf_calc_product");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("psf.npz");
        let cube = PsfProduct::stack(vec![
            assemble(OutputMode::Both, 2e-6),
            assemble(OutputMode::Both, 3e-6),
        ])?;
        cube.save(&path)?;
        assert!(header_path(&path).ends_with("psf.header.pkl"));
        let loaded = PsfProduct::load_plane(&path, PlaneKind::OversampledDistorted)?;
        assert_eq!(&loaded, cube.plane(PlaneKind::OversampledDistorted).unwrap());
        let one = PsfProduct::stack(vec![assemble(OutputMode::Oversampled, 2e-6)])?;
        let path = dir.join("one.npz");
        one.save(&path)?;
        let loaded = PsfProduct::load_plane(&path, PlaneKind::Oversampled)?;
        assert!(loaded.is_cube());
        assert_eq!(loaded.shape(), vec![1, 16, 16]);
        assert_eq!(&loaded, one.plane(PlaneKind::Oversampled).unwrap());

        let single = assemble(OutputMode::DetectorSampled, 2e-6);
        let path = dir.join("det.npz");
        single.save(&path)?;
        let loaded = PsfProduct::load_plane(&path, PlaneKind::DetectorSampled)?;
        assert_eq!(loaded.shape(), vec![8, 8]);
        assert_eq!(loaded.image(), single.planes()[0].image());
        assert!(matches!(
            PsfProduct::load_plane(&path, PlaneKind::Oversampled),
            Err(ProductError::Missing(..))
        ));
        Ok(())
    }
}
