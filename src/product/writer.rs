use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};

use nalgebra::DMatrix;
use npyz::{
    npz::{NpzArchive, NpzWriter},
    WriterBuilder,
};

use super::{Plane, PlaneHeader, PlaneKind, ProductError, PsfProduct, Result};

/// Path of the pickled headers next to an `.npz` product
pub fn header_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.header.pkl"))
}

impl PsfProduct {
    /// Writes the product to an `.npz` archive and its headers to `<stem>.header.pkl`
    ///
    /// Images are stored row-major with shape `[ny, nx]`, datacubes with
    /// shape `[nλ, ny, nx]`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let io_err = |e| ProductError::Io(e, path.to_path_buf());
        let mut npz = NpzWriter::create(path).map_err(io_err)?;
        for plane in self.planes() {
            let mut writer = npz
                .array(&plane.kind.to_string(), Default::default())
                .map_err(io_err)?
                .default_dtype()
                .shape(&plane.shape())
                .begin_nd()
                .map_err(io_err)?;
            for slice in &plane.slices {
                writer
                    .extend(slice.transpose().iter().cloned())
                    .map_err(io_err)?;
            }
            writer.finish().map_err(io_err)?;
        }
        drop(npz);

        let headers: BTreeMap<String, &PlaneHeader> = self
            .planes()
            .iter()
            .map(|plane| (plane.kind.to_string(), &plane.header))
            .collect();
        let pkl = header_path(path);
        let mut file = File::create(&pkl).map_err(|e| ProductError::Io(e, pkl.clone()))?;
        serde_pickle::to_writer(&mut file, &headers, Default::default())?;
        log::info!(
            "PSF product with {} planes saved to {:?} (headers: {:?})",
            self.len(),
            path,
            pkl
        );
        Ok(())
    }
    /// Reads one plane of a product saved with [PsfProduct::save]
    pub fn load_plane<P: AsRef<Path>>(path: P, kind: PlaneKind) -> Result<Plane> {
        let path = path.as_ref();
        let io_err = |e| ProductError::Io(e, path.to_path_buf());
        let name = kind.to_string();

        let pkl = header_path(path);
        let mut file = File::open(&pkl).map_err(|e| ProductError::Io(e, pkl.clone()))?;
        let mut headers: BTreeMap<String, PlaneHeader> =
            serde_pickle::from_reader(&mut file, Default::default())?;
        let header = headers
            .remove(&name)
            .ok_or_else(|| ProductError::Missing(name.clone(), path.to_path_buf()))?;

        let mut npz = NpzArchive::open(path).map_err(io_err)?;
        let npy = npz
            .by_name(&name)
            .map_err(io_err)?
            .ok_or_else(|| ProductError::Missing(name.clone(), path.to_path_buf()))?;
        let shape: Vec<usize> = npy.shape().iter().map(|&s| s as usize).collect();
        let data = npy.into_vec::<f64>().map_err(io_err)?;
        let cube = shape.len() == 3;
        let dims = match *shape.as_slice() {
            [ny, nx] => Some((1, ny, nx)),
            [depth, ny, nx] => Some((depth, ny, nx)),
            _ => None,
        };
        let Some((ny, nx)) = dims
            .filter(|&(depth, ny, nx)| depth * ny * nx > 0 && data.len() == depth * ny * nx)
            .map(|(_, ny, nx)| (ny, nx))
        else {
            return Err(ProductError::Shape(name, shape));
        };
        let slices = data
            .chunks(ny * nx)
            .map(|chunk| DMatrix::from_row_slice(ny, nx, chunk))
            .collect();
        Ok(Plane {
            kind: PlaneKind::from_str(&header.extname).unwrap_or(kind),
            header,
            slices,
            cube,
        })
    }
}
