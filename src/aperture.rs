//! Aperture geometry
//!
//! An aperture names a sub-array of a detector and its reference pixel.
//! Every detector owns a full-frame aperture called `<DETECTOR>_FULL`.

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApertureError {
    #[error("failed to open aperture table {1:?}")]
    Io(#[source] std::io::Error, PathBuf),
    #[error("failed to deserialize the aperture table")]
    Csv(#[from] csv::Error),
    #[error("invalid aperture regex")]
    Regex(#[from] regex::Error),
    #[error(r#"aperture name {0:?} doesn't match the "<DETECTOR>_<SUBARRAY>" pattern"#)]
    Name(String),
    #[error("aperture {0} refers to unknown detector {1}")]
    UnknownDetector(String, String),
    #[error("aperture {0} sub-array {1} exceeds the {2}x{3} detector")]
    Bounds(String, SubarrayBounds, usize, usize),
    #[error("full-frame aperture {0} has empty bounds {1}")]
    EmptyFrame(String, SubarrayBounds),
}
type Result<T> = std::result::Result<T, ApertureError>;

/// Sub-array pixel bounds, `[x0, x1) x [y0, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubarrayBounds {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}
impl SubarrayBounds {
    pub fn full(nx: usize, ny: usize) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: nx,
            y1: ny,
        }
    }
    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }
    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }
    pub fn contains(&self, (x, y): (usize, usize)) -> bool {
        (self.x0..self.x1).contains(&x) && (self.y0..self.y1).contains(&y)
    }
    /// Sub-array center pixel
    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.x0 + self.x1) as f64,
            0.5 * (self.y0 + self.y1) as f64,
        )
    }
}
impl std::fmt::Display for SubarrayBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{},{}:{}]", self.x0, self.x1, self.y0, self.y1)
    }
}

/// A named detector sub-array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aperture {
    pub name: String,
    pub detector: String,
    /// Reference pixel, may be fractional
    pub center: (f64, f64),
    pub subarray: SubarrayBounds,
}
impl Aperture {
    pub fn full_frame(detector: &str, (nx, ny): (usize, usize)) -> Self {
        let subarray = SubarrayBounds::full(nx, ny);
        Self {
            name: format!("{detector}_FULL"),
            detector: detector.to_string(),
            center: subarray.center(),
            subarray,
        }
    }
}

/// Aperture-geometry lookup
pub trait ApertureGeometry: Send + Sync {
    /// Looks up an aperture by name
    fn aperture(&self, name: &str) -> Option<Aperture>;
    /// Detector size in pixels, `(nx, ny)`
    fn detector_size(&self, detector: &str) -> Option<(usize, usize)>;
    /// The full-frame aperture of a detector
    fn full_frame(&self, detector: &str) -> Option<Aperture> {
        self.aperture(&format!("{detector}_FULL")).or_else(|| {
            self.detector_size(detector)
                .map(|size| Aperture::full_frame(detector, size))
        })
    }
}

#[derive(Deserialize, Debug)]
struct Record {
    #[serde(rename = "Aperture")]
    name: String,
    #[serde(rename = "Detector")]
    detector: String,
    #[serde(rename = "X center (px)")]
    x_center: f64,
    #[serde(rename = "Y center (px)")]
    y_center: f64,
    #[serde(rename = "X0 (px)")]
    x0: usize,
    #[serde(rename = "Y0 (px)")]
    y0: usize,
    #[serde(rename = "X1 (px)")]
    x1: usize,
    #[serde(rename = "Y1 (px)")]
    y1: usize,
}

/// In-memory aperture table
#[derive(Debug, Clone, Default)]
pub struct ApertureTable {
    detectors: BTreeMap<String, (usize, usize)>,
    apertures: BTreeMap<String, Aperture>,
}
impl ApertureTable {
    pub fn new() -> Self {
        Default::default()
    }
    /// Adds a detector and its full-frame aperture
    pub fn detector(mut self, name: impl ToString, size: (usize, usize)) -> Self {
        let name = name.to_string();
        let full = Aperture::full_frame(&name, size);
        self.apertures.insert(full.name.clone(), full);
        self.detectors.insert(name, size);
        self
    }
    /// Adds a sub-array aperture
    ///
    /// The detector must already be in the table and the sub-array must fit
    /// inside it.
    pub fn with_aperture(mut self, aperture: Aperture) -> Result<Self> {
        let re = Regex::new(r"^[A-Z0-9]+_[A-Z0-9_]+$")?;
        if !re.is_match(&aperture.name) {
            return Err(ApertureError::Name(aperture.name));
        }
        let &(nx, ny) = self.detectors.get(&aperture.detector).ok_or_else(|| {
            ApertureError::UnknownDetector(aperture.name.clone(), aperture.detector.clone())
        })?;
        let SubarrayBounds { x0, y0, x1, y1 } = aperture.subarray;
        if x1 > nx || y1 > ny || x0 >= x1 || y0 >= y1 {
            return Err(ApertureError::Bounds(
                aperture.name,
                aperture.subarray,
                nx,
                ny,
            ));
        }
        self.apertures.insert(aperture.name.clone(), aperture);
        Ok(self)
    }
    /// Loads an aperture table from a CSV file
    ///
    /// Rows named `<DETECTOR>_FULL` declare the detectors, their size being
    /// given by the sub-array bounds; they are read before any other row.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| ApertureError::Io(e, path.as_ref().to_path_buf()))?;
        let mut rdr = csv::Reader::from_reader(file);
        let mut rows = Vec::<Record>::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        let (full, sub): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|row| row.name == format!("{}_FULL", row.detector));
        let mut this = Self::new();
        for row in full {
            let bounds = SubarrayBounds {
                x0: row.x0,
                y0: row.y0,
                x1: row.x1,
                y1: row.y1,
            };
            if bounds.width() == 0 || bounds.height() == 0 {
                return Err(ApertureError::EmptyFrame(row.name, bounds));
            }
            this = this.detector(row.detector, (bounds.width(), bounds.height()));
        }
        for row in sub {
            this = this.with_aperture(Aperture {
                name: row.name,
                detector: row.detector,
                center: (row.x_center, row.y_center),
                subarray: SubarrayBounds {
                    x0: row.x0,
                    y0: row.y0,
                    x1: row.x1,
                    y1: row.y1,
                },
            })?;
        }
        log::info!(
            "loaded {} apertures over {} detectors from {:?}",
            this.apertures.len(),
            this.detectors.len(),
            path.as_ref()
        );
        Ok(this)
    }
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.apertures.keys().map(|k| k.as_str())
    }
}
impl ApertureGeometry for ApertureTable {
    fn aperture(&self, name: &str) -> Option<Aperture> {
        self.apertures.get(name).cloned()
    }
    fn detector_size(&self, detector: &str) -> Option<(usize, usize)> {
        self.detectors.get(detector).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn table() -> ApertureTable {
        ApertureTable::new()
            .detector("IMG1", (2048, 2048))
            .with_aperture(Aperture {
                name: "IMG1_SUB64".into(),
                detector: "IMG1".into(),
                center: (32.5, 2015.5),
                subarray: SubarrayBounds {
                    x0: 0,
                    y0: 1984,
                    x1: 64,
                    y1: 2048,
                },
            })
            .unwrap()
    }

    #[test]
    fn full_frame_default() {
        let table = table();
        let full = table.full_frame("IMG1").unwrap();
        assert_eq!(full.name, "IMG1_FULL");
        assert_eq!(full.center, (1024., 1024.));
        assert!(table.full_frame("IMG9").is_none());
    }

    #[test]
    fn rejected_apertures() {
        let sub = |detector: &str, x1| Aperture {
            name: "IMG1_WIDE".into(),
            detector: detector.into(),
            center: (0., 0.),
            subarray: SubarrayBounds {
                x0: 0,
                y0: 0,
                x1,
                y1: 10,
            },
        };
        assert!(matches!(
            table().with_aperture(sub("IMG1", 4096)),
            Err(ApertureError::Bounds(..))
        ));
        assert!(matches!(
            table().with_aperture(sub("IMG7", 10)),
            Err(ApertureError::UnknownDetector(..))
        ));
        let mut bad = sub("IMG1", 10);
        bad.name = "img1 wide".into();
        assert!(matches!(table().with_aperture(bad), Err(ApertureError::Name(_))));
    }

    #[test]
    fn csv_table() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = std::env::temp_dir().join("psf_calc_apertures.csv");
        let mut file = File::create(&path)?;
        writeln!(
            file,
            "Aperture,Detector,X center (px),Y center (px),X0 (px),Y0 (px),X1 (px),Y1 (px)"
        )?;
        writeln!(file, "IMG2_SUB160,IMG2,80.0,80.0,0,0,160,160")?;
        writeln!(file, "IMG2_FULL,IMG2,1024.0,1024.0,0,0,2048,2048")?;
        drop(file);
        let table = ApertureTable::from_csv(&path)?;
        assert_eq!(table.detector_size("IMG2"), Some((2048, 2048)));
        let sub = table.aperture("IMG2_SUB160").unwrap();
        assert_eq!(sub.subarray.width(), 160);
        assert!(sub.subarray.contains((80, 80)));
        Ok(())
    }

    #[test]
    fn csv_inverted_full_frame() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = std::env::temp_dir().join("psf_calc_apertures_inverted.csv");
        let mut file = File::create(&path)?;
        writeln!(
            file,
            "Aperture,Detector,X center (px),Y center (px),X0 (px),Y0 (px),X1 (px),Y1 (px)"
        )?;
        writeln!(file, "IMG2_FULL,IMG2,1024,1024,2048,0,0,2048")?;
        drop(file);
        assert!(matches!(
            ApertureTable::from_csv(&path),
            Err(ApertureError::EmptyFrame(name, _)) if name == "IMG2_FULL"
        ));
        Ok(())
    }
}
