use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("failed to read filter profile {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to deserialize the filter profile")]
    Csv(#[from] csv::Error),
    #[error("invalid filter name regex")]
    Regex(#[from] regex::Error),
    #[error("unknown filter {0:?}")]
    Unknown(String),
    #[error("filter {0} profile is invalid: {1}")]
    Profile(String, &'static str),
}
type Result<T> = std::result::Result<T, FilterError>;

/// Pattern of the synthetic filter names: `F<center in 10nm><width class>`
const FILTER_NAME: &str = r"^F(?P<center>\d{3,4})(?P<class>W2|W|M|N)$";

/// Filter bandwidth class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterClass {
    ExtraWide,
    Wide,
    Medium,
    Narrow,
}
impl FilterClass {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "W2" => Some(FilterClass::ExtraWide),
            "W" => Some(FilterClass::Wide),
            "M" => Some(FilterClass::Medium),
            "N" => Some(FilterClass::Narrow),
            _ => None,
        }
    }
    /// Fractional bandwidth
    pub fn bandwidth(&self) -> f64 {
        match self {
            FilterClass::ExtraWide => 0.5,
            FilterClass::Wide => 0.25,
            FilterClass::Medium => 0.1,
            FilterClass::Narrow => 0.01,
        }
    }
    /// Number of wavelengths used to sample the band
    pub fn nlambda(&self) -> usize {
        match self {
            FilterClass::ExtraWide | FilterClass::Wide => 10,
            FilterClass::Medium => 5,
            FilterClass::Narrow => 3,
        }
    }
}

/// Parses a filter name into its central wavelength [m] and class
pub fn parse_filter_name(name: &str) -> Result<Option<(f64, FilterClass)>> {
    let re = Regex::new(FILTER_NAME)?;
    Ok(re.captures(name).and_then(|capts| {
        let center = capts.name("center")?.as_str().parse::<f64>().ok()? * 1e-8;
        let class = FilterClass::from_code(capts.name("class")?.as_str())?;
        Some((center, class))
    }))
}

/// Default number of wavelengths for a filter
pub fn default_nlambda(filter: Option<&str>) -> usize {
    filter
        .and_then(|name| parse_filter_name(name).ok().flatten())
        .map(|(_, class)| class.nlambda())
        .unwrap_or(10)
}

#[derive(Deserialize, Debug)]
struct Record {
    #[serde(rename = "Wavelength (um)")]
    wavelength: f64,
    #[serde(rename = "Throughput")]
    throughput: f64,
}

/// Spectral response of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterProfile {
    pub name: String,
    /// Wavelengths [m], strictly increasing
    wavelength: Vec<f64>,
    throughput: Vec<f64>,
}
impl FilterProfile {
    pub fn new(name: impl ToString, wavelength: Vec<f64>, throughput: Vec<f64>) -> Result<Self> {
        let name = name.to_string();
        let invalid = |reason| Err(FilterError::Profile(name.clone(), reason));
        if wavelength.len() != throughput.len() {
            return invalid("wavelength and throughput lengths differ");
        }
        if wavelength.len() < 2 {
            return invalid("at least 2 samples are required");
        }
        if wavelength.iter().any(|&l| !(l.is_finite() && l > 0.)) {
            return invalid("wavelengths must be positive");
        }
        if wavelength.windows(2).any(|w| w[1] <= w[0]) {
            return invalid("wavelengths must be strictly increasing");
        }
        if throughput.iter().any(|&t| !(t.is_finite() && t >= 0.)) {
            return invalid("throughput must be non-negative");
        }
        if throughput.iter().all(|&t| t == 0.) {
            return invalid("throughput is zero everywhere");
        }
        Ok(Self {
            name,
            wavelength,
            throughput,
        })
    }
    /// Unit throughput band `center * (1 +/- bandwidth / 2)` [m]
    pub fn top_hat(name: impl ToString, center: f64, bandwidth: f64) -> Result<Self> {
        let half = 0.5 * bandwidth * center;
        let (lo, hi) = (center - 1.02 * half, center + 1.02 * half);
        let n = 201;
        let (wavelength, throughput): (Vec<f64>, Vec<f64>) = (0..n)
            .map(|i| {
                let l = lo + (hi - lo) * i as f64 / (n - 1) as f64;
                (l, if (l - center).abs() <= half { 1. } else { 0. })
            })
            .unzip();
        Self::new(name, wavelength, throughput)
    }
    /// Loads a 2 columns CSV profile, `Wavelength (um)` and `Throughput`
    ///
    /// Files ending with `.gz` are decompressed on the fly.
    pub fn from_csv<P: AsRef<Path>>(name: impl ToString, path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| FilterError::Io(e, path.to_path_buf()))?;
        let mut contents = String::new();
        let read = if path.extension().map_or(false, |ext| ext == "gz") {
            GzDecoder::new(file).read_to_string(&mut contents)
        } else {
            io::BufReader::new(file).read_to_string(&mut contents)
        };
        read.map_err(|e| FilterError::Io(e, path.to_path_buf()))?;
        let mut rdr = csv::Reader::from_reader(contents.as_bytes());
        let mut rows = Vec::<Record>::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        rows.sort_by(|a, b| a.wavelength.total_cmp(&b.wavelength));
        let (wavelength, throughput) = rows
            .into_iter()
            .map(|row| (row.wavelength * 1e-6, row.throughput))
            .unzip();
        Self::new(name, wavelength, throughput)
    }
    /// Linearly interpolated throughput, zero outside the profile
    pub fn at(&self, wavelength: f64) -> f64 {
        let w = &self.wavelength;
        if wavelength < w[0] || wavelength > w[w.len() - 1] {
            return 0.;
        }
        let i = w.partition_point(|&x| x <= wavelength).min(w.len() - 1).max(1);
        let (l0, l1) = (w[i - 1], w[i]);
        let (t0, t1) = (self.throughput[i - 1], self.throughput[i]);
        t0 + (t1 - t0) * (wavelength - l0) / (l1 - l0)
    }
    pub fn peak(&self) -> f64 {
        self.throughput.iter().cloned().fold(0f64, f64::max)
    }
    /// Wavelength range where the throughput reaches `threshold` times the peak [m]
    pub fn band(&self, threshold: f64) -> (f64, f64) {
        let cut = threshold * self.peak();
        let mut inside = self
            .wavelength
            .iter()
            .zip(&self.throughput)
            .filter(|&(_, &t)| t >= cut)
            .map(|(&l, _)| l);
        let lo = inside.next().unwrap_or(self.wavelength[0]);
        let hi = inside.last().unwrap_or(lo);
        (lo, hi)
    }
    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }
    pub fn throughput(&self) -> &[f64] {
        &self.throughput
    }
}

/// Filter-profile lookup
pub trait FilterProfiles: Send + Sync {
    fn profile(&self, filter: &str) -> Result<FilterProfile>;
}

/// Filter profiles of an instrument
///
/// Filters not in the table but named after the `F<nnn>[W2|W|M|N]`
/// convention get a synthetic top-hat profile.
#[derive(Debug, Clone, Default)]
pub struct FilterTable {
    profiles: BTreeMap<String, FilterProfile>,
}
impl FilterTable {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn insert(mut self, profile: FilterProfile) -> Self {
        self.profiles.insert(profile.name.clone(), profile);
        self
    }
    /// Loads every `<FILTER>.csv` or `<FILTER>.csv.gz` profile of a directory
    pub fn from_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let entries = path
            .read_dir()
            .map_err(|e| FilterError::Io(e, path.to_path_buf()))?;
        let mut this = Self::new();
        for entry in entries {
            let entry = entry.map_err(|e| FilterError::Io(e, path.to_path_buf()))?;
            let file = entry.path();
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(filter) = name
                .strip_suffix(".csv.gz")
                .or_else(|| name.strip_suffix(".csv"))
            else {
                continue;
            };
            this = this.insert(FilterProfile::from_csv(filter, &file)?);
        }
        log::info!("loaded {} filter profiles from {:?}", this.profiles.len(), path);
        Ok(this)
    }
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.profiles.keys().map(|k| k.as_str())
    }
}
impl FilterProfiles for FilterTable {
    fn profile(&self, filter: &str) -> Result<FilterProfile> {
        if let Some(profile) = self.profiles.get(filter) {
            return Ok(profile.clone());
        }
        match parse_filter_name(filter)? {
            Some((center, class)) => FilterProfile::top_hat(filter, center, class.bandwidth()),
            None => Err(FilterError::Unknown(filter.to_string())),
        }
    }
}
