use crate::{
    aperture::ApertureError,
    config::ConfigError,
    engine::EngineError,
    normalization::NormalizationError,
    options::OptionsError,
    position::PositionError,
    product::ProductError,
    sampling::SamplingError,
    spectrum::{FilterError, SpectrumError},
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `options` module")]
    Options(#[from] OptionsError),
    #[error("Error in the `config` module")]
    Config(#[from] ConfigError),
    #[error("Error in the `aperture` module")]
    Aperture(#[from] ApertureError),
    #[error("Error in the `position` module")]
    Position(#[from] PositionError),
    #[error("Error in the `sampling` module")]
    Sampling(#[from] SamplingError),
    #[error("Error in the `filter` module")]
    Filter(#[from] FilterError),
    #[error("Error in the `spectrum` module")]
    Spectrum(#[from] SpectrumError),
    #[error("Error in the `engine` module")]
    Engine(#[from] EngineError),
    #[error("Error in the `normalization` module")]
    Normalization(#[from] NormalizationError),
    #[error("Error in the `product` module")]
    Product(#[from] ProductError),
    #[error("failed to build the calculation thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
pub type Result<T> = std::result::Result<T, Error>;

/// Error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or inconsistent parameters, raised before any propagation
    Configuration,
    /// Memory or grid size limits exceeded, raised before any propagation
    Resource,
    /// Propagation failure
    Engine,
    /// File access or (de)serialization failure
    Io,
}

fn filter_kind(e: &FilterError) -> ErrorKind {
    match e {
        FilterError::Io(..) | FilterError::Csv(_) => ErrorKind::Io,
        _ => ErrorKind::Configuration,
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Options(_) | Error::Config(_) | Error::Position(_) => ErrorKind::Configuration,
            Error::Aperture(ApertureError::Io(..) | ApertureError::Csv(_)) => ErrorKind::Io,
            Error::Aperture(_) => ErrorKind::Configuration,
            Error::Sampling(e) if e.is_resource() => ErrorKind::Resource,
            Error::Sampling(_) => ErrorKind::Configuration,
            Error::Filter(e) | Error::Spectrum(SpectrumError::Filter(e)) => filter_kind(e),
            Error::Spectrum(_) => ErrorKind::Configuration,
            Error::Engine(EngineError::NoLight(_)) | Error::Normalization(_) => ErrorKind::Engine,
            Error::Engine(_) => ErrorKind::Configuration,
            Error::Product(ProductError::EmptyStack | ProductError::Mismatch(_)) => {
                ErrorKind::Configuration
            }
            Error::Product(_) => ErrorKind::Io,
            Error::ThreadPool(_) => ErrorKind::Resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let e: Error = SamplingError::GridLimit("oversampled", 20000, 16384).into();
        assert_eq!(e.kind(), ErrorKind::Resource);
        let e: Error = SamplingError::FovPixels(0).into();
        assert_eq!(e.kind(), ErrorKind::Configuration);
        let e: Error = SpectrumError::Filter(FilterError::Unknown("F999X".into())).into();
        assert_eq!(e.kind(), ErrorKind::Configuration);
        let e: Error = EngineError::NoLight("exit pupil").into();
        assert_eq!(e.kind(), ErrorKind::Engine);
        let e: Error = ProductError::EmptyStack.into();
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }
}
