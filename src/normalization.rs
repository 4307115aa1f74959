//! PSF normalization
//!
//! Engine outputs are scaled to a unit entrance pupil intensity. The
//! [Normalization] mode selects the reference plane whose intensity is set
//! to 1 instead, and the same factor is applied to every plane.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{engine::EngineOutput, trace::Trace};

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("{0} normalization factor must be positive and finite, found {1}")]
    Factor(Normalization, f64),
}
type Result<T> = std::result::Result<T, NormalizationError>;

/// Reference plane of unit intensity
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    EnumString,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    #[strum(to_string = "entrance_pupil", serialize = "first")]
    EntrancePupil,
    #[strum(to_string = "exit_pupil")]
    ExitPupil,
    /// The final ideal oversampled image
    #[strum(to_string = "last")]
    Last,
}
impl Normalization {
    /// Scaling factor of the engine output
    pub fn factor(&self, output: &EngineOutput) -> Result<f64> {
        let factor = match self {
            Normalization::EntrancePupil => 1.,
            Normalization::ExitPupil => output.entrance_total / output.exit_total,
            Normalization::Last => output.ideal_oversampled.sum().recip(),
        };
        if factor.is_finite() && factor > 0. {
            Ok(factor)
        } else {
            Err(NormalizationError::Factor(*self, factor))
        }
    }
    /// Scales all the planes of the engine output by the same factor
    pub fn apply(&self, output: EngineOutput, trace: &Trace) -> Result<EngineOutput> {
        let factor = self.factor(&output)?;
        trace.debug(format_args!("{self} normalization factor: {factor:.6e}"));
        Ok(output.scale(factor))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use nalgebra::DMatrix;
    use strum::IntoEnumIterator;

    use super::*;

    fn output(entrance_total: f64, exit_total: f64, fill: f64) -> EngineOutput {
        let image = DMatrix::from_element(8, 8, fill / 64.);
        EngineOutput {
            entrance_total,
            exit_total,
            ideal_oversampled: image.clone(),
            ideal_detector: DMatrix::from_element(4, 4, fill / 16.),
            distorted_oversampled: image * 0.9,
            distorted_detector: DMatrix::from_element(4, 4, 0.9 * fill / 16.),
        }
    }

    #[test]
    fn parse_modes() -> std::result::Result<(), strum::ParseError> {
        assert_eq!(Normalization::from_str("first")?, Normalization::EntrancePupil);
        assert_eq!(Normalization::from_str("Exit_Pupil")?, Normalization::ExitPupil);
        assert_eq!(Normalization::from_str("last")?, Normalization::Last);
        assert_eq!(Normalization::default().to_string(), "entrance_pupil");
        assert!(Normalization::from_str("middle").is_err());
        Ok(())
    }

    #[test]
    fn ordered_totals() -> Result<()> {
        let trace = Trace::silent();
        let totals: Vec<f64> = Normalization::iter()
            .map(|mode| {
                mode.apply(output(1., 0.8, 0.7), &trace)
                    .map(|o| o.ideal_oversampled.sum())
            })
            .collect::<Result<_>>()?;
        assert!((totals[0] - 0.7).abs() < 1e-12);
        assert!((totals[1] - 0.875).abs() < 1e-12);
        assert!((totals[2] - 1.).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn uniform_scaling() -> Result<()> {
        let scaled = Normalization::Last.apply(output(1., 0.8, 0.5), &Trace::silent())?;
        assert!((scaled.ideal_detector.sum() - 1.).abs() < 1e-12);
        assert!((scaled.distorted_oversampled.sum() - 0.9).abs() < 1e-12);
        assert!((scaled.distorted_detector.sum() - 0.9).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn degenerate_factor() {
        assert!(matches!(
            Normalization::ExitPupil.factor(&output(1., 0., 0.5)),
            Err(NormalizationError::Factor(Normalization::ExitPupil, _))
        ));
        assert!(matches!(
            Normalization::Last.factor(&output(1., 0.5, 0.)),
            Err(NormalizationError::Factor(Normalization::Last, _))
        ));
    }
}
