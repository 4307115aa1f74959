//! Instrument option keys
//!
//! The option surface is a small set of string keys. Values are parsed and
//! checked once, when they are set, so that a bad key or value is reported
//! with its name before any calculation starts.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("unknown option {0:?}, expected one of: {1}")]
    UnknownKey(String, String),
    #[error("invalid value {1:?} for option {0}")]
    Value(OptionKey, String),
    #[error("option {0} must be finite, found {1}")]
    NotFinite(OptionKey, f64),
    #[error(r#"option assignment {0:?} must read "key=value""#)]
    Assignment(String),
}
type Result<T> = std::result::Result<T, OptionsError>;

/// Recognized option keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
pub enum OptionKey {
    #[strum(to_string = "source_offset_r")]
    SourceOffsetR,
    #[strum(to_string = "source_offset_theta")]
    SourceOffsetTheta,
    #[strum(to_string = "source_offset_x")]
    SourceOffsetX,
    #[strum(to_string = "source_offset_y")]
    SourceOffsetY,
    #[strum(to_string = "coron_shift_x")]
    CoronShiftX,
    #[strum(to_string = "coron_shift_y")]
    CoronShiftY,
    #[strum(to_string = "parity")]
    Parity,
    #[strum(to_string = "output_mode")]
    OutputMode,
}

/// Detector grid parity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    #[strum(to_string = "none")]
    None,
    #[strum(to_string = "odd")]
    Odd,
    #[strum(to_string = "even")]
    Even,
}

/// Which image planes go into the product
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[strum(to_string = "oversampled")]
    Oversampled,
    #[strum(
        to_string = "detector sampled",
        serialize = "detector_sampled",
        serialize = "detector"
    )]
    DetectorSampled,
    #[default]
    #[strum(to_string = "both")]
    Both,
}

/// Values of the recognized option keys
///
/// Offsets and shifts are in arcsec, `source_offset_theta` in degrees
/// counterclockwise from the +Y axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentOptions {
    pub source_offset_r: Option<f64>,
    pub source_offset_theta: Option<f64>,
    pub source_offset_x: Option<f64>,
    pub source_offset_y: Option<f64>,
    pub coron_shift_x: Option<f64>,
    pub coron_shift_y: Option<f64>,
    pub parity: Parity,
    pub output_mode: OutputMode,
}
impl InstrumentOptions {
    /// Returns a copy with the option `key` set from its string `value`
    pub fn with(self, key: &str, value: &str) -> Result<Self> {
        let key = OptionKey::from_str(key.trim()).map_err(|_| {
            OptionsError::UnknownKey(
                key.to_string(),
                OptionKey::iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })?;
        let value = value.trim();
        let number = || -> Result<f64> {
            let x = value
                .parse::<f64>()
                .map_err(|_| OptionsError::Value(key, value.to_string()))?;
            if x.is_finite() {
                Ok(x)
            } else {
                Err(OptionsError::NotFinite(key, x))
            }
        };
        Ok(match key {
            OptionKey::SourceOffsetR => Self {
                source_offset_r: Some(number()?),
                ..self
            },
            OptionKey::SourceOffsetTheta => Self {
                source_offset_theta: Some(number()?),
                ..self
            },
            OptionKey::SourceOffsetX => Self {
                source_offset_x: Some(number()?),
                ..self
            },
            OptionKey::SourceOffsetY => Self {
                source_offset_y: Some(number()?),
                ..self
            },
            OptionKey::CoronShiftX => Self {
                coron_shift_x: Some(number()?),
                ..self
            },
            OptionKey::CoronShiftY => Self {
                coron_shift_y: Some(number()?),
                ..self
            },
            OptionKey::Parity => Self {
                parity: Parity::from_str(value)
                    .map_err(|_| OptionsError::Value(key, value.to_string()))?,
                ..self
            },
            OptionKey::OutputMode => Self {
                output_mode: OutputMode::from_str(value)
                    .map_err(|_| OptionsError::Value(key, value.to_string()))?,
                ..self
            },
        })
    }
    /// Applies a `key=value` assignment
    pub fn assign(self, assignment: &str) -> Result<Self> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| OptionsError::Assignment(assignment.to_string()))?;
        self.with(key, value)
    }
    pub fn source_offset_r(self, value: f64) -> Self {
        Self {
            source_offset_r: Some(value),
            ..self
        }
    }
    pub fn source_offset_theta(self, value: f64) -> Self {
        Self {
            source_offset_theta: Some(value),
            ..self
        }
    }
    pub fn source_offset_x(self, value: f64) -> Self {
        Self {
            source_offset_x: Some(value),
            ..self
        }
    }
    pub fn source_offset_y(self, value: f64) -> Self {
        Self {
            source_offset_y: Some(value),
            ..self
        }
    }
    pub fn coron_shift_x(self, value: f64) -> Self {
        Self {
            coron_shift_x: Some(value),
            ..self
        }
    }
    pub fn coron_shift_y(self, value: f64) -> Self {
        Self {
            coron_shift_y: Some(value),
            ..self
        }
    }
    pub fn parity(self, parity: Parity) -> Self {
        Self { parity, ..self }
    }
    pub fn output_mode(self, output_mode: OutputMode) -> Self {
        Self {
            output_mode,
            ..self
        }
    }
}
impl fmt::Display for InstrumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            (OptionKey::SourceOffsetR, self.source_offset_r),
            (OptionKey::SourceOffsetTheta, self.source_offset_theta),
            (OptionKey::SourceOffsetX, self.source_offset_x),
            (OptionKey::SourceOffsetY, self.source_offset_y),
            (OptionKey::CoronShiftX, self.coron_shift_x),
            (OptionKey::CoronShiftY, self.coron_shift_y),
        ];
        for (key, value) in fields.iter().filter_map(|(k, v)| v.map(|v| (k, v))) {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "parity={} output_mode={}", self.parity, self.output_mode)
    }
}
