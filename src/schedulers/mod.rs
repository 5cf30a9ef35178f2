//! # Noise schedules
//!
//! The fixed forward process of a DDPM: the precomputed schedule constants and
//! the closed-form noising / posterior computations built on top of them.

pub mod noise;
pub mod schedule;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiffusionError;

/// The variance used by the reverse process `p(x_{t-1} | x_t)`.
///
/// `FixedLarge` uses `beta_t` and gives a better decoder log-likelihood at the cost
/// of noisier samples; `FixedSmall` uses the true posterior variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceType {
    #[default]
    FixedLarge,
    FixedSmall,
}

impl FromStr for VarianceType {
    type Err = DiffusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixedlarge" => Ok(Self::FixedLarge),
            "fixedsmall" => Ok(Self::FixedSmall),
            other => Err(DiffusionError::Configuration(format!(
                "unknown variance type `{other}`, expected `fixedlarge` or `fixedsmall`"
            ))),
        }
    }
}

impl fmt::Display for VarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedLarge => f.write_str("fixedlarge"),
            Self::FixedSmall => f.write_str("fixedsmall"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variance_type_from_str() {
        assert_eq!("fixedlarge".parse(), Ok(VarianceType::FixedLarge));
        assert_eq!("fixedsmall".parse(), Ok(VarianceType::FixedSmall));
        assert!(matches!(
            "learned".parse::<VarianceType>(),
            Err(DiffusionError::Configuration(_))
        ));
    }

    #[test]
    fn test_variance_type_serde_names() {
        let json = serde_json::to_string(&VarianceType::FixedSmall).unwrap();
        assert_eq!(json, "\"fixedsmall\"");

        let parsed: VarianceType = serde_json::from_str("\"fixedlarge\"").unwrap();
        assert_eq!(parsed, VarianceType::FixedLarge);
        assert!(serde_json::from_str::<VarianceType>("\"fixed\"").is_err());
    }
}
