//! Frequency parsing and validation for the FM broadcast band.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lowest tunable frequency in MHz.
pub const MIN_MHZ: f64 = 87.5;

/// Highest tunable frequency in MHz.
pub const MAX_MHZ: f64 = 108.0;

/// Reasons a frequency expression is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrequencyError {
    #[error("not a number: {input:?} (expected a value between 87.5 and 108.0 MHz)")]
    NotANumber { input: String },

    #[error("out of range: {value} MHz (must be between 87.5 and 108.0 MHz)")]
    OutOfRange { value: f64 },
}

/// A validated FM broadcast frequency in MHz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Frequency(f64);

impl Frequency {
    /// Frequency in MHz.
    pub fn mhz(self) -> f64 {
        self.0
    }

    /// Value passed to the tuner's `-f` flag, e.g. `95.5M` or `100.0M`.
    pub fn tuner_argument(self) -> String {
        if self.0.fract() == 0.0 {
            format!("{:.1}M", self.0)
        } else {
            format!("{}M", self.0)
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.1} MHz", self.0)
        } else {
            write!(f, "{} MHz", self.0)
        }
    }
}

impl TryFrom<f64> for Frequency {
    type Error = FrequencyError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        // NaN fails `contains`, so it lands here as well.
        if !(MIN_MHZ..=MAX_MHZ).contains(&value) {
            return Err(FrequencyError::OutOfRange { value });
        }
        Ok(Self(value))
    }
}

impl FromStr for Frequency {
    type Err = FrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse a free-form frequency expression such as `"95.5"`, `"95.5M"` or
/// `" 95.5 mhz "`.
pub fn parse(input: &str) -> Result<Frequency, FrequencyError> {
    let upper = input.trim().to_ascii_uppercase();
    let number = upper
        .strip_suffix("MHZ")
        .or_else(|| upper.strip_suffix('M'))
        .unwrap_or(&upper)
        .trim();

    let value: f64 = number.parse().map_err(|_| FrequencyError::NotANumber {
        input: input.to_string(),
    })?;

    Frequency::try_from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_markers_are_accepted() {
        for input in ["95.5", "95.5M", "95.5MHz", " 95.5 mhz ", "95.5m", "95.5 M"] {
            let freq = parse(input).unwrap_or_else(|e| panic!("{input:?} failed: {e}"));
            assert_eq!(freq.mhz(), 95.5, "input {:?}", input);
        }
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        assert_eq!(parse("87.5").unwrap().mhz(), 87.5);
        assert_eq!(parse("108").unwrap().mhz(), 108.0);
        assert!(parse("87.49").is_err());
        assert!(parse("108.01").is_err());
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            parse("200"),
            Err(FrequencyError::OutOfRange { value: 200.0 })
        );
        let msg = parse("50MHz").unwrap_err().to_string();
        assert!(msg.contains("out of range"), "got: {}", msg);
    }

    #[test]
    fn test_not_a_number() {
        for input in ["abc", "", "   ", "MHz", "9 5.5", "95.5 kHz"] {
            match parse(input) {
                Err(FrequencyError::NotANumber { .. }) => {}
                other => panic!("{input:?} should be NotANumber, got {other:?}"),
            }
        }
        assert!(parse("abc").unwrap_err().to_string().contains("not a number"));
    }

    #[test]
    fn test_non_finite_values_are_out_of_range() {
        assert!(matches!(
            parse("inf"),
            Err(FrequencyError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse("NaN"),
            Err(FrequencyError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_tuner_argument_always_has_decimal() {
        assert_eq!(parse("95.5").unwrap().tuner_argument(), "95.5M");
        assert_eq!(parse("100").unwrap().tuner_argument(), "100.0M");
        assert_eq!(parse("101.1MHz").unwrap().tuner_argument(), "101.1M");
    }

    #[test]
    fn test_display() {
        assert_eq!(parse("95.5").unwrap().to_string(), "95.5 MHz");
        assert_eq!(parse("100").unwrap().to_string(), "100.0 MHz");
    }

    #[test]
    fn test_from_str_and_try_from() {
        let freq: Frequency = "99.9M".parse().unwrap();
        assert_eq!(freq, Frequency::try_from(99.9).unwrap());
        assert!(Frequency::try_from(f64::NAN).is_err());
    }
}
