//! Numeric answer matching.
//!
//! Extracts the first signed decimal-or-integer token from free-form student
//! input and compares it against an expected value within a relative
//! tolerance band. Pure, deterministic, and total: bad input means "no
//! match", never an error.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default relative tolerance: a 5% band around the expected value.
pub const DEFAULT_TOLERANCE: f64 = 0.05;

static NUMBER_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"[-+]?(?:\d*\.\d+|\d+)").expect("numeric pattern"));

/// First numeric token in the input, if any.
pub fn extract_number(input: &str) -> Option<f64> {
  NUMBER_RE.find(input).and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Tolerance-based numeric equality against a single expected value.
///
/// For `expected == 0` the band is absolute (`|x| < tolerance`); otherwise it
/// scales with the magnitude of the expected value.
pub fn matches(student_input: &str, expected: f64, tolerance: f64) -> bool {
  let Some(x) = extract_number(student_input) else {
    return false;
  };
  if expected == 0.0 {
    x.abs() < tolerance
  } else {
    (x - expected).abs() <= tolerance * expected.abs()
  }
}

/// Check the input against every target of a problem. Returns the name of the
/// first matching checkpoint, so callers can log which one was hit.
pub fn matches_any<'a>(
  student_input: &str,
  targets: &'a HashMap<String, f64>,
  tolerance: f64,
) -> Option<&'a str> {
  targets
    .iter()
    .find(|(_, expected)| matches(student_input, **expected, tolerance))
    .map(|(name, _)| name.as_str())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_numeric_substring_never_matches() {
    assert!(!matches("abc", 5.0, DEFAULT_TOLERANCE));
    assert!(!matches("", 0.0, DEFAULT_TOLERANCE));
    assert!(!matches("the answer is pi", 3.14, DEFAULT_TOLERANCE));
  }

  #[test]
  fn exact_value_matches_at_any_tolerance() {
    for expected in [2.02_f64, -3.0, 0.5, 123.0] {
      assert!(matches(&expected.to_string(), expected, 0.0));
      assert!(matches(&expected.to_string(), expected, DEFAULT_TOLERANCE));
    }
  }

  #[test]
  fn relative_band_boundary() {
    assert!(matches("2.0", 2.02, 0.05));
    assert!(!matches("2.0", 2.2, 0.05));
  }

  #[test]
  fn zero_expected_uses_absolute_band() {
    assert!(matches("0.01", 0.0, 0.05));
    assert!(!matches("0.06", 0.0, 0.05));
  }

  #[test]
  fn takes_first_number_and_keeps_sign() {
    assert_eq!(extract_number("I got -6, maybe 7?"), Some(-6.0));
    assert_eq!(extract_number("about .5 I think"), Some(0.5));
  }

  #[test]
  fn any_target_counts() {
    let targets = HashMap::from([("inner_value".to_string(), 3.0), ("final".to_string(), 54.0)]);
    assert_eq!(matches_any("it's 54", &targets, DEFAULT_TOLERANCE), Some("final"));
    assert_eq!(matches_any("3", &targets, DEFAULT_TOLERANCE), Some("inner_value"));
    assert_eq!(matches_any("100", &targets, DEFAULT_TOLERANCE), None);
  }
}
