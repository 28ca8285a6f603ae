// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Quantized-16 codec (spec.md §4.9): a fixed-range 16-bit linear
//! quantizer.

use crate::{Error, Result};

/// Maximum precision loss for a given `[low, high]` range.
#[must_use]
pub fn max_precision_loss(low: f64, high: f64) -> f64 {
    (high - low) / 131_070.0
}

fn validate_range(low: f64, high: f64) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || high <= low {
        return Err(Error::InvalidArgument(format!(
            "invalid quantization range [{low}, {high}]"
        )));
    }
    Ok(())
}

/// Quantizes `value` into `[low, high]`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the range is degenerate or
/// non-finite, or if `value` falls outside `[low, high]`.
pub fn encode(value: f64, low: f64, high: f64) -> Result<u16> {
    validate_range(low, high)?;
    if value < low || value > high {
        return Err(Error::InvalidArgument(format!(
            "value {value} out of range [{low}, {high}]"
        )));
    }
    let normalized = (value - low) / (high - low);
    Ok((normalized * 65535.0).round() as u16)
}

/// Dequantizes `q` back into `[low, high]`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the range is degenerate or
/// non-finite.
pub fn decode(q: u16, low: f64, high: f64) -> Result<f64> {
    validate_range(low, high)?;
    Ok(low + (f64::from(q) / 65535.0) * (high - low))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn boundary_values_round_trip_exactly() {
        let (low, high) = (-10.0, 10.0);
        assert_eq!(encode(low, low, high).unwrap(), 0);
        assert_eq!(encode(high, low, high).unwrap(), 65535);
        assert_eq!(decode(0, low, high).unwrap(), low);
        assert_eq!(decode(65535, low, high).unwrap(), high);
    }

    #[test]
    fn interior_values_stay_within_precision_bound() {
        let (low, high) = (0.0, 100.0);
        let bound = max_precision_loss(low, high);
        for v in [1.0, 33.3, 50.0, 99.9] {
            let q = encode(v, low, high).unwrap();
            let back = decode(q, low, high).unwrap();
            assert!((back - v).abs() <= bound, "{back} vs {v}, bound {bound}");
        }
    }

    #[test]
    fn rejects_out_of_range_value() {
        assert!(encode(-1.0, 0.0, 10.0).is_err());
        assert!(encode(11.0, 0.0, 10.0).is_err());
    }

    #[test]
    fn rejects_degenerate_range() {
        assert!(encode(1.0, 5.0, 5.0).is_err());
        assert!(encode(1.0, 5.0, 1.0).is_err());
    }

    #[test]
    fn random_values_stay_within_precision_bound() {
        use rand::Rng;
        let mut rng = rand::rng();
        let (low, high) = (-500.0, 1_500.0);
        let bound = max_precision_loss(low, high);
        for _ in 0..1_000 {
            let v = rng.random_range(low..=high);
            let q = encode(v, low, high).unwrap();
            let back = decode(q, low, high).unwrap();
            assert!((back - v).abs() <= bound, "{back} vs {v}, bound {bound}");
        }
    }
}
