// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Swinging-Door temporal codec (spec.md §4.9): keeps only the endpoints
//! of linear segments within a tolerance envelope.

use crate::buffer::MemRecord;
use crate::value::{Value, ValueType};

/// One retained endpoint. Stored as `f64` regardless of the tag's declared
/// [`ValueType`]; the original type is restored on decode.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeyPoint {
    pub timestamp_us: i64,
    pub value: f64,
    pub quality: u8,
}

impl From<MemRecord> for KeyPoint {
    fn from(record: MemRecord) -> Self {
        Self {
            timestamp_us: record.timestamp_us,
            value: record.value.as_f64(),
            quality: record.quality,
        }
    }
}

/// Encodes `records` into key points whose linear interpolation never
/// deviates from the input by more than `tolerance * compression_factor`
/// (spec.md §4.9).
#[must_use]
pub fn encode(records: &[MemRecord], tolerance: f64, compression_factor: f64) -> Vec<KeyPoint> {
    let Some((&first, rest)) = records.split_first() else {
        return Vec::new();
    };
    if rest.is_empty() {
        return vec![KeyPoint::from(first)];
    }

    let eps = tolerance * compression_factor;
    let mut out = vec![KeyPoint::from(first)];
    let mut anchor = first;
    let mut last_emitted_ts = first.timestamp_us;
    let mut slope_min = f64::NEG_INFINITY;
    let mut slope_max = f64::INFINITY;
    let mut last_candidate = first;

    for &record in rest {
        let dt = (record.timestamp_us - anchor.timestamp_us) as f64;
        if dt <= 0.0 {
            last_candidate = record;
            continue;
        }

        let v_new = record.value.as_f64();
        let v_anchor = anchor.value.as_f64();
        let slope_upper = ((v_new + eps) - (v_anchor - eps)) / dt;
        let slope_lower = ((v_new - eps) - (v_anchor + eps)) / dt;
        let candidate_min = slope_min.max(slope_lower);
        let candidate_max = slope_max.min(slope_upper);

        if candidate_min <= candidate_max {
            slope_min = candidate_min;
            slope_max = candidate_max;
            last_candidate = record;
        } else {
            out.push(KeyPoint::from(last_candidate));
            last_emitted_ts = last_candidate.timestamp_us;
            anchor = last_candidate;
            slope_min = f64::NEG_INFINITY;
            slope_max = f64::INFINITY;
            last_candidate = record;
        }
    }

    if last_candidate.timestamp_us != last_emitted_ts {
        out.push(KeyPoint::from(last_candidate));
    }
    out
}

/// Reconstructs the stored key points as records, in physical (= time)
/// order, without interpolation. Used by the block reader.
#[must_use]
pub fn decode_block(key_points: &[KeyPoint], value_type: ValueType) -> Vec<MemRecord> {
    key_points
        .iter()
        .map(|kp| MemRecord {
            timestamp_us: kp.timestamp_us,
            value: Value::from_f64(value_type, kp.value),
            quality: kp.quality,
        })
        .collect()
}

/// Binary search + linear interpolation for an arbitrary query time.
/// Queries outside the key-point range return the nearest endpoint.
#[must_use]
pub fn value_at(key_points: &[KeyPoint], ts: i64) -> Option<f64> {
    let first = key_points.first()?;
    let last = key_points.last()?;
    if ts <= first.timestamp_us {
        return Some(first.value);
    }
    if ts >= last.timestamp_us {
        return Some(last.value);
    }

    let idx = key_points.partition_point(|p| p.timestamp_us < ts);
    if key_points[idx].timestamp_us == ts {
        return Some(key_points[idx].value);
    }
    let p0 = key_points[idx - 1];
    let p1 = key_points[idx];
    let t = (ts - p0.timestamp_us) as f64 / (p1.timestamp_us - p0.timestamp_us) as f64;
    Some(p0.value + t * (p1.value - p0.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn record(ts: i64, v: f64) -> MemRecord {
        MemRecord {
            timestamp_us: ts,
            value: Value::F64(v),
            quality: 192,
        }
    }

    #[test]
    fn single_record_emits_one_point() {
        let points = encode(&[record(0, 1.0)], 1.0, 1.0);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 1.0);
    }

    #[test]
    fn linear_data_compresses_to_few_key_points() {
        let records: Vec<_> = (0..100).map(|i| record(i * 1_000, 10.0 * i as f64)).collect();
        let points = encode(&records, 1.0, 1.0);
        assert!(points.len() <= 3, "expected <=3 key points, got {}", points.len());
        assert_eq!(points[0].timestamp_us, 0);
        assert_eq!(points[0].value, 0.0);
        assert_eq!(points.last().unwrap().timestamp_us, 99_000);
        assert_eq!(points.last().unwrap().value, 990.0);
    }

    #[test]
    fn value_at_key_point_returns_exact_value() {
        let records: Vec<_> = (0..20).map(|i| record(i * 1_000, 2.0 * i as f64)).collect();
        let points = encode(&records, 0.5, 1.0);
        for kp in &points {
            assert_eq!(value_at(&points, kp.timestamp_us), Some(kp.value));
        }
    }

    #[test]
    fn value_at_outside_range_clamps_to_endpoint() {
        let points = encode(&[record(0, 1.0), record(1_000, 5.0)], 0.1, 1.0);
        assert_eq!(value_at(&points, -500), Some(points[0].value));
        assert_eq!(value_at(&points, 10_000), Some(points.last().unwrap().value));
    }
}
