// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Resampling engine (spec.md §4.11): window-aggregates raw records into
//! lower-resolution points.

use crate::buffer::MemRecord;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// One window's aggregate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResampledPoint {
    pub timestamp_us: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub first: f64,
    pub last: f64,
    pub count: u32,
    pub quality: u8,
}

struct WindowAccumulator {
    count: u32,
    sum: f64,
    min: f64,
    max: f64,
    first: f64,
    last: f64,
    quality_sum: u64,
}

impl WindowAccumulator {
    fn start(record: &MemRecord) -> Self {
        let v = record.value.as_f64();
        Self {
            count: 1,
            sum: v,
            min: v,
            max: v,
            first: v,
            last: v,
            quality_sum: u64::from(record.quality),
        }
    }

    fn accumulate(&mut self, record: &MemRecord, is_latest: bool) {
        let v = record.value.as_f64();
        self.count += 1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.quality_sum += u64::from(record.quality);
        if is_latest {
            self.last = v;
        }
    }

    fn finish(&self, window: i64, interval_us: i64) -> ResampledPoint {
        #[allow(clippy::cast_possible_truncation)]
        let quality = (self.quality_sum / u64::from(self.count)) as u8;
        ResampledPoint {
            timestamp_us: window * interval_us,
            avg: self.sum / f64::from(self.count),
            min: self.min,
            max: self.max,
            first: self.first,
            last: self.last,
            count: self.count,
            quality,
        }
    }
}

/// Window-aggregates `records` (assumed already sorted by timestamp
/// ascending, as every storage-layer read path guarantees) into
/// `ResampledPoint`s, one per non-empty window, in ascending window order.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `interval_us` is not positive, or
/// [`Error::NotFound`] if `records` is empty.
pub fn resample(records: &[MemRecord], interval_us: i64) -> Result<Vec<ResampledPoint>> {
    if interval_us <= 0 {
        return Err(Error::InvalidArgument(format!(
            "interval_us must be positive, got {interval_us}"
        )));
    }
    if records.is_empty() {
        return Err(Error::NotFound("no records to resample".into()));
    }

    let mut windows: BTreeMap<i64, WindowAccumulator> = BTreeMap::new();
    for record in records {
        let window = record.timestamp_us.div_euclid(interval_us);
        windows
            .entry(window)
            .and_modify(|acc| acc.accumulate(record, true))
            .or_insert_with(|| WindowAccumulator::start(record));
    }

    Ok(windows
        .into_iter()
        .map(|(window, acc)| acc.finish(window, interval_us))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use test_log::test;

    fn rec(ts: i64, v: f64, q: u8) -> MemRecord {
        MemRecord {
            timestamp_us: ts,
            value: Value::F64(v),
            quality: q,
        }
    }

    #[test]
    fn aggregates_within_window_boundaries() -> Result<()> {
        let records = vec![
            rec(0, 10.0, 192),
            rec(500, 20.0, 192),
            rec(1_000, 30.0, 192),
            rec(1_500, 40.0, 192),
        ];
        let points = resample(&records, 1_000)?;
        assert_eq!(points.len(), 2);

        assert_eq!(points[0].timestamp_us, 0);
        assert_eq!(points[0].count, 2);
        assert!((points[0].avg - 15.0).abs() < 1e-9);
        assert_eq!(points[0].min, 10.0);
        assert_eq!(points[0].max, 20.0);
        assert_eq!(points[0].first, 10.0);
        assert_eq!(points[0].last, 20.0);

        assert_eq!(points[1].timestamp_us, 1_000);
        assert_eq!(points[1].count, 2);
        assert!((points[1].avg - 35.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn empty_windows_are_omitted() -> Result<()> {
        let records = vec![rec(0, 1.0, 192), rec(10_000, 2.0, 192)];
        let points = resample(&records, 1_000)?;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].timestamp_us, 10_000);
        Ok(())
    }

    #[test]
    fn rejects_empty_input() {
        let err = resample(&[], 1_000).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn rejects_non_positive_interval() {
        let records = vec![rec(0, 1.0, 192)];
        let err = resample(&records, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
