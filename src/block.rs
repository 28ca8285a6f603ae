// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Data block (de)serialization (spec.md §3, §4.6, §4.7). Independent of
//! where the bytes come from or go to; [`crate::block_writer`] and
//! [`crate::scanner`] wrap this around the container and directory.

use crate::buffer::MemRecord;
use crate::coding::DecodeError;
use crate::quantized16;
use crate::swinging_door::{self, KeyPoint};
use crate::value::{EncodingType, TimeUnit, Value, ValueType};
use crate::{Error, Result};

fn time_offset(ts_us: i64, start_ts_us: i64, time_unit: TimeUnit) -> i64 {
    (ts_us - start_ts_us) / time_unit.micros_per_unit()
}

fn too_short() -> DecodeError {
    DecodeError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "block payload shorter than record_count implies",
    ))
}

/// Serializes `records` as RAW: `[3B time_offset | 1B quality | NB value]`.
fn serialize_raw(records: &[MemRecord], start_ts_us: i64, time_unit: TimeUnit) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        let offset = time_offset(record.timestamp_us, start_ts_us, time_unit) as u32;
        out.extend_from_slice(&offset.to_le_bytes()[..3]);
        out.push(record.quality);
        out.extend_from_slice(&record.value.to_bytes());
    }
    out
}

fn deserialize_raw(
    bytes: &[u8],
    start_ts_us: i64,
    time_unit: TimeUnit,
    value_type: ValueType,
    record_count: u32,
) -> std::result::Result<Vec<MemRecord>, DecodeError> {
    let stride = 4 + value_type.byte_width();
    let mut out = Vec::with_capacity(record_count as usize);
    for i in 0..record_count as usize {
        let rec = bytes.get(i * stride..(i + 1) * stride).ok_or_else(too_short)?;
        let mut offset_bytes = [0u8; 4];
        offset_bytes[..3].copy_from_slice(&rec[0..3]);
        let offset = i64::from(u32::from_le_bytes(offset_bytes));
        let quality = rec[3];
        let value = Value::from_bytes(value_type, &rec[4..])?;
        out.push(MemRecord {
            timestamp_us: start_ts_us + offset * time_unit.micros_per_unit(),
            value,
            quality,
        });
    }
    Ok(out)
}

const CODED_POINT_STRIDE: usize = 4 + 8 + 1;

fn serialize_key_points(points: &[KeyPoint], start_ts_us: i64, time_unit: TimeUnit) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * CODED_POINT_STRIDE);
    for point in points {
        let offset = time_offset(point.timestamp_us, start_ts_us, time_unit) as u32;
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&point.value.to_le_bytes());
        out.push(point.quality);
    }
    out
}

fn deserialize_key_points(
    bytes: &[u8],
    start_ts_us: i64,
    time_unit: TimeUnit,
    record_count: u32,
) -> std::result::Result<Vec<KeyPoint>, DecodeError> {
    let mut out = Vec::with_capacity(record_count as usize);
    for i in 0..record_count as usize {
        let rec = bytes
            .get(i * CODED_POINT_STRIDE..(i + 1) * CODED_POINT_STRIDE)
            .ok_or_else(too_short)?;
        let offset = i64::from(u32::from_le_bytes(rec[0..4].try_into().unwrap()));
        let value = f64::from_le_bytes(rec[4..12].try_into().unwrap());
        let quality = rec[12];
        out.push(KeyPoint {
            timestamp_us: start_ts_us + offset * time_unit.micros_per_unit(),
            value,
            quality,
        });
    }
    Ok(out)
}

const Q16_STRIDE: usize = 4 + 2 + 1;

fn serialize_quantized(
    records: &[MemRecord],
    start_ts_us: i64,
    time_unit: TimeUnit,
    low: f64,
    high: f64,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(records.len() * Q16_STRIDE);
    for record in records {
        let offset = time_offset(record.timestamp_us, start_ts_us, time_unit) as u32;
        let q = quantized16::encode(record.value.as_f64(), low, high)?;
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&q.to_le_bytes());
        out.push(record.quality);
    }
    Ok(out)
}

fn deserialize_quantized(
    bytes: &[u8],
    start_ts_us: i64,
    time_unit: TimeUnit,
    value_type: ValueType,
    record_count: u32,
    low: f64,
    high: f64,
) -> Result<Vec<MemRecord>> {
    let mut out = Vec::with_capacity(record_count as usize);
    for i in 0..record_count as usize {
        let rec = bytes
            .get(i * Q16_STRIDE..(i + 1) * Q16_STRIDE)
            .ok_or_else(too_short)?;
        let offset = i64::from(u32::from_le_bytes(rec[0..4].try_into().unwrap()));
        let q = u16::from_le_bytes(rec[4..6].try_into().unwrap());
        let quality = rec[6];
        let value = quantized16::decode(q, low, high)?;
        out.push(MemRecord {
            timestamp_us: start_ts_us + offset * time_unit.micros_per_unit(),
            value: Value::from_f64(value_type, value),
            quality,
        });
    }
    Ok(out)
}

/// Parameters needed to encode one tag's drained records into a block.
pub struct EncodeParams {
    pub start_ts_us: i64,
    pub time_unit: TimeUnit,
    pub value_type: ValueType,
    pub encoding_type: EncodingType,
    pub encoding_param1: f32,
    pub encoding_param2: f32,
}

/// Result of encoding one block's worth of records.
pub struct EncodedBlock {
    pub payload: Vec<u8>,
    pub record_count: u32,
}

/// Serializes `records` per `params.encoding_type` (spec.md §4.6 step 1).
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if a Q16-encoded value falls outside
/// `[encoding_param1, encoding_param2]`.
pub fn encode(records: &[MemRecord], params: &EncodeParams) -> Result<EncodedBlock> {
    match params.encoding_type {
        EncodingType::Raw => Ok(EncodedBlock {
            payload: serialize_raw(records, params.start_ts_us, params.time_unit),
            record_count: records.len() as u32,
        }),
        EncodingType::SwingingDoor => {
            let points = swinging_door::encode(
                records,
                f64::from(params.encoding_param1),
                f64::from(params.encoding_param2),
            );
            Ok(EncodedBlock {
                record_count: points.len() as u32,
                payload: serialize_key_points(&points, params.start_ts_us, params.time_unit),
            })
        }
        EncodingType::Quantized16 => {
            let payload = serialize_quantized(
                records,
                params.start_ts_us,
                params.time_unit,
                f64::from(params.encoding_param1),
                f64::from(params.encoding_param2),
            )?;
            Ok(EncodedBlock {
                payload,
                record_count: records.len() as u32,
            })
        }
    }
}

/// Decodes a block's payload back into `MemRecord`s, in physical (= time)
/// order (spec.md §4.7).
///
/// # Errors
///
/// Returns [`Error::CorruptData`] if `payload` is shorter than
/// `record_count` implies for the encoding.
pub fn decode(
    payload: &[u8],
    start_ts_us: i64,
    time_unit: TimeUnit,
    value_type: ValueType,
    encoding_type: EncodingType,
    encoding_param1: f32,
    encoding_param2: f32,
    record_count: u32,
) -> Result<Vec<MemRecord>> {
    match encoding_type {
        EncodingType::Raw => Ok(deserialize_raw(
            payload,
            start_ts_us,
            time_unit,
            value_type,
            record_count,
        )?),
        EncodingType::SwingingDoor => {
            let points = deserialize_key_points(payload, start_ts_us, time_unit, record_count)?;
            Ok(swinging_door::decode_block(&points, value_type))
        }
        EncodingType::Quantized16 => deserialize_quantized(
            payload,
            start_ts_us,
            time_unit,
            value_type,
            record_count,
            f64::from(encoding_param1),
            f64::from(encoding_param2),
        )
        .map_err(|e| match e {
            Error::InvalidArgument(m) => Error::CorruptData(m),
            other => other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn records() -> Vec<MemRecord> {
        (0..10)
            .map(|i| MemRecord {
                timestamp_us: i * 1_000,
                value: Value::F64(100.0 + i as f64 * 0.5),
                quality: 192,
            })
            .collect()
    }

    #[test]
    fn raw_round_trips() -> Result<()> {
        let recs = records();
        let params = EncodeParams {
            start_ts_us: 0,
            time_unit: TimeUnit::Us,
            value_type: ValueType::F64,
            encoding_type: EncodingType::Raw,
            encoding_param1: 0.0,
            encoding_param2: 0.0,
        };
        let encoded = encode(&recs, &params)?;
        assert_eq!(encoded.record_count, 10);
        let decoded = decode(
            &encoded.payload,
            0,
            TimeUnit::Us,
            ValueType::F64,
            EncodingType::Raw,
            0.0,
            0.0,
            encoded.record_count,
        )?;
        assert_eq!(decoded, recs);
        Ok(())
    }

    #[test]
    fn quantized_round_trips_within_precision() -> Result<()> {
        let recs = records();
        let params = EncodeParams {
            start_ts_us: 0,
            time_unit: TimeUnit::Us,
            value_type: ValueType::F64,
            encoding_type: EncodingType::Quantized16,
            encoding_param1: 0.0,
            encoding_param2: 200.0,
        };
        let encoded = encode(&recs, &params)?;
        let decoded = decode(
            &encoded.payload,
            0,
            TimeUnit::Us,
            ValueType::F64,
            EncodingType::Quantized16,
            0.0,
            200.0,
            encoded.record_count,
        )?;
        let bound = quantized16::max_precision_loss(0.0, 200.0);
        for (a, b) in recs.iter().zip(decoded.iter()) {
            assert!((a.value.as_f64() - b.value.as_f64()).abs() <= bound);
        }
        Ok(())
    }
}
