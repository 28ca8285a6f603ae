// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Value types, time units and quality codes shared by every on-disk and
//! in-memory record (spec.md §3, §6).

use crate::coding::DecodeError;

/// The type of a tag's numeric payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueType {
    /// 1-byte boolean.
    Bool,
    /// 4-byte signed integer.
    I32,
    /// 4-byte IEEE-754 float.
    F32,
    /// 8-byte IEEE-754 float.
    F64,
}

impl ValueType {
    /// Width in bytes of one value of this type.
    #[must_use]
    pub const fn byte_width(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl TryFrom<u8> for ValueType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Bool),
            2 => Ok(Self::I32),
            3 => Ok(Self::F32),
            4 => Ok(Self::F64),
            other => Err(DecodeError::InvalidTag("ValueType", other)),
        }
    }
}

impl From<ValueType> for u8 {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Bool => 1,
            ValueType::I32 => 2,
            ValueType::F32 => 3,
            ValueType::F64 => 4,
        }
    }
}

/// A single numeric sample, tagged with its runtime type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    F32(f32),
    F64(f64),
}

impl Value {
    #[must_use]
    pub fn value_type(self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::I32(_) => ValueType::I32,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
        }
    }

    /// Widens the value to `f64`, the common currency used by codecs that
    /// operate on a continuous range (Swinging-Door, Q16, the resampler).
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::I32(i) => f64::from(i),
            Self::F32(f) => f64::from(f),
            Self::F64(f) => f,
        }
    }

    /// Narrows an `f64` back to the given runtime type.
    #[must_use]
    pub fn from_f64(value_type: ValueType, v: f64) -> Self {
        match value_type {
            ValueType::Bool => Self::Bool(v != 0.0),
            ValueType::I32 => Self::I32(v.round() as i32),
            ValueType::F32 => Self::F32(v as f32),
            ValueType::F64 => Self::F64(v),
        }
    }

    /// Packs the value into its `byte_width()` little-endian on-disk bytes.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            Self::Bool(b) => vec![u8::from(b)],
            Self::I32(i) => i.to_le_bytes().to_vec(),
            Self::F32(f) => f.to_le_bytes().to_vec(),
            Self::F64(f) => f.to_le_bytes().to_vec(),
        }
    }

    /// Unpacks a value of the given type from its on-disk bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Io`] if `bytes` is shorter than the type's
    /// `byte_width()`.
    pub fn from_bytes(value_type: ValueType, bytes: &[u8]) -> Result<Self, DecodeError> {
        let short = || {
            DecodeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "value bytes too short",
            ))
        };
        Ok(match value_type {
            ValueType::Bool => Self::Bool(*bytes.first().ok_or_else(short)? != 0),
            ValueType::I32 => {
                let arr: [u8; 4] = bytes.get(..4).ok_or_else(short)?.try_into().unwrap();
                Self::I32(i32::from_le_bytes(arr))
            }
            ValueType::F32 => {
                let arr: [u8; 4] = bytes.get(..4).ok_or_else(short)?.try_into().unwrap();
                Self::F32(f32::from_le_bytes(arr))
            }
            ValueType::F64 => {
                let arr: [u8; 8] = bytes.get(..8).ok_or_else(short)?.try_into().unwrap();
                Self::F64(f64::from_le_bytes(arr))
            }
        })
    }
}

/// Multiplier applied to a block-local `time_offset` to get microseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TimeUnit {
    Us = 1,
    Us10 = 10,
    Us100 = 100,
    Ms = 1_000,
    Ms10 = 10_000,
    Ms100 = 100_000,
}

impl TimeUnit {
    #[must_use]
    pub const fn micros_per_unit(self) -> i64 {
        self as i64
    }

    /// Picks the coarsest unit that still represents `span_us` without
    /// losing sub-unit precision needed to address every microsecond tick
    /// actually present in `min_delta_us` (the smallest gap between two
    /// records in the buffer being serialized).
    #[must_use]
    pub fn choose(min_delta_us: i64) -> Self {
        const CANDIDATES: [TimeUnit; 6] = [
            TimeUnit::Us,
            TimeUnit::Us10,
            TimeUnit::Us100,
            TimeUnit::Ms,
            TimeUnit::Ms10,
            TimeUnit::Ms100,
        ];
        let mut chosen = TimeUnit::Us;
        for unit in CANDIDATES {
            if min_delta_us > 0 && min_delta_us % unit.micros_per_unit() == 0 {
                chosen = unit;
            } else {
                break;
            }
        }
        chosen
    }
}

/// On-disk tag for a `TimeUnit`, distinct from `micros_per_unit()` so the
/// wire format stays a single small byte regardless of the multiplier.
impl TimeUnit {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Us => 0,
            Self::Us10 => 1,
            Self::Us100 => 2,
            Self::Ms => 3,
            Self::Ms10 => 4,
            Self::Ms100 => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Us),
            1 => Ok(Self::Us10),
            2 => Ok(Self::Us100),
            3 => Ok(Self::Ms),
            4 => Ok(Self::Ms10),
            5 => Ok(Self::Ms100),
            other => Err(DecodeError::InvalidTag("TimeUnit", other)),
        }
    }
}

/// Quality byte accompanying every sample.
pub mod quality {
    pub const GOOD: u8 = 192;
    pub const UNCERTAIN: u8 = 128;
    pub const BAD: u8 = 0;
}

/// Data block payload encoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EncodingType {
    Raw,
    SwingingDoor,
    Quantized16,
}

impl EncodingType {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::SwingingDoor => 1,
            Self::Quantized16 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Raw),
            1 => Ok(Self::SwingingDoor),
            2 => Ok(Self::Quantized16),
            other => Err(DecodeError::InvalidTag("EncodingType", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn value_round_trips() {
        for (vt, v) in [
            (ValueType::Bool, Value::Bool(true)),
            (ValueType::I32, Value::I32(-42)),
            (ValueType::F32, Value::F32(1.5)),
            (ValueType::F64, Value::F64(100.5)),
        ] {
            let bytes = v.to_bytes();
            assert_eq!(bytes.len(), vt.byte_width());
            assert_eq!(Value::from_bytes(vt, &bytes).unwrap(), v);
        }
    }

    #[test]
    fn time_unit_tag_round_trips() {
        for unit in [
            TimeUnit::Us,
            TimeUnit::Us10,
            TimeUnit::Us100,
            TimeUnit::Ms,
            TimeUnit::Ms10,
            TimeUnit::Ms100,
        ] {
            assert_eq!(TimeUnit::from_tag(unit.tag()).unwrap(), unit);
        }
    }

    #[test]
    fn time_unit_choose_picks_coarsest_exact_unit() {
        assert_eq!(TimeUnit::choose(1000), TimeUnit::Ms);
        assert_eq!(TimeUnit::choose(1), TimeUnit::Us);
        assert_eq!(TimeUnit::choose(100_000), TimeUnit::Ms100);
    }
}
