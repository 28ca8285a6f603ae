// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Write};

/// Error during serialization of an on-disk structure.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
    /// A field value cannot be represented in its on-disk encoding.
    InvalidValue(String),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "EncodeError(io: {e})"),
            Self::InvalidValue(m) => write!(f, "EncodeError(invalid value: {m})"),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidValue(_) => None,
        }
    }
}

/// Error during deserialization of an on-disk structure.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),
    /// Magic bytes did not match the expected value.
    InvalidMagic(&'static str),
    /// An enum tag byte had no known meaning.
    InvalidTag(&'static str, u8),
    /// A checksum embedded in the structure did not match its payload.
    ChecksumMismatch,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError(io: {e})"),
            Self::InvalidMagic(what) => write!(f, "DecodeError(invalid magic: {what})"),
            Self::InvalidTag(what, tag) => write!(f, "DecodeError(invalid {what} tag: {tag})"),
            Self::ChecksumMismatch => write!(f, "DecodeError(checksum mismatch)"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Trait for serializing fixed-width on-disk structures.
pub trait Encode {
    /// Serializes into a writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a freshly allocated vector.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("in-memory encode cannot fail");
        v
    }
}

/// Trait for deserializing fixed-width on-disk structures.
pub trait Decode {
    /// Deserializes from a reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
