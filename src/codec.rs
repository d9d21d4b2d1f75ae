//! Opaque object encoding.
//!
//! The store never interprets composite objects: an [`ObjectCodec`] turns a value into
//! bytes, and those bytes are stored verbatim as a blob entry. [`BincodeCodec`] is the
//! default codec. It wraps the payload in an envelope recording the Rust type name and
//! refuses to decode a payload written for a different type.
use std::{any::type_name, fmt};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode object: {0}")]
    Serialize(#[from] bincode::error::EncodeError),

    #[error("failed to decode object: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),

    #[error("object type mismatch, expected '{expected}' found '{found}'")]
    TypeMismatch { expected: String, found: String },
}

/// Converts application objects of type `T` to bytes and back.
pub trait ObjectCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Envelope written by [`BincodeCodec`].
#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct EncodedObject {
    type_name: String,
    payload: Vec<u8>,
}

#[derive(Clone, Copy)]
pub struct BincodeCodec {
    config: Configuration<BigEndian, Fixint>,
}

impl fmt::Debug for BincodeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec").finish_non_exhaustive()
    }
}

impl BincodeCodec {
    pub fn new() -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self { config }
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectCodec<T> for BincodeCodec
where
    T: Encode + Decode<()>,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let envelope = EncodedObject {
            type_name: type_name::<T>().to_string(),
            payload: encode_to_vec(value, self.config)?,
        };
        Ok(encode_to_vec(envelope, self.config)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let (envelope, _): (EncodedObject, _) = decode_from_slice(bytes, self.config)?;

        let expected = type_name::<T>();
        if envelope.type_name != expected {
            return Err(CodecError::TypeMismatch {
                expected: expected.to_string(),
                found: envelope.type_name,
            });
        }

        let (value, _) = decode_from_slice(&envelope.payload, self.config)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Encode, Decode, PartialEq)]
    struct Profile {
        name: String,
        visits: u32,
        tags: Vec<String>,
    }

    #[derive(Debug, Encode, Decode, PartialEq)]
    struct Other {
        name: String,
    }

    #[test]
    fn codec_round_trips_objects() {
        let codec = BincodeCodec::new();
        let profile = Profile {
            name: "ada".into(),
            visits: 3,
            tags: vec!["admin".into()],
        };

        let bytes = codec.encode(&profile).unwrap();
        let decoded: Profile = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    #[should_panic(expected = "TypeMismatch")]
    fn codec_rejects_other_types() {
        let codec = BincodeCodec::new();
        let bytes = codec.encode(&Other { name: "x".into() }).unwrap();

        let _: Profile = codec.decode(&bytes).unwrap();
    }

    #[test]
    #[should_panic(expected = "Deserialize")]
    fn codec_rejects_garbage() {
        let codec = BincodeCodec::new();

        let _: Profile = codec.decode(&[0xff, 0x01]).unwrap();
    }

    #[test]
    fn codec_debug_output() {
        assert_eq!(format!("{:?}", BincodeCodec::default()), "BincodeCodec { .. }");
    }
}
