use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::PublicKey;
use ed25519_dalek::Signature;
use std::borrow::Cow;
use std::convert::TryInto;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum PointHex {}

impl Hex<RistrettoPoint> for PointHex {
    type Error = String;

    fn create_bytes(point: &RistrettoPoint) -> Cow<[u8]> {
        point.compress().to_bytes().to_vec().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<RistrettoPoint, String> {
        if bytes.len() != 32 {
            return Err(format!("expected 32 byte point, got {} bytes", bytes.len()));
        }
        CompressedRistretto::from_slice(bytes)
            .decompress()
            .ok_or_else(|| "invalid ristretto point".to_owned())
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum ScalarHex {}

impl Hex<Scalar> for ScalarHex {
    type Error = String;

    fn create_bytes(scalar: &Scalar) -> Cow<[u8]> {
        scalar.to_bytes().to_vec().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Scalar, String> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("expected 32 byte scalar, got {} bytes", bytes.len()))?;
        Scalar::from_canonical_bytes(bytes).ok_or_else(|| "non-canonical scalar".to_owned())
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum HashHex {}

impl Hex<[u8; 32]> for HashHex {
    type Error = String;

    fn create_bytes(hash: &[u8; 32]) -> Cow<[u8]> {
        hash.to_vec().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<[u8; 32], String> {
        bytes
            .try_into()
            .map_err(|_| format!("expected 32 byte hash, got {} bytes", bytes.len()))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum EdPublicKeyHex {}

impl Hex<PublicKey> for EdPublicKeyHex {
    type Error = String;

    fn create_bytes(public_key: &PublicKey) -> Cow<[u8]> {
        public_key.as_ref().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<PublicKey, String> {
        PublicKey::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum EdSignatureHex {}

impl Hex<Signature> for EdSignatureHex {
    type Error = String;

    fn create_bytes(sig: &Signature) -> Cow<[u8]> {
        sig.to_bytes().to_vec().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Signature, String> {
        Signature::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

fn decode_hex<T, H: Hex<T>, E: serde::de::Error>(s: &str) -> Result<T, E> {
    let bytes = hex::decode(s).map_err(E::custom)?;
    H::from_bytes(&bytes).map_err(E::custom)
}

/// `Option<RistrettoPoint>` as an optional hex string
pub mod opt_point_hex {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<RistrettoPoint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|point| hex::encode(PointHex::create_bytes(&point)))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<RistrettoPoint>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| decode_hex::<_, PointHex, _>(&s)).transpose()
    }
}

/// `Option<[u8; 32]>` as an optional hex string
pub mod opt_hash_hex {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<[u8; 32]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(hex::encode).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<[u8; 32]>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| decode_hex::<_, HashHex, _>(&s)).transpose()
    }
}
