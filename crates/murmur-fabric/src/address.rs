use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::FabricError;

/// A 32-byte opaque agent identifier.
///
/// No routing information is embedded; locality is a property of the actor
/// registry, not the address.  Two addresses are equal iff their bytes are
/// equal.  The textual form is 64 lower-case hex characters; parsing accepts
/// either case, emission is canonical.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 32]);

impl Address {
    pub const LEN: usize = 32;

    /// A fresh random address from the thread-local CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; Self::LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Exactly 32 bytes, or `InvalidAddress`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FabricError> {
        let array: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| FabricError::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(array))
    }

    /// A UUID occupies the first 16 bytes; the rest is zero-padded.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let mut bytes = [0u8; Self::LEN];
        bytes[..16].copy_from_slice(uuid.as_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Canonical 64-character lower-case hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, case-insensitively.
    pub fn parse(text: &str) -> Result<Self, FabricError> {
        let bytes =
            hex::decode(text).map_err(|e| FabricError::InvalidAddress(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}…)", &self.to_hex()[..8])
    }
}

impl TryFrom<String> for Address {
    type Error = FabricError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_hex()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_addresses_differ() {
        assert_ne!(Address::random(), Address::random());
    }

    #[test]
    fn hex_round_trip() {
        let a = Address::random();
        assert_eq!(Address::parse(&a.to_hex()).unwrap(), a);
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.to_hex(), a.to_hex().to_lowercase());
    }

    #[test]
    fn parse_is_case_insensitive() {
        let a = Address::random();
        assert_eq!(Address::parse(&a.to_hex().to_uppercase()).unwrap(), a);
    }

    #[test]
    fn from_bytes_requires_exactly_32() {
        assert!(Address::from_bytes(&[0u8; 31]).is_err());
        assert!(Address::from_bytes(&[0u8; 33]).is_err());
        assert!(Address::from_bytes(&[7u8; 32]).is_ok());
    }

    #[test]
    fn from_uuid_zero_pads_the_tail() {
        let uuid = Uuid::new_v4();
        let a = Address::from_uuid(uuid);
        assert_eq!(&a.as_bytes()[..16], uuid.as_bytes());
        assert_eq!(&a.as_bytes()[16..], &[0u8; 16]);
    }

    #[test]
    fn equality_is_byte_equality() {
        let a = Address::from_bytes(&[1u8; 32]).unwrap();
        let b = Address::from_bytes(&[1u8; 32]).unwrap();
        let c = Address::from_bytes(&[2u8; 32]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn serde_round_trips_through_hex_string() {
        let a = Address::random();
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains(&a.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn invalid_hex_is_rejected() {
        assert!(Address::parse("zz").is_err());
        assert!(Address::parse(&"ab".repeat(16)).is_err()); // 16 bytes only
    }
}
