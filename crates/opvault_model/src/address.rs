//! Opaque 20-byte identifiers for accounts, assets and deployed components

use core::fmt;
use core::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Address-like identifier.
///
/// The all-zero value is a sentinel meaning "no asset" or the native
/// currency, depending on where it appears.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Derive a stable identifier from a domain tag and any serializable input.
    ///
    /// The input is bincode-encoded and hashed with blake3; the first 20 bytes
    /// of the digest become the address. Same inputs always give the same address.
    pub fn derive<T: Serialize + ?Sized>(domain: &str, input: &T) -> Address {
        let digest = digest(domain, input);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Address(out)
    }

    /// Convenience for tests and fixtures: an address whose last bytes hold `n`.
    pub fn from_low_u64(n: u64) -> Address {
        let mut out = [0u8; 20];
        out[12..].copy_from_slice(&n.to_be_bytes());
        Address(out)
    }
}

/// 32-byte blake3 digest of `domain || bincode(input)`.
pub fn digest<T: Serialize + ?Sized>(domain: &str, input: &T) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    // bincode only fails on non-serializable shapes (maps with non-string keys
    // are fine here); fall back to hashing nothing extra in that case.
    if let Ok(bytes) = bincode::serialize(input) {
        hasher.update(&bytes);
    }
    *hasher.finalize().as_bytes()
}

/// Error returned when parsing an address from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(pub String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(body).map_err(|_| ParseAddressError(s.to_string()))?;
        if bytes.len() != 20 {
            return Err(ParseAddressError(s.to_string()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            let raw = <[u8; 20]>::deserialize(deserializer)?;
            Ok(Address(raw))
        }
    }
}
