use core::fmt;
use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hardware address of a radio node, written as `AA:BB:CC:DD:EE:FF`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    pub const LEN: usize = 6;

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAddressError {
    /// Not exactly six `:`-separated groups
    WrongLength,
    /// A group that is not a two-digit hex byte
    BadOctet,
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAddressError::WrongLength => f.write_str("expected six colon-separated octets"),
            ParseAddressError::BadOctet => f.write_str("octet is not a two-digit hex byte"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseAddressError {}

impl FromStr for PeerAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(':');

        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(ParseAddressError::WrongLength)?;
            if part.len() != 2 {
                return Err(ParseAddressError::BadOctet);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError::BadOctet)?;
        }

        if parts.next().is_some() {
            return Err(ParseAddressError::WrongLength);
        }

        Ok(Self(bytes))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AddressVisitor;

        impl Visitor<'_> for AddressVisitor {
            type Value = PeerAddress;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a hardware address like \"D4:8A:FC:C7:BB:B0\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PeerAddress, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(AddressVisitor)
    }
}
