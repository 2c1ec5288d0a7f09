use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;

/// Possible errors to occur while constructing a [`Uint128`]
#[derive(Debug, thiserror::Error)]
pub enum Uint128Error {
    #[error("Expected exactly 16 bytes, got {got}")]
    InvalidLength { got: usize },
    #[error("Hex string has {len} characters, at most 32 are allowed")]
    HexTooLong { len: usize },
    #[error("Malformed hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("The value is negative or does not fit into 128 bits")]
    NegativeOrOverflow,
}

/// An unsigned 128-bit integer, stored as two 64-bit halves
///
/// The logical value is `hi * 2^64 + lo`. This is the shape the external
/// ledger uses for identifiers and amounts. The text form is a big-endian hex
/// string without leading zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uint128 {
    // field order matters: the derived ordering compares `hi` first
    hi: u64,
    lo: u64,
}

impl Uint128 {
    pub const ZERO: Self = Self { hi: 0, lo: 0 };
    pub const MAX: Self = Self { hi: u64::MAX, lo: u64::MAX };

    /// Creates a value from its high and low halves
    pub const fn from_parts(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Creates a value from a 64-bit integer
    pub const fn from_u64(value: u64) -> Self {
        Self { hi: 0, lo: value }
    }

    /// Creates a value from a 16-byte little-endian buffer
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, Uint128Error> {
        if bytes.len() != 16 {
            return Err(Uint128Error::InvalidLength { got: bytes.len() });
        }

        Ok(Self {
            lo: LittleEndian::read_u64(&bytes[0..8]),
            hi: LittleEndian::read_u64(&bytes[8..16]),
        })
    }

    /// Parses a big-endian hex string of at most 32 characters
    ///
    /// Odd lengths are read as if they had a leading `0`, and the empty
    /// string is zero.
    pub fn from_hex(s: &str) -> Result<Self, Uint128Error> {
        if s.is_empty() {
            return Ok(Self::ZERO);
        }
        if s.len() > 32 {
            return Err(Uint128Error::HexTooLong { len: s.len() });
        }

        let padded;
        let digits = if s.len() % 2 == 1 {
            padded = format!("0{}", s);
            padded.as_str()
        } else {
            s
        };

        let mut buf = [0u8; 16];
        hex::decode_to_slice(digits, &mut buf[16 - digits.len() / 2..])?;

        Ok(Self {
            hi: BigEndian::read_u64(&buf[0..8]),
            lo: BigEndian::read_u64(&buf[8..16]),
        })
    }

    /// Converts an arbitrary-precision integer, which has to be in `0..2^128`
    pub fn from_bigint(value: &BigInt) -> Result<Self, Uint128Error> {
        match value.sign() {
            Sign::Minus => Err(Uint128Error::NegativeOrOverflow),
            _ => Self::from_biguint(value.magnitude()),
        }
    }

    /// Converts an arbitrary-precision unsigned integer below `2^128`
    pub fn from_biguint(value: &BigUint) -> Result<Self, Uint128Error> {
        if value.bits() > 128 {
            return Err(Uint128Error::NegativeOrOverflow);
        }

        value
            .to_u128()
            .map(Self::from)
            .ok_or(Uint128Error::NegativeOrOverflow)
    }

    /// Generates a new time-ordered identifier
    ///
    /// The upper 48 bits hold the milliseconds since the UNIX epoch, the lower
    /// 80 bits are random. Identifiers generated within the same millisecond
    /// are strictly increasing.
    pub fn new_id() -> Self {
        ID_GENERATOR
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next()
    }

    /// The upper 64 bits
    pub const fn hi(&self) -> u64 {
        self.hi
    }

    /// The lower 64 bits
    pub const fn lo(&self) -> u64 {
        self.lo
    }

    /// Whether both halves are zero
    pub const fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    /// Returns the value if it fits into 64 bits
    pub const fn to_u64(&self) -> Option<u64> {
        match self.hi {
            0 => Some(self.lo),
            _ => None,
        }
    }

    /// The value as a native `u128`
    pub const fn as_u128(&self) -> u128 {
        (self.hi as u128) << 64 | self.lo as u128
    }

    /// The 16-byte little-endian representation
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        LittleEndian::write_u64(&mut bytes[0..8], self.lo);
        LittleEndian::write_u64(&mut bytes[8..16], self.hi);
        bytes
    }

    /// The big-endian hex representation, without leading zeros
    ///
    /// Zero is rendered as `"0"`.
    pub fn to_hex(&self) -> String {
        format!("{:x}", self.as_u128())
    }

    /// The value as an unsigned big integer
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from(self.as_u128())
    }

    /// The value as a non-negative signed big integer
    pub fn to_bigint(&self) -> BigInt {
        BigInt::from(self.as_u128())
    }
}

impl From<u64> for Uint128 {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<u128> for Uint128 {
    fn from(value: u128) -> Self {
        Self {
            hi: (value >> 64) as u64,
            lo: value as u64,
        }
    }
}

impl From<Uint128> for u128 {
    fn from(value: Uint128) -> Self {
        value.as_u128()
    }
}

impl TryFrom<&BigInt> for Uint128 {
    type Error = Uint128Error;

    fn try_from(value: &BigInt) -> Result<Self, Self::Error> {
        Self::from_bigint(value)
    }
}

impl TryFrom<&BigUint> for Uint128 {
    type Error = Uint128Error;

    fn try_from(value: &BigUint) -> Result<Self, Self::Error> {
        Self::from_biguint(value)
    }
}

impl fmt::Display for Uint128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Uint128 {
    type Err = Uint128Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl serde::Serialize for Uint128 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where S: serde::Serializer
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Uint128 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de>
    {
        struct HexVisitor;

        impl<'de> serde::de::Visitor<'de> for HexVisitor {
            type Value = Uint128;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a big-endian hex string of at most 32 characters")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                where E: serde::de::Error
            {
                Uint128::from_hex(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

const RANDOM_BITS: u32 = 80;
const RANDOM_MASK: u128 = (1 << RANDOM_BITS) - 1;
const MILLIS_MASK: u64 = (1 << 48) - 1;

static ID_GENERATOR: Mutex<IdGenerator> = Mutex::new(IdGenerator { millis: 0, random: 0 });

struct IdGenerator {
    millis: u64,
    random: u128,
}

impl IdGenerator {
    fn next(&mut self) -> Uint128 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64 & MILLIS_MASK)
            .unwrap_or_default();

        if now > self.millis {
            self.millis = now;
            self.random = rand::random::<u128>() & RANDOM_MASK;
        } else if self.random == RANDOM_MASK {
            // the random part is exhausted for this millisecond
            self.millis += 1;
            self.random = 0;
        } else {
            self.random += 1;
        }

        Uint128::from((self.millis as u128) << RANDOM_BITS | self.random)
    }
}
