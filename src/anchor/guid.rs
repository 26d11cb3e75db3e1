//! 128-bit stable anchor identifier
//!
//! Anchors and in-flight persistence requests are keyed by [`SerializableGuid`],
//! a 128-bit value stored as two `u64` halves so it round-trips through flat
//! binary layouts without byte-order surprises.

use crate::error::{GeopinError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 128-bit identifier used as a stable key for anchors and requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SerializableGuid {
    low: u64,
    high: u64,
}

impl SerializableGuid {
    /// Build from the two halves
    pub const fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// The all-zero guid
    pub const fn nil() -> Self {
        Self { low: 0, high: 0 }
    }

    /// Check for the all-zero guid
    pub const fn is_nil(&self) -> bool {
        self.low == 0 && self.high == 0
    }

    /// Low 64 bits
    pub const fn low(&self) -> u64 {
        self.low
    }

    /// High 64 bits
    pub const fn high(&self) -> u64 {
        self.high
    }

    /// Generate a random guid
    pub fn random() -> Self {
        Self {
            low: rand::random(),
            high: rand::random(),
        }
    }

    /// Reconstruct from the little-endian byte layout
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut low = [0u8; 8];
        let mut high = [0u8; 8];
        low.copy_from_slice(&bytes[..8]);
        high.copy_from_slice(&bytes[8..]);
        Self {
            low: u64::from_le_bytes(low),
            high: u64::from_le_bytes(high),
        }
    }

    /// Little-endian byte layout: low half first
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.low.to_le_bytes());
        bytes[8..].copy_from_slice(&self.high.to_le_bytes());
        bytes
    }
}

impl fmt::Display for SerializableGuid {
    /// Hyphenated lowercase hex over the byte layout, 8-4-4-4-12
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        for (i, byte) in b.iter().enumerate() {
            if i == 4 || i == 6 || i == 8 || i == 10 {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for SerializableGuid {
    type Err = GeopinError;

    fn from_str(s: &str) -> Result<Self> {
        let hex: String = match s.len() {
            36 => {
                let parts: Vec<&str> = s.split('-').collect();
                if parts.len() != 5
                    || parts[0].len() != 8
                    || parts[1].len() != 4
                    || parts[2].len() != 4
                    || parts[3].len() != 4
                    || parts[4].len() != 12
                {
                    return Err(GeopinError::invalid_data(format!("malformed guid {:?}", s)));
                }
                parts.concat()
            }
            32 => s.to_string(),
            _ => return Err(GeopinError::invalid_data(format!("malformed guid {:?}", s))),
        };
        let mut bytes = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            // from_str_radix tolerates a leading sign, so check the digits first
            if !chunk.iter().all(u8::is_ascii_hexdigit) {
                return Err(GeopinError::invalid_data(format!("malformed guid {:?}", s)));
            }
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| GeopinError::invalid_data(format!("malformed guid {:?}", s)))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| GeopinError::invalid_data(format!("malformed guid {:?}", s)))?;
        }
        Ok(Self::from_bytes(bytes))
    }
}
