use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// 32-bit token hash functions a signature can be built with.
///
/// All variants are deterministic across processes and platforms and
/// produce unsigned output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashFunction {
    /// First four bytes of the SHA-1 digest, read little-endian.
    #[default]
    Sha1,
    /// MurmurHash3 x86 32-bit with seed 0.
    Mmh3,
    /// CRC-32 (IEEE).
    Crc32,
    /// Low 32 bits of XXH3-64.
    Xxh3,
}

impl HashFunction {
    /// Resolve a hash function by name. The empty name selects the
    /// default (`sha1`).
    ///
    /// # Examples
    ///
    /// ```
    /// use neardup::hashing::HashFunction;
    ///
    /// assert_eq!(HashFunction::from_name("").unwrap(), HashFunction::Sha1);
    /// assert_eq!(HashFunction::from_name("mmh3").unwrap(), HashFunction::Mmh3);
    /// assert!(HashFunction::from_name("md5").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "" | "sha1" => Ok(Self::Sha1),
            "mmh3" => Ok(Self::Mmh3),
            "crc32" => Ok(Self::Crc32),
            "xxh3" => Ok(Self::Xxh3),
            _ => Err(Error::UnknownComponent {
                kind: "hash function",
                name: name.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Mmh3 => "mmh3",
            Self::Crc32 => "crc32",
            Self::Xxh3 => "xxh3",
        }
    }

    pub fn hash(self, data: &[u8]) -> u32 {
        match self {
            Self::Sha1 => {
                let digest = Sha1::digest(data);
                u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
            }
            Self::Mmh3 => mur3::murmurhash3_x86_32(data, 0),
            Self::Crc32 => crc32fast::hash(data),
            Self::Xxh3 => xxhash_rust::xxh3::xxh3_64(data) as u32,
        }
    }
}
