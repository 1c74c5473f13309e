use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;

use crate::error::TypeError;

/// Sentinel for a digest that has not been computed (or cannot be known
/// without materializing the content).
pub const BLOB_UNKNOWN_DIGEST: Option<Digest> = None;

/// Sentinel for a blob size that has not been computed. A known size of zero
/// is `Some(0)`, never this value.
pub const BLOB_UNKNOWN_SIZE: Option<u64> = None;

/// Hash functions a [`Digest`] can be expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// The canonical algorithm for blob content.
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl DigestAlgorithm {
    /// The algorithm used when nothing else is requested.
    pub const CANONICAL: Self = Self::Sha256;

    /// Name used as the prefix of the string form (`sha256:...`).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Length of the raw hash in bytes.
    pub const fn hash_len(&self) -> usize {
        match self {
            Self::Sha256 | Self::Blake3 => 32,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            other => Err(TypeError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Content digest of a blob.
///
/// A `Digest` pairs a [`DigestAlgorithm`] with the raw hash it produced.
/// Identical content always produces the same digest for a given algorithm,
/// which is what makes blobs content-addressable. The string form follows the
/// OCI convention `algorithm:lowercase-hex`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hash: Vec<u8>,
}

impl Digest {
    /// Compute the canonical (SHA-256) digest of raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            hash: sha2::Sha256::digest(data).to_vec(),
        }
    }

    /// Compute the digest of raw bytes with the given algorithm.
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let hash = match algorithm {
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
            DigestAlgorithm::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        };
        Self { algorithm, hash }
    }

    /// Create a digest from a pre-computed hash.
    pub fn from_hash(algorithm: DigestAlgorithm, hash: Vec<u8>) -> Result<Self, TypeError> {
        if hash.len() != algorithm.hash_len() {
            return Err(TypeError::InvalidLength {
                algorithm: algorithm.name(),
                expected: algorithm.hash_len(),
                actual: hash.len(),
            });
        }
        Ok(Self { algorithm, hash })
    }

    /// Parse the `algorithm:hex` string form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| TypeError::MalformedDigest(s.to_string()))?;
        let algorithm: DigestAlgorithm = algorithm.parse()?;
        if encoded.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(TypeError::InvalidHex(encoded.to_string()));
        }
        let hash = hex::decode(encoded).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_hash(algorithm, hash)
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.hash
    }

    /// Hex-encoded hash without the algorithm prefix.
    pub fn encoded(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Short hex representation (first 12 characters), for log output.
    pub fn short_hex(&self) -> String {
        let mut s = self.encoded();
        s.truncate(12);
        s
    }

    /// A flat name usable as a file name (`sha256.<hex>`).
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.algorithm.name(), self.encoded())
    }

    /// Verify that data produces this digest.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(self.algorithm, data) == *self
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded())
    }
}

impl FromStr for Digest {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
