//! Archive checksum computation.
//!
//! Assets may carry an expected checksum; the algorithm is selected by the
//! manager options. An empty checksum on an asset skips verification.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use md5::{Digest, Md5};
use sha1::Sha1;

/// Hash algorithm used to verify downloaded archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha1,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => write!(f, "MD5"),
            ChecksumAlgorithm::Sha1 => write!(f, "SHA-1"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(ChecksumAlgorithm::Md5),
            "SHA1" | "SHA-1" => Ok(ChecksumAlgorithm::Sha1),
            other => Err(format!("unknown checksum algorithm: {}", other)),
        }
    }
}

/// Compute the checksum of a file as a lowercase hex string.
pub fn hash_file(algorithm: ChecksumAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    match algorithm {
        ChecksumAlgorithm::Md5 => hash_reader::<Md5>(&mut file),
        ChecksumAlgorithm::Sha1 => hash_reader::<Sha1>(&mut file),
    }
}

fn hash_reader<D: Digest>(reader: &mut impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let bytes = digest.as_slice();
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push_str(&format!("{:02x}", byte));
    }
    Ok(hex)
}
