//! Streaming file hashing for download verification.
//!
//! Model binaries run to gigabytes, so hashing is chunked and runs on
//! the blocking pool instead of buffering the file or stalling the
//! async runtime.

use crate::error::{Result, ScoutError};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const HASH_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

/// An expected digest with its algorithm.
///
/// Parsed from `"sha256:<hex>"` / `"blake3:<hex>"`; a bare hex string is
/// treated as SHA-256, which is what catalogs publish unlabeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ExpectedHash {
    pub fn parse(raw: &str) -> Result<Self> {
        let (algorithm, hex) = match raw.split_once(':') {
            Some(("sha256", hex)) => (HashAlgorithm::Sha256, hex),
            Some(("blake3", hex)) => (HashAlgorithm::Blake3, hex),
            Some((other, _)) => {
                return Err(ScoutError::Config {
                    message: format!("Unsupported hash algorithm: {}", other),
                })
            }
            None => (HashAlgorithm::Sha256, raw),
        };

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ScoutError::Config {
                message: format!("Invalid hash digest: {}", raw),
            });
        }

        Ok(Self {
            algorithm,
            hex: hex.to_lowercase(),
        })
    }

    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            hex: hex.into().to_lowercase(),
        }
    }
}

/// Compute a file digest on the blocking pool.
pub async fn compute_hash(path: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Result<String> {
    let path = path.into();
    tokio::task::spawn_blocking(move || compute_hash_sync(&path, algorithm))
        .await
        .map_err(|e| ScoutError::Other(format!("Hashing task panicked: {}", e)))?
}

fn compute_hash_sync(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| ScoutError::io_with_path(e, path))?;
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    let digest = match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let read = file
                    .read(&mut buffer)
                    .map_err(|e| ScoutError::io_with_path(e, path))?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            loop {
                let read = file
                    .read(&mut buffer)
                    .map_err(|e| ScoutError::io_with_path(e, path))?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            hasher.finalize().to_hex().to_string()
        }
    };

    debug!("{} of {}: {}", algorithm.as_str(), path.display(), digest);
    Ok(digest)
}

/// Hash a file and compare against the expected digest.
///
/// Returns the actual digest on match, [`ScoutError::HashMismatch`]
/// otherwise.
pub async fn verify_file(path: impl Into<PathBuf>, expected: &ExpectedHash) -> Result<String> {
    let path = path.into();
    let actual = compute_hash(&path, expected.algorithm).await?;
    if actual != expected.hex {
        return Err(ScoutError::HashMismatch {
            expected: expected.hex.clone(),
            actual,
        });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_sha256_known_vector() {
        let file = temp_file_with(b"abc");
        let digest = compute_hash(file.path(), HashAlgorithm::Sha256).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_verify_mismatch() {
        let file = temp_file_with(b"not the right bytes");
        let expected = ExpectedHash::sha256("aa".repeat(32));
        let err = verify_file(file.path(), &expected).await.unwrap_err();
        assert!(matches!(err, ScoutError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_blake3_roundtrip() {
        let file = temp_file_with(b"hello blake");
        let digest = compute_hash(file.path(), HashAlgorithm::Blake3).await.unwrap();
        let expected = ExpectedHash {
            algorithm: HashAlgorithm::Blake3,
            hex: digest.clone(),
        };
        assert_eq!(verify_file(file.path(), &expected).await.unwrap(), digest);
    }

    #[test]
    fn test_parse_prefixed_and_bare() {
        let prefixed = ExpectedHash::parse("sha256:ABCDEF01").unwrap();
        assert_eq!(prefixed.algorithm, HashAlgorithm::Sha256);
        assert_eq!(prefixed.hex, "abcdef01");

        let blake = ExpectedHash::parse("blake3:1234abcd").unwrap();
        assert_eq!(blake.algorithm, HashAlgorithm::Blake3);

        let bare = ExpectedHash::parse("deadbeef").unwrap();
        assert_eq!(bare.algorithm, HashAlgorithm::Sha256);

        assert!(ExpectedHash::parse("md5:abcd").is_err());
        assert!(ExpectedHash::parse("sha256:not-hex").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = compute_hash("/nonexistent/file.bin", HashAlgorithm::Sha256)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::Io { .. }));
    }
}
