//! Content digest computation.
//!
//! Streams a file through SHA-512 in fixed-size reads. Permission denial is
//! a skip signal rather than an error: a file we cannot read is a file we
//! cannot maintain a digest for, and the caller escalates it to the deletion
//! flow. The hasher does not stat, lock, or retry.

use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read granularity for digest streaming.
const READ_CHUNK: usize = 128 * 1024;

/// Result of attempting to hash a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    /// Digest computed; `size` is the number of bytes streamed.
    Hashed { digest: String, size: u64 },
    /// Open or read was denied; the caller decides what that means.
    Denied,
}

/// Stream `path` through SHA-512 and return the lowercase hex digest.
///
/// Read errors other than permission denial propagate; retry is the
/// caller's concern.
pub fn hash_file(path: &Path) -> io::Result<HashOutcome> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Ok(HashOutcome::Denied);
        }
        Err(e) => return Err(e),
    };

    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut size: u64 = 0;
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Ok(HashOutcome::Denied);
            }
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(HashOutcome::Hashed {
        digest: hex::encode(hasher.finalize()),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // SHA-512 of the empty input.
    const EMPTY_SHA512: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";

    #[test]
    fn test_hash_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        match hash_file(&path).unwrap() {
            HashOutcome::Hashed { digest, size } => {
                assert_eq!(digest, EMPTY_SHA512);
                assert_eq!(size, 0);
            }
            HashOutcome::Denied => panic!("readable file reported as denied"),
        }
    }

    #[test]
    fn test_hash_matches_direct_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("content");
        let content = b"hello filer";
        fs::write(&path, content).unwrap();

        let expected = hex::encode(Sha512::digest(content));
        match hash_file(&path).unwrap() {
            HashOutcome::Hashed { digest, size } => {
                assert_eq!(digest, expected);
                assert_eq!(size, content.len() as u64);
            }
            HashOutcome::Denied => panic!("readable file reported as denied"),
        }
    }

    #[test]
    fn test_hash_spans_multiple_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big");
        let content = vec![0xabu8; READ_CHUNK * 2 + 17];
        fs::write(&path, &content).unwrap();

        let expected = hex::encode(Sha512::digest(&content));
        match hash_file(&path).unwrap() {
            HashOutcome::Hashed { digest, size } => {
                assert_eq!(digest, expected);
                assert_eq!(size, content.len() as u64);
            }
            HashOutcome::Denied => panic!("readable file reported as denied"),
        }
    }

    #[test]
    fn test_hash_missing_file_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let err = hash_file(&temp_dir.path().join("gone")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
