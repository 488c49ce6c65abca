use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a file, streamed in fixed-size blocks
/// so memory use stays bounded regardless of file size.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::sha256_file;

    #[test]
    fn digest_matches_known_vector() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("abc.bin");
        fs::write(&path, b"abc").expect("write");

        assert_eq!(
            sha256_file(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_stable_across_reads() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("data.evtx");
        fs::write(&path, vec![0xAB_u8; 200_000]).expect("write");

        let first = sha256_file(&path).expect("first hash");
        let second = sha256_file(&path).expect("second hash");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        assert!(sha256_file(&temp.path().join("absent.evtx")).is_err());
    }
}
