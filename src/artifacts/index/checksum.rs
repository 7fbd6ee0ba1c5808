use crate::artifacts::index::CHECKSUM_SIZE;
use crate::errors::RepoError;
use anyhow::anyhow;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

/// Reader/writer wrapper that hashes every byte passing through it so the
/// trailing SHA-1 of the index file can be produced or verified.
#[derive(Debug)]
pub struct Checksum<F> {
    file: F,
    digest: Sha1,
}

impl<F> Checksum<F> {
    pub fn new(file: F) -> Self {
        Checksum {
            file,
            digest: Sha1::new(),
        }
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

impl<F: Read> Checksum<F> {
    pub fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0; size];
        self.file.read_exact(&mut buffer).map_err(|_| {
            RepoError::CorruptIndex("unexpected end-of-file while reading index".to_string())
        })?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    pub fn verify(&mut self) -> anyhow::Result<()> {
        let mut expected = [0u8; CHECKSUM_SIZE];
        self.file.read_exact(&mut expected).map_err(|_| {
            RepoError::CorruptIndex("index file is missing its checksum".to_string())
        })?;

        if expected.as_slice() != self.digest.clone().finalize().as_slice() {
            anyhow::bail!(RepoError::CorruptIndex(
                "checksum does not match value stored on disk".to_string()
            ));
        }

        Ok(())
    }
}

impl<F: Write> Checksum<F> {
    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file.write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    pub fn write_checksum(&mut self) -> anyhow::Result<()> {
        let checksum = self.digest.clone().finalize();
        self.file
            .write_all(checksum.as_slice())
            .map_err(|_| anyhow!("Failed to write checksum to index file"))?;

        Ok(())
    }
}
