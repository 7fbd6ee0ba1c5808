use crate::errors::RepoError;
use flate2::Crc;
use sha1::{Digest, Sha1};
use std::io::{BufRead, Read};

const BUFFER_SIZE: usize = 8192;

/// Buffered reader over a pack stream.
///
/// Bytes are hashed when they are *consumed*, not when they are buffered, so a
/// zlib decoder reading through `BufRead` only accounts for the compressed
/// bytes it actually used and the next record starts at the right place.
pub struct Stream<R> {
    inner: R,
    buffer: Box<[u8]>,
    pos: usize,
    cap: usize,
    offset: u64,
    digest: Sha1,
    crc: Option<Crc>,
}

impl<R: Read> Stream<R> {
    pub fn new(inner: R) -> Self {
        Stream {
            inner,
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            cap: 0,
            offset: 0,
            digest: Sha1::new(),
            crc: None,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Start accumulating a CRC32 over the next record's raw bytes.
    pub fn begin_record(&mut self) {
        self.crc = Some(Crc::new());
    }

    pub fn end_record(&mut self) -> u32 {
        self.crc.take().map(|crc| crc.sum()).unwrap_or_default()
    }

    /// Read the 20 byte trailer and check it against everything consumed.
    pub fn verify_trailer(&mut self) -> anyhow::Result<[u8; 20]> {
        let computed: [u8; 20] = self.digest.clone().finalize().into();

        let mut trailer = [0u8; 20];
        let mut filled = 0;
        while filled < trailer.len() {
            let available = self.fill_buf()?;
            if available.is_empty() {
                anyhow::bail!(RepoError::CorruptPack("pack is missing its checksum".into()));
            }
            let n = available.len().min(trailer.len() - filled);
            trailer[filled..filled + n].copy_from_slice(&available[..n]);
            self.pos += n;
            filled += n;
        }

        if trailer != computed {
            anyhow::bail!(RepoError::CorruptPack("pack checksum mismatch".into()));
        }

        Ok(trailer)
    }
}

impl<R: Read> Read for Stream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);

        Ok(n)
    }
}

impl<R: Read> BufRead for Stream<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.pos >= self.cap {
            self.cap = self.inner.read(&mut self.buffer)?;
            self.pos = 0;
        }

        Ok(&self.buffer[self.pos..self.cap])
    }

    fn consume(&mut self, amt: usize) {
        let end = (self.pos + amt).min(self.cap);
        let consumed = &self.buffer[self.pos..end];

        self.digest.update(consumed);
        if let Some(crc) = self.crc.as_mut() {
            crc.update(consumed);
        }
        self.offset += consumed.len() as u64;
        self.pos = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn with_trailer(body: &[u8]) -> Vec<u8> {
        let mut bytes = body.to_vec();
        bytes.extend_from_slice(&Sha1::digest(body));
        bytes
    }

    #[test]
    fn trailer_matches_consumed_bytes() {
        let mut stream = Stream::new(Cursor::new(with_trailer(b"PACK body")));
        let mut body = [0u8; 9];
        stream.read_exact(&mut body).unwrap();

        assert!(stream.verify_trailer().is_ok());
        assert_eq!(stream.offset(), 9);
    }

    #[test]
    fn tampered_body_fails_verification() {
        let mut bytes = with_trailer(b"PACK body");
        bytes[5] = b'B';
        let mut stream = Stream::new(Cursor::new(bytes));
        let mut body = [0u8; 9];
        stream.read_exact(&mut body).unwrap();

        let error = stream.verify_trailer().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::CorruptPack(_))
        ));
    }
}
