//! Length-prefixed lines
//!
//! Every packet starts with its total length as four hex digits, header
//! included. `0000` is a flush packet and closes a section. Text payloads
//! end in a newline which readers strip.

use crate::errors::RepoError;
use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_SIZE: usize = 4;
const MAX_PACKET_SIZE: usize = 65520;
const FLUSH: &[u8] = b"0000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(Vec<u8>),
    Flush,
}

pub struct PktLineReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> PktLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// The next packet, or `None` if the peer closed the stream cleanly
    /// between packets.
    pub async fn read_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        let mut header = [0u8; HEADER_SIZE];
        match self.inner.read_exact(&mut header).await {
            Ok(_) => {}
            Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(error.into()),
        }

        let header = std::str::from_utf8(&header)
            .ok()
            .and_then(|hex| usize::from_str_radix(hex, 16).ok())
            .ok_or_else(|| RepoError::CorruptPack(format!("bad packet header {:?}", header)))?;

        match header {
            0 => Ok(Some(Packet::Flush)),
            size if size < HEADER_SIZE || size > MAX_PACKET_SIZE => {
                Err(RepoError::CorruptPack(format!("bad packet length {}", size)).into())
            }
            size => {
                let mut payload = vec![0u8; size - HEADER_SIZE];
                self.inner
                    .read_exact(&mut payload)
                    .await
                    .context("connection closed inside a packet")?;
                Ok(Some(Packet::Data(payload)))
            }
        }
    }

    /// A text line without its newline; `None` at a flush packet or the end
    /// of the stream.
    pub async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        match self.read_packet().await? {
            Some(Packet::Data(payload)) => {
                let mut line = String::from_utf8(payload).context("packet is not valid UTF-8")?;
                if line.ends_with('\n') {
                    line.pop();
                }
                Ok(Some(line))
            }
            Some(Packet::Flush) | None => Ok(None),
        }
    }

    /// Every line up to the next flush packet.
    pub async fn read_section(&mut self) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line().await? {
            lines.push(line);
        }

        Ok(lines)
    }

    /// Whatever follows the last packet, typically a pack.
    pub async fn read_rest(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut rest = Vec::new();
        self.inner.read_to_end(&mut rest).await?;
        Ok(rest)
    }
}

pub struct PktLineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> PktLineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_packet(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let size = payload.len() + HEADER_SIZE;
        if size > MAX_PACKET_SIZE {
            anyhow::bail!("packet of {} bytes is too long", size);
        }

        self.inner.write_all(format!("{:04x}", size).as_bytes()).await?;
        self.inner.write_all(payload).await?;
        Ok(())
    }

    pub async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.write_packet(format!("{}\n", line).as_bytes()).await
    }

    pub async fn write_flush(&mut self) -> anyhow::Result<()> {
        self.inner.write_all(FLUSH).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Raw bytes outside the packet framing, such as a pack.
    pub async fn write_raw(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// End our side of the conversation. The inner stream is dropped, so a
    /// pipe is closed even where `shutdown` alone would leave it open.
    pub async fn finish(mut self) -> anyhow::Result<()> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn lines_are_length_prefixed() {
        let mut buffer = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buffer);
            writer.write_line("want abc").await.unwrap();
            writer.write_flush().await.unwrap();
        }

        assert_eq!(buffer, b"000dwant abc\n0000");
    }

    #[tokio::test]
    async fn sections_end_at_flush() {
        let input = b"0009done\n0007ok\n00000009next\n".to_vec();
        let mut reader = PktLineReader::new(input.as_slice());

        assert_eq!(reader.read_section().await.unwrap(), vec!["done", "ok"]);
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("next"));
        assert_eq!(reader.read_packet().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_lengths_are_rejected() {
        let mut reader = PktLineReader::new(b"0002".as_slice());

        let error = reader.read_packet().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::CorruptPack(_))
        ));
    }
}
