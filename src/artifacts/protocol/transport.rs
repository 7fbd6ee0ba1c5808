use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

const FILE_SCHEME: &str = "file://";

pub const UPLOAD_PACK: &str = "upload-pack";
pub const RECEIVE_PACK: &str = "receive-pack";

/// A peer repository served by a child process of this same program,
/// talking over its stdin and stdout.
pub struct Connection {
    child: Child,
}

impl Connection {
    /// Start `service` against the repository at `url`. Relative paths are
    /// taken from `base`. Finishing the returned writer closes the peer's
    /// stdin.
    pub fn open(
        service: &str,
        url: &str,
        base: &Path,
    ) -> anyhow::Result<(Self, PktLineReader<ChildStdout>, PktLineWriter<ChildStdin>)> {
        let program = std::env::current_exe().context("unable to locate own executable")?;
        let path = remote_path(url, base);
        debug!(%service, path = %path.display(), "connecting");

        let mut child = Command::new(program)
            .arg(service)
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("unable to start {} for {}", service, url))?;

        let stdin = child.stdin.take().context("child has no stdin")?;
        let stdout = child.stdout.take().context("child has no stdout")?;

        Ok((
            Self { child },
            PktLineReader::new(stdout),
            PktLineWriter::new(stdin),
        ))
    }

    /// Wait for the peer to exit; a failing peer is an error.
    pub async fn close(mut self) -> anyhow::Result<()> {
        let status = self.child.wait().await?;
        if !status.success() {
            anyhow::bail!("remote end hung up unexpectedly ({})", status);
        }

        Ok(())
    }
}

fn remote_path(url: &str, base: &Path) -> PathBuf {
    let path = Path::new(url.strip_prefix(FILE_SCHEME).unwrap_or(url));
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
