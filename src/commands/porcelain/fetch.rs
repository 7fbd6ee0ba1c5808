use crate::areas::refs::HEAD;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::advertisement::Advertisement;
use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
use crate::artifacts::protocol::refspec::Refspec;
use crate::artifacts::protocol::transport::{Connection, UPLOAD_PACK};
use crate::commands::porcelain::remote::DEFAULT_REMOTE;
use crate::errors::RepoError;
use std::io::Write;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

impl Repository {
    /// Download what the remote has and we lack, then move the refs the
    /// given refspecs (or the remote's configured fetch refspec) map to.
    ///
    /// Non-fast-forward updates are refused unless the refspec carries a
    /// `+` or `force` is set.
    pub async fn fetch(
        &mut self,
        remote: Option<&str>,
        refspecs: &[String],
        force: bool,
    ) -> anyhow::Result<()> {
        let remote = remote.unwrap_or(DEFAULT_REMOTE);
        let (url, configured) = self.remote_settings(remote)?;
        let refspecs = if refspecs.is_empty() {
            vec![Refspec::parse(&configured)?]
        } else {
            refspecs
                .iter()
                .map(|spec| Refspec::parse(spec))
                .collect::<anyhow::Result<Vec<_>>>()?
        };

        let (connection, mut reader, writer) = Connection::open(UPLOAD_PACK, &url, self.path())?;
        let result = self
            .fetch_over(&url, &refspecs, force, &mut reader, writer)
            .await;
        let closed = connection.close().await;

        result.and(closed)
    }

    pub(crate) fn remote_settings(&self, remote: &str) -> anyhow::Result<(String, String)> {
        let config = self.config();
        let section = config.remote(remote).ok_or_else(|| {
            RepoError::NotFound(format!("'{}' does not appear to be a git repository", remote))
        })?;

        Ok((section.url.clone(), section.fetch.clone()))
    }

    pub(crate) async fn fetch_over<R, W>(
        &mut self,
        url: &str,
        refspecs: &[Refspec],
        force: bool,
        reader: &mut PktLineReader<R>,
        mut writer: PktLineWriter<W>,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let advertisement = Advertisement::read(reader).await?;
        let mut targets = Vec::<(String, String, ObjectId, bool)>::new();
        for refspec in refspecs {
            for (name, oid) in &advertisement.refs {
                let Some(target) = refspec.map(name) else {
                    continue;
                };
                if targets.iter().all(|(_, existing, _, _)| *existing != target) {
                    targets.push((name.clone(), target, oid.clone(), refspec.forced || force));
                }
            }
        }

        let mut wants = Vec::new();
        for (_, _, oid, _) in &targets {
            if !self.database().has(oid)? && !wants.contains(oid) {
                wants.push(oid.clone());
            }
        }

        if wants.is_empty() {
            writer.write_flush().await?;
            writer.finish().await?;
        } else {
            for want in &wants {
                writer.write_line(&format!("want {}", want)).await?;
            }
            writer.write_flush().await?;
            for have in self.local_tips()? {
                writer.write_line(&format!("have {}", have)).await?;
            }
            writer.write_line("done").await?;
            writer.finish().await?;

            match reader.read_line().await? {
                Some(line) if line == "NAK" || line.starts_with("ACK") => {}
                other => anyhow::bail!("unexpected negotiation reply {:?}", other),
            }

            let pack = reader.read_rest().await?;
            let unpack_limit = self.config().unpack_limit();
            let received = self.database().receive_pack(pack.as_slice(), unpack_limit)?;
            info!(objects = received.len(), "fetched pack");
        }

        let mut printed_header = false;
        for (source, target, oid, forced) in targets {
            let old = self.refs().read_ref(&target)?;
            if old.as_ref() == Some(&oid) {
                continue;
            }

            let (flag, summary, note) = match &old {
                None => ('*', "[new branch]".to_string(), ""),
                Some(old) if self.database().graph().is_ancestor(old, &oid)? => (
                    ' ',
                    format!("{}..{}", old.to_short_oid(), oid.to_short_oid()),
                    "",
                ),
                Some(old) if forced => (
                    '+',
                    format!("{}...{}", old.to_short_oid(), oid.to_short_oid()),
                    " (forced update)",
                ),
                Some(_) => ('!', "[rejected]".to_string(), " (non-fast-forward)"),
            };

            if flag != '!' {
                self.refs().compare_and_swap(&target, old.as_ref(), Some(&oid))?;
            }

            if !printed_header {
                writeln!(self.writer(), "From {}", url)?;
                printed_header = true;
            }
            writeln!(
                self.writer(),
                " {} {:<17} {} -> {}{}",
                flag,
                summary,
                self.refs().short_name(&SymRefName::new(source)),
                self.refs().short_name(&SymRefName::new(target)),
                note
            )?;
        }

        Ok(())
    }

    /// Every commit a ref or HEAD points at, for `have` lines.
    pub(crate) fn local_tips(&self) -> anyhow::Result<Vec<ObjectId>> {
        let mut tips = self
            .refs()
            .read_ref(HEAD)?
            .into_iter()
            .chain(self.refs().all_ref_values()?.into_iter().map(|(_, oid)| oid))
            .collect::<Vec<_>>();
        tips.sort();
        tips.dedup();

        Ok(tips)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::areas::repository::Repository;
    use crate::areas::repository::fixtures::{capturing_repository, repository, write};
    use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
    use crate::artifacts::protocol::refspec::Refspec;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) async fn commit_file(repository: &mut Repository, root: &Path, path: &str, content: &str) {
        write(root, path, content);
        repository.add(&[path.into()]).await.unwrap();
        repository.commit(Some(content)).await.unwrap();
    }

    async fn fetch(local: &mut Repository, remote: &mut Repository) {
        fetch_with(local, remote, &["+refs/heads/*:refs/remotes/origin/*"], false).await;
    }

    async fn fetch_with(local: &mut Repository, remote: &mut Repository, refspecs: &[&str], force: bool) {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let mut reader = PktLineReader::new(client_read);
        let writer = PktLineWriter::new(client_write);
        let refspecs = refspecs
            .iter()
            .map(|spec| Refspec::parse(spec).unwrap())
            .collect::<Vec<_>>();

        let (fetched, served) = tokio::join!(
            local.fetch_over("upstream", &refspecs, force, &mut reader, writer),
            remote.upload_pack(server_read, server_write)
        );
        fetched.unwrap();
        served.unwrap();
    }

    #[tokio::test]
    async fn fetch_creates_and_advances_tracking_refs() {
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        commit_file(&mut remote, remote_dir.path(), "a.txt", "one").await;

        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;

        fetch(&mut local, &mut remote).await;
        let first = remote.refs().read_head().unwrap().unwrap();
        assert_eq!(
            local.refs().read_ref("refs/remotes/origin/master").unwrap(),
            Some(first.clone())
        );
        assert!(local.database().has(&first).unwrap());
        let output = capture.take();
        assert!(output.starts_with("From upstream\n"));
        assert!(output.contains("* [new branch]"));
        assert!(output.contains("master -> origin/master"));

        commit_file(&mut remote, remote_dir.path(), "a.txt", "two").await;
        let second = remote.refs().read_head().unwrap().unwrap();
        fetch(&mut local, &mut remote).await;

        assert_eq!(
            local.refs().read_ref("refs/remotes/origin/master").unwrap(),
            Some(second.clone())
        );
        assert!(capture.take().contains(&format!(
            "{}..{}",
            first.to_short_oid(),
            second.to_short_oid()
        )));
    }

    #[tokio::test]
    async fn fetching_again_is_quiet() {
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        commit_file(&mut remote, remote_dir.path(), "a.txt", "one").await;
        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        fetch(&mut local, &mut remote).await;
        capture.take();

        fetch(&mut local, &mut remote).await;

        assert_eq!(capture.take(), "");
    }

    #[tokio::test]
    async fn explicit_refspecs_need_force_to_rewind() {
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        commit_file(&mut remote, remote_dir.path(), "a.txt", "one").await;
        let first = remote.refs().read_head().unwrap().unwrap();
        commit_file(&mut remote, remote_dir.path(), "a.txt", "two").await;
        let second = remote.refs().read_head().unwrap().unwrap();
        remote.refs().compare_and_swap("refs/heads/old", None, Some(&first)).unwrap();

        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        let mirror = "refs/remotes/origin/mirror";

        fetch_with(&mut local, &mut remote, &["master:refs/remotes/origin/mirror"], false).await;
        assert_eq!(local.refs().read_ref(mirror).unwrap(), Some(second.clone()));
        assert_eq!(local.refs().read_ref("refs/remotes/origin/master").unwrap(), None);
        capture.take();

        fetch_with(&mut local, &mut remote, &["old:refs/remotes/origin/mirror"], false).await;
        assert_eq!(local.refs().read_ref(mirror).unwrap(), Some(second.clone()));
        assert!(capture.take().contains("! [rejected]"));

        fetch_with(&mut local, &mut remote, &["old:refs/remotes/origin/mirror"], true).await;
        assert_eq!(local.refs().read_ref(mirror).unwrap(), Some(first));
        assert!(capture.take().contains("(forced update)"));
    }
}
