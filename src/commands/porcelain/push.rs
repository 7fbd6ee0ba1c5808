use crate::areas::refs::HEADS_DIR;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::advertisement::Advertisement;
use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
use crate::artifacts::protocol::refspec::Refspec;
use crate::artifacts::protocol::transport::{Connection, RECEIVE_PACK};
use crate::commands::porcelain::remote::DEFAULT_REMOTE;
use crate::errors::RepoError;
use std::io::Write;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

const REPORT_STATUS: &str = "report-status";

/// Where a pushed ref is going and what the remote last told us about it.
struct PushTarget {
    source: String,
    target: String,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    force: bool,
}

impl PushTarget {
    fn display(&self, repository: &Repository) -> String {
        let target = repository.refs().short_name(&SymRefName::new(self.target.clone()));
        if self.new.is_none() {
            return target;
        }
        let source = repository.refs().short_name(&SymRefName::new(self.source.clone()));
        format!("{} -> {}", source, target)
    }
}

impl Repository {
    /// Send `refspec` (default: the current branch to the same name) to
    /// `remote` and move its remote-tracking ref on success.
    pub async fn push(
        &mut self,
        remote: Option<&str>,
        refspec: Option<&str>,
        force: bool,
    ) -> anyhow::Result<()> {
        let remote = remote.unwrap_or(DEFAULT_REMOTE);
        let (url, fetch_refspec) = self.remote_settings(remote)?;

        let refspec = match refspec {
            Some(refspec) => Refspec::parse(refspec)?,
            None => {
                let current = self.refs().current_ref(None)?;
                if current.is_detached_head() {
                    anyhow::bail!("You are not currently on a branch.");
                }
                Refspec::parse(current.as_ref_path())?
            }
        };
        if refspec.source.contains('*') {
            anyhow::bail!("wildcard refspecs are not supported by push");
        }
        let tracking = Refspec::parse(&fetch_refspec)?;

        let (connection, mut reader, writer) = Connection::open(RECEIVE_PACK, &url, self.path())?;
        let result = self
            .push_over(&url, &refspec, Some(&tracking), force, &mut reader, writer)
            .await;
        let closed = connection.close().await;

        result.and(closed)
    }

    pub(crate) async fn push_over<R, W>(
        &mut self,
        url: &str,
        refspec: &Refspec,
        tracking: Option<&Refspec>,
        force: bool,
        reader: &mut PktLineReader<R>,
        mut writer: PktLineWriter<W>,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let advertisement = Advertisement::read(reader).await?;

        let new = if refspec.source.is_empty() {
            None
        } else {
            Some(self.resolve_push_source(&refspec.source)?)
        };
        let push = PushTarget {
            source: refspec.source.clone(),
            target: refspec.target.clone(),
            old: advertisement.get(&refspec.target).cloned(),
            new,
            force: force || refspec.forced,
        };
        debug!(target = %push.target, old = ?push.old, new = ?push.new, "push update");

        if push.old == push.new {
            writer.write_flush().await?;
            writer.finish().await?;
            writeln!(self.writer(), "Everything up-to-date")?;
            return Ok(());
        }

        if let Some(reason) = self.rejection(&push)? {
            writer.write_flush().await?;
            writer.finish().await?;
            writeln!(self.writer(), "To {}", url)?;
            writeln!(
                self.writer(),
                " ! [rejected]        {} ({})",
                push.display(self),
                reason
            )?;
            anyhow::bail!(RepoError::NonFastForward(push.target));
        }

        let null = ObjectId::null();
        writer
            .write_line(&format!(
                "{} {} {}\0{}",
                push.old.as_ref().unwrap_or(&null),
                push.new.as_ref().unwrap_or(&null),
                push.target,
                REPORT_STATUS
            ))
            .await?;
        writer.write_flush().await?;

        if let Some(new) = &push.new {
            let mut haves = Vec::new();
            for (_, oid) in &advertisement.refs {
                if self.database().has(oid)? && !haves.contains(oid) {
                    haves.push(oid.clone());
                }
            }
            let objects = self
                .database()
                .graph()
                .reachable_objects(std::slice::from_ref(new), &haves)?;
            info!(objects = objects.len(), "sending pack");

            let mut pack = Vec::new();
            self.database().send_pack(&objects, &mut pack)?;
            writer.write_raw(&pack).await?;
        }
        writer.finish().await?;

        match reader.read_line().await? {
            Some(line) if line == "unpack ok" => {}
            Some(line) => anyhow::bail!(
                "remote unpack failed: {}",
                line.strip_prefix("unpack ").unwrap_or(&line)
            ),
            None => anyhow::bail!("remote hung up before reporting status"),
        }
        let report = reader.read_section().await?;
        let rejection = report.iter().find_map(|line| {
            let rest = line.strip_prefix("ng ")?;
            let (name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
            (name == push.target).then(|| reason.to_string())
        });

        writeln!(self.writer(), "To {}", url)?;
        if let Some(reason) = rejection {
            writeln!(
                self.writer(),
                " ! [remote rejected] {} ({})",
                push.display(self),
                reason
            )?;
            anyhow::bail!("failed to push some refs to '{}'", url);
        }

        self.print_push_update(&push)?;
        if let Some(tracking) = tracking.and_then(|tracking| tracking.map(&push.target)) {
            let current = self.refs().read_ref(&tracking)?;
            self.refs()
                .compare_and_swap(&tracking, current.as_ref(), push.new.as_ref())?;
        }

        Ok(())
    }

    /// A full ref name is read directly; anything else goes through the
    /// revision parser.
    fn resolve_push_source(&self, source: &str) -> anyhow::Result<ObjectId> {
        if let Some(oid) = self.refs().read_ref(source)? {
            return Ok(oid);
        }

        let revision = source
            .strip_prefix(&format!("{}/", HEADS_DIR))
            .unwrap_or(source);
        Revision::try_parse(revision)?.resolve(self)
    }

    /// Why the remote would refuse this update, checked before any bytes
    /// are sent. Forced pushes and deletions are never refused here.
    fn rejection(&self, push: &PushTarget) -> anyhow::Result<Option<&'static str>> {
        let (Some(old), Some(new)) = (&push.old, &push.new) else {
            return Ok(None);
        };
        if push.force {
            return Ok(None);
        }

        if !self.database().has(old)? {
            Ok(Some("fetch first"))
        } else if !self.database().graph().is_ancestor(old, new)? {
            Ok(Some("non-fast-forward"))
        } else {
            Ok(None)
        }
    }

    fn print_push_update(&mut self, push: &PushTarget) -> anyhow::Result<()> {
        let display = push.display(self);

        match (&push.old, &push.new) {
            (None, _) => writeln!(self.writer(), " * [new branch]      {}", display)?,
            (Some(_), None) => writeln!(self.writer(), " - [deleted]         {}", display)?,
            (Some(old), Some(new)) if self.database().graph().is_ancestor(old, new)? => {
                let range = format!("{}..{}", old.to_short_oid(), new.to_short_oid());
                writeln!(self.writer(), "   {:<17} {}", range, display)?
            }
            (Some(old), Some(new)) => {
                let range = format!("{}...{}", old.to_short_oid(), new.to_short_oid());
                writeln!(self.writer(), " + {:<17} {} (forced update)", range, display)?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::Repository;
    use crate::areas::repository::fixtures::{capturing_repository, repository};
    use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
    use crate::artifacts::protocol::refspec::Refspec;
    use crate::commands::porcelain::fetch::tests::commit_file;
    use crate::errors::RepoError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn push(
        local: &mut Repository,
        remote: &mut Repository,
        refspec: &str,
        force: bool,
    ) -> anyhow::Result<()> {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let mut reader = PktLineReader::new(client_read);
        let writer = PktLineWriter::new(client_write);
        let refspec = Refspec::parse(refspec).unwrap();
        let tracking = Refspec::parse("+refs/heads/*:refs/remotes/origin/*").unwrap();

        let (pushed, served) = tokio::join!(
            local.push_over("upstream", &refspec, Some(&tracking), force, &mut reader, writer),
            remote.receive_pack(server_read, server_write)
        );
        served.unwrap();
        pushed
    }

    #[tokio::test]
    async fn push_creates_the_remote_branch() {
        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        commit_file(&mut local, local_dir.path(), "a.txt", "one").await;
        let head = local.refs().read_head().unwrap().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        capture.take();

        push(&mut local, &mut remote, "master", false).await.unwrap();

        assert_eq!(remote.refs().read_ref("refs/heads/master").unwrap(), Some(head.clone()));
        assert!(remote.database().has(&head).unwrap());
        assert_eq!(
            local.refs().read_ref("refs/remotes/origin/master").unwrap(),
            Some(head)
        );
        assert_eq!(
            capture.take(),
            "To upstream\n * [new branch]      master -> master\n"
        );
    }

    #[tokio::test]
    async fn unchanged_push_is_up_to_date() {
        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        commit_file(&mut local, local_dir.path(), "a.txt", "one").await;
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        push(&mut local, &mut remote, "master", false).await.unwrap();
        capture.take();

        push(&mut local, &mut remote, "master", false).await.unwrap();

        assert_eq!(capture.take(), "Everything up-to-date\n");
    }

    #[tokio::test]
    async fn diverged_push_needs_force() {
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        commit_file(&mut local, local_dir.path(), "a.txt", "one").await;
        push(&mut local, &mut remote, "master", false).await.unwrap();
        let shared = local.refs().read_head().unwrap().unwrap();

        commit_file(&mut remote, remote_dir.path(), "a.txt", "theirs").await;
        commit_file(&mut local, local_dir.path(), "a.txt", "ours").await;
        let ours = local.refs().read_head().unwrap().unwrap();
        capture.take();

        let error = push(&mut local, &mut remote, "master", false).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::NonFastForward(_))
        ));
        assert_eq!(
            capture.take(),
            "To upstream\n ! [rejected]        master -> master (fetch first)\n"
        );
        assert_ne!(remote.refs().read_ref("refs/heads/master").unwrap(), Some(ours.clone()));

        push(&mut local, &mut remote, "master", true).await.unwrap();
        assert_eq!(remote.refs().read_ref("refs/heads/master").unwrap(), Some(ours));
        assert!(capture.take().contains("(forced update)"));
        assert_ne!(shared, remote.refs().read_head().unwrap().unwrap());
    }

    #[tokio::test]
    async fn fast_forward_push_prints_the_range() {
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        commit_file(&mut local, local_dir.path(), "a.txt", "one").await;
        push(&mut local, &mut remote, "master", false).await.unwrap();
        let first = local.refs().read_head().unwrap().unwrap();
        commit_file(&mut local, local_dir.path(), "a.txt", "two").await;
        let second = local.refs().read_head().unwrap().unwrap();
        capture.take();

        push(&mut local, &mut remote, "master", false).await.unwrap();

        assert_eq!(
            capture.take(),
            format!(
                "To upstream\n   {:<17} master -> master\n",
                format!("{}..{}", first.to_short_oid(), second.to_short_oid())
            )
        );
    }

    #[tokio::test]
    async fn deleting_a_remote_branch() {
        let remote_dir = TempDir::new().unwrap();
        let mut remote = repository(remote_dir.path()).await;
        let local_dir = TempDir::new().unwrap();
        let (mut local, capture) = capturing_repository(local_dir.path()).await;
        commit_file(&mut local, local_dir.path(), "a.txt", "one").await;
        push(&mut local, &mut remote, "master:topic", false).await.unwrap();
        assert!(remote.refs().read_ref("refs/heads/topic").unwrap().is_some());
        capture.take();

        push(&mut local, &mut remote, ":topic", false).await.unwrap();

        assert_eq!(remote.refs().read_ref("refs/heads/topic").unwrap(), None);
        assert_eq!(local.refs().read_ref("refs/remotes/origin/topic").unwrap(), None);
        assert_eq!(capture.take(), "To upstream\n - [deleted]         topic\n");
    }
}
