use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::check_ref_format;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::RECEIVE_CAPABILITIES;
use crate::artifacts::protocol::advertisement::Advertisement;
use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
use crate::errors::RepoError;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

/// One `<old> <new> <ref>` line; a null id on either side means the ref
/// is created or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RefUpdate {
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    name: String,
}

impl RefUpdate {
    fn parse(line: &str) -> anyhow::Result<Self> {
        let line = line.split_once('\0').map_or(line, |(command, _)| command);
        let mut parts = line.split(' ');
        let (Some(old), Some(new), Some(name), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            anyhow::bail!("malformed ref update '{}'", line);
        };

        let non_null = |oid: ObjectId| (!oid.is_null()).then_some(oid);
        Ok(Self {
            old: non_null(ObjectId::try_parse(old)?),
            new: non_null(ObjectId::try_parse(new)?),
            name: name.to_string(),
        })
    }
}

impl Repository {
    /// Serve a push: advertise refs, read the requested updates and the
    /// pack, then apply each update and report on it.
    pub async fn receive_pack<R, W>(&mut self, input: R, output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = PktLineReader::new(input);
        let mut writer = PktLineWriter::new(output);

        Advertisement::from_repository(self, RECEIVE_CAPABILITIES)?
            .write(&mut writer)
            .await?;

        let updates = reader
            .read_section()
            .await?
            .iter()
            .map(|line| RefUpdate::parse(line))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if updates.is_empty() {
            return Ok(());
        }

        let unpacked = if updates.iter().any(|update| update.new.is_some()) {
            let pack = reader.read_rest().await?;
            let unpack_limit = self.config().unpack_limit();
            self.database()
                .receive_pack(pack.as_slice(), unpack_limit)
                .map(|oids| info!(objects = oids.len(), "received pack"))
        } else {
            Ok(())
        };

        match &unpacked {
            Ok(()) => writer.write_line("unpack ok").await?,
            Err(error) => {
                warn!(%error, "unpack failed");
                writer.write_line(&format!("unpack {}", error)).await?
            }
        }

        for update in &updates {
            let result = match &unpacked {
                Ok(()) => self.apply_ref_update(update),
                Err(_) => Err("unpacker error".to_string()),
            };
            match result {
                Ok(()) => writer.write_line(&format!("ok {}", update.name)).await?,
                Err(reason) => {
                    warn!(name = %update.name, %reason, "rejected ref update");
                    writer
                        .write_line(&format!("ng {} {}", update.name, reason))
                        .await?
                }
            }
        }

        writer.write_flush().await?;
        writer.finish().await
    }

    fn apply_ref_update(&self, update: &RefUpdate) -> Result<(), String> {
        if check_ref_format(&update.name).is_err() {
            return Err("funny refname".to_string());
        }

        if update.new.is_none() && self.config().deny_deletes() {
            return Err("deletion prohibited".to_string());
        }

        if let Some(new) = &update.new {
            match self.database().has(new) {
                Ok(true) => {}
                Ok(false) => return Err("missing necessary objects".to_string()),
                Err(error) => return Err(error.to_string()),
            }
        }

        if let (Some(old), Some(new)) = (&update.old, &update.new)
            && self.config().deny_non_fast_forwards()
        {
            let fast_forward = self
                .database()
                .graph()
                .is_ancestor(old, new)
                .map_err(|error| error.to_string())?;
            if !fast_forward {
                return Err("non-fast-forward".to_string());
            }
        }

        if self.config().deny_current_branch() {
            let current = self.refs().current_ref(None).map_err(|error| error.to_string())?;
            if current.as_ref_path() == update.name {
                return Err("branch is currently checked out".to_string());
            }
        }

        self.refs()
            .compare_and_swap(&update.name, update.old.as_ref(), update.new.as_ref())
            .map_err(|error| match RepoError::from_anyhow(&error) {
                Some(RepoError::Locked(_)) => "failed to lock".to_string(),
                Some(RepoError::InvalidRefName(_)) => "funny refname".to_string(),
                _ => "fetch first".to_string(),
            })?;

        info!(name = %update.name, old = ?update.old, new = ?update.new, "updated ref");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::repository::fixtures::repository;
    use crate::commands::porcelain::fetch::tests::commit_file;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn update(old: Option<&ObjectId>, new: Option<&ObjectId>, name: &str) -> RefUpdate {
        RefUpdate {
            old: old.cloned(),
            new: new.cloned(),
            name: name.to_string(),
        }
    }

    /// Send `commands` without a pack and return the report lines.
    async fn report_for(repository: &mut Repository, commands: &[String]) -> Vec<String> {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let client = async {
            let mut reader = PktLineReader::new(client_read);
            let mut writer = PktLineWriter::new(client_write);
            reader.read_section().await.unwrap();
            for command in commands {
                writer.write_line(command).await.unwrap();
            }
            writer.write_flush().await.unwrap();
            writer.finish().await.unwrap();
            reader.read_section().await.unwrap()
        };
        let (report, served) = tokio::join!(client, repository.receive_pack(server_read, server_write));
        served.unwrap();
        report
    }

    #[tokio::test]
    async fn ref_names_leaving_refs_are_refused() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "one").await;
        let head = repository.refs().read_head().unwrap().unwrap();
        let null = ObjectId::null();

        let report = report_for(
            &mut repository,
            &[format!("{} {} refs/../../escaped\0report-status", head, null)],
        )
        .await;

        assert_eq!(report, vec!["unpack ok", "ng refs/../../escaped funny refname"]);
        assert!(!dir.path().parent().unwrap().join("escaped").exists());
        assert!(!dir.path().parent().unwrap().join("escaped.lock").exists());

        let result = repository.apply_ref_update(&update(None, Some(&head), "refs/heads/../../../config"));
        assert_eq!(result, Err("funny refname".to_string()));
    }

    #[tokio::test]
    async fn deletes_can_be_prohibited() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "one").await;
        let head = repository.refs().read_head().unwrap().unwrap();
        repository.refs().compare_and_swap("refs/heads/topic", None, Some(&head)).unwrap();
        repository.config_mut().set("receive.deny_deletes", "true").unwrap();

        let result = repository.apply_ref_update(&update(Some(&head), None, "refs/heads/topic"));

        assert_eq!(result, Err("deletion prohibited".to_string()));
        assert_eq!(repository.refs().read_ref("refs/heads/topic").unwrap(), Some(head));
    }

    #[tokio::test]
    async fn checked_out_branch_can_be_protected() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "one").await;
        let first = repository.refs().read_head().unwrap().unwrap();
        commit_file(&mut repository, dir.path(), "a.txt", "two").await;
        let second = repository.refs().read_head().unwrap().unwrap();
        repository.refs().compare_and_swap("refs/heads/topic", None, Some(&first)).unwrap();
        repository.config_mut().set("receive.deny_current_branch", "true").unwrap();
        let current = repository.refs().current_ref(None).unwrap();

        let refused = repository.apply_ref_update(&update(
            Some(&second),
            Some(&first),
            current.as_ref_path(),
        ));
        let allowed = repository.apply_ref_update(&update(Some(&first), Some(&second), "refs/heads/topic"));

        assert_eq!(refused, Err("branch is currently checked out".to_string()));
        assert_eq!(repository.refs().read_head().unwrap(), Some(second.clone()));
        assert_eq!(allowed, Ok(()));
        assert_eq!(repository.refs().read_ref("refs/heads/topic").unwrap(), Some(second));
    }

    #[test]
    fn null_ids_mean_create_or_delete() {
        let oid = "a".repeat(40);
        let null = "0".repeat(40);

        let create = RefUpdate::parse(&format!("{} {} refs/heads/topic\0report-status", null, oid)).unwrap();
        assert_eq!(create.old, None);
        assert_eq!(create.new, Some(ObjectId::try_parse(oid.clone()).unwrap()));
        assert_eq!(create.name, "refs/heads/topic");

        let delete = RefUpdate::parse(&format!("{} {} refs/heads/topic", oid, null)).unwrap();
        assert_eq!(delete.new, None);
    }

    #[test]
    fn malformed_updates_are_rejected() {
        assert!(RefUpdate::parse("abc refs/heads/topic").is_err());
    }
}
