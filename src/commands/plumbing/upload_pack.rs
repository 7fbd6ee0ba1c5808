use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::advertisement::Advertisement;
use crate::artifacts::protocol::pkt_line::{Packet, PktLineReader, PktLineWriter};
use crate::errors::RepoError;
use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

impl Repository {
    /// Serve a fetch: advertise refs, collect `want`s and `have`s, then send
    /// a pack of everything the client is missing.
    pub async fn upload_pack<R, W>(&mut self, input: R, output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = PktLineReader::new(input);
        let mut writer = PktLineWriter::new(output);

        let advertisement = Advertisement::from_repository(self, &[])?;
        advertisement.write(&mut writer).await?;

        let mut wants = Vec::new();
        for line in reader.read_section().await? {
            let oid = parse_argument(&line, "want")?;
            if !self.is_offered(&advertisement, &oid)? {
                writer
                    .write_line(&format!("ERR upload-pack: not our ref {}", oid))
                    .await?;
                writer.finish().await?;
                anyhow::bail!(RepoError::NotFound(format!("not our ref {}", oid)));
            }
            wants.push(oid);
        }
        if wants.is_empty() {
            debug!("client wants nothing");
            return Ok(());
        }

        let mut haves = Vec::new();
        loop {
            match reader.read_packet().await? {
                Some(Packet::Flush) => continue,
                Some(Packet::Data(payload)) => {
                    let line = String::from_utf8(payload).context("packet is not valid UTF-8")?;
                    let line = line.trim_end();
                    if line == "done" {
                        break;
                    }
                    haves.push(parse_argument(line, "have")?);
                }
                None => anyhow::bail!("client hung up during negotiation"),
            }
        }

        writer.write_line("NAK").await?;

        let objects = self.database().graph().reachable_objects(&wants, &haves)?;
        info!(
            wants = wants.len(),
            haves = haves.len(),
            objects = objects.len(),
            "sending pack"
        );
        let mut pack = Vec::new();
        self.database().send_pack(&objects, &mut pack)?;
        writer.write_raw(&pack).await?;

        writer.finish().await
    }
}

impl Repository {
    /// Whether a client may ask for `oid`: an advertised tip, or a commit
    /// reachable from an advertised commit.
    fn is_offered(&self, advertisement: &Advertisement, oid: &ObjectId) -> anyhow::Result<bool> {
        if advertisement.refs.iter().any(|(_, tip)| tip == oid) {
            return Ok(true);
        }

        let database = self.database();
        if !database.has(oid)? || database.parse_object_as_commit(oid)?.is_none() {
            return Ok(false);
        }

        let graph = database.graph();
        for (_, tip) in &advertisement.refs {
            if database.parse_object_as_commit(tip)?.is_some() && graph.is_ancestor(oid, tip)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// The object id in `<keyword> <oid>[ <capabilities>]`.
pub(crate) fn parse_argument(line: &str, keyword: &str) -> anyhow::Result<ObjectId> {
    let oid = line
        .strip_prefix(keyword)
        .and_then(|rest| rest.split_whitespace().next())
        .with_context(|| format!("expected '{} <oid>', got '{}'", keyword, line))?;

    ObjectId::try_parse(oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::repository::fixtures::repository;
    use crate::artifacts::objects::blob::Blob;
    use crate::commands::porcelain::fetch::tests::commit_file;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Ask for `want` and return the server's first reply line and result.
    async fn request(repository: &mut Repository, want: &ObjectId) -> (Option<String>, anyhow::Result<()>) {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let client = async {
            let mut reader = PktLineReader::new(client_read);
            let mut writer = PktLineWriter::new(client_write);
            reader.read_section().await.unwrap();
            writer.write_line(&format!("want {}", want)).await.unwrap();
            writer.write_flush().await.unwrap();
            writer.write_line("done").await.unwrap();
            writer.finish().await.unwrap();
            let reply = reader.read_line().await.unwrap();
            reader.read_rest().await.unwrap();
            reply
        };
        tokio::join!(client, repository.upload_pack(server_read, server_write))
    }

    #[tokio::test]
    async fn unadvertised_objects_are_refused() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "one").await;
        let secret = repository.database().store(&Blob::from("secret")).unwrap();

        let (reply, served) = request(&mut repository, &secret).await;

        assert_eq!(reply, Some(format!("ERR upload-pack: not our ref {}", secret)));
        assert!(matches!(
            served.unwrap_err().downcast_ref::<RepoError>(),
            Some(RepoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ancestors_of_advertised_tips_may_be_wanted() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "one").await;
        let first = repository.refs().read_head().unwrap().unwrap();
        commit_file(&mut repository, dir.path(), "a.txt", "two").await;

        let (reply, served) = request(&mut repository, &first).await;

        assert_eq!(reply.as_deref(), Some("NAK"));
        served.unwrap();
    }
}
