use crate::areas::refs::HEAD;
use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::pkt_line::{PktLineReader, PktLineWriter};
use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};

/// Stands in for the ref name when a repository has no refs to advertise.
const NO_REFS: &str = "capabilities^{}";

/// The refs a server offers, in the order they were sent, and the
/// capabilities attached to the first of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub refs: Vec<(String, ObjectId)>,
    pub capabilities: Vec<String>,
}

impl Advertisement {
    /// HEAD followed by every ref under `refs/`.
    pub fn from_repository(repository: &Repository, capabilities: &[&str]) -> anyhow::Result<Self> {
        let mut refs = Vec::new();
        if let Some(head) = repository.refs().read_head()? {
            refs.push((HEAD.to_string(), head));
        }
        for (name, oid) in repository.refs().all_ref_values()? {
            refs.push((name.as_ref_path().to_string(), oid));
        }

        Ok(Self {
            refs,
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ObjectId> {
        self.refs
            .iter()
            .find(|(ref_name, _)| ref_name == name)
            .map(|(_, oid)| oid)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut PktLineWriter<W>) -> anyhow::Result<()> {
        let capabilities = self.capabilities.join(" ");

        if self.refs.is_empty() {
            writer
                .write_line(&format!("{} {}\0{}", ObjectId::null(), NO_REFS, capabilities))
                .await?;
        }
        for (i, (name, oid)) in self.refs.iter().enumerate() {
            let line = if i == 0 {
                format!("{} {}\0{}", oid, name, capabilities)
            } else {
                format!("{} {}", oid, name)
            };
            writer.write_line(&line).await?;
        }

        writer.write_flush().await
    }

    pub async fn read<R: AsyncRead + Unpin>(reader: &mut PktLineReader<R>) -> anyhow::Result<Self> {
        let mut advertisement = Self::default();

        for line in reader.read_section().await? {
            let line = match line.split_once('\0') {
                Some((line, capabilities)) => {
                    advertisement.capabilities =
                        capabilities.split_whitespace().map(String::from).collect();
                    line
                }
                None => line.as_str(),
            };

            let (oid, name) = line
                .split_once(' ')
                .with_context(|| format!("malformed ref advertisement: {}", line))?;
            if name == NO_REFS {
                continue;
            }
            advertisement
                .refs
                .push((name.to_string(), ObjectId::try_parse(oid)?));
        }

        Ok(advertisement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn oid(digit: char) -> ObjectId {
        ObjectId::try_parse(digit.to_string().repeat(40)).unwrap()
    }

    #[tokio::test]
    async fn capabilities_ride_on_the_first_ref() {
        let advertisement = Advertisement {
            refs: vec![
                ("HEAD".to_string(), oid('a')),
                ("refs/heads/master".to_string(), oid('a')),
            ],
            capabilities: vec!["report-status".to_string(), "delete-refs".to_string()],
        };

        let mut buffer = Vec::new();
        advertisement
            .write(&mut PktLineWriter::new(&mut buffer))
            .await
            .unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.contains(&format!("{} HEAD\0report-status delete-refs\n", oid('a'))));

        let read = Advertisement::read(&mut PktLineReader::new(buffer.as_slice()))
            .await
            .unwrap();
        assert_eq!(read, advertisement);
        assert!(read.has_capability("delete-refs"));
    }

    #[tokio::test]
    async fn empty_repositories_still_send_capabilities() {
        let advertisement = Advertisement {
            refs: vec![],
            capabilities: vec!["report-status".to_string()],
        };

        let mut buffer = Vec::new();
        advertisement
            .write(&mut PktLineWriter::new(&mut buffer))
            .await
            .unwrap();
        let read = Advertisement::read(&mut PktLineReader::new(buffer.as_slice()))
            .await
            .unwrap();

        assert!(read.refs.is_empty());
        assert!(read.has_capability("report-status"));
    }
}
