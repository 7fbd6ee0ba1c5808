use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use std::io::Write;
use std::path::Path;

impl Repository {
    /// List the tree named by `revision` (a commit lists its root tree).
    /// With `recursive`, subtrees are expanded and only blobs are shown.
    pub async fn ls_tree(&mut self, revision: &str, recursive: bool) -> anyhow::Result<()> {
        let oid = Revision::try_parse(revision)?.resolve_object(self)?;

        let tree_oid = match self.database().parse_object(&oid)? {
            ObjectBox::Commit(commit) => commit.tree_oid().clone(),
            ObjectBox::Tree(_) => oid,
            _ => anyhow::bail!("not a tree object: {}", revision),
        };

        self.list_tree(&tree_oid, Path::new(""), recursive)
    }

    fn list_tree(&self, oid: &ObjectId, prefix: &Path, recursive: bool) -> anyhow::Result<()> {
        let tree = self
            .database()
            .parse_object_as_tree(oid)?
            .with_context(|| format!("not a tree object: {}", oid))?;

        for (name, entry) in tree.entries() {
            let path = prefix.join(name);

            if entry.is_tree() && recursive {
                self.list_tree(&entry.oid, &path, recursive)?;
                continue;
            }

            let object_type = if entry.is_tree() {
                ObjectType::Tree
            } else {
                ObjectType::Blob
            };
            writeln!(
                self.writer(),
                "{} {} {}\t{}",
                entry.mode,
                object_type,
                entry.oid,
                path.display()
            )?;
        }

        Ok(())
    }
}
