use crate::areas::config::Config;
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::merge::pending_commit::PendingCommit;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::status::status_info::Status;
use anyhow::Context;
use std::cell::{Ref, RefCell, RefMut};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub const GIT_DIR: &str = ".git";
pub const CONFIG_FILE: &str = "config.toml";

pub struct Repository {
    path: Box<Path>,
    git_path: Box<Path>,
    writer: RefCell<Box<dyn std::io::Write>>,
    config: RefCell<Config>,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    /// Open the repository rooted at `path`; the directory is created if needed.
    /// Command output goes to `writer`.
    pub fn new(path: &Path, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("Unable to create directory {}", path.display()))?;
        }
        let path = path.canonicalize()?;
        let git_path = path.join(GIT_DIR);

        let config = Config::open(git_path.join(CONFIG_FILE).into_boxed_path())?;
        let index = Index::new(git_path.join("index").into_boxed_path());
        let database = Database::new(git_path.join("objects").into_boxed_path());
        let workspace = Workspace::new(path.clone().into_boxed_path());
        let refs = Refs::new(git_path.clone().into_boxed_path());

        debug!(path = %path.display(), "opened repository");

        Ok(Repository {
            path: path.into_boxed_path(),
            git_path: git_path.into_boxed_path(),
            writer: RefCell::new(writer),
            config: RefCell::new(config),
            index: Arc::new(Mutex::new(index)),
            database,
            workspace,
            refs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn is_initialized(&self) -> bool {
        self.git_path.join("HEAD").is_file()
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn config(&self) -> Ref<'_, Config> {
        self.config.borrow()
    }

    pub fn config_mut(&self) -> RefMut<'_, Config> {
        self.config.borrow_mut()
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn status(&'_ self) -> Status<'_> {
        Status::new(self)
    }

    pub fn pending_commit(&self) -> PendingCommit {
        PendingCommit::new(self.git_path.clone())
    }

    /// `path` as given on the command line, relative to the workspace root.
    pub fn relative_path(&self, path: &str) -> anyhow::Result<PathBuf> {
        let path = Path::new(path);
        let path = if path.is_absolute() {
            path.strip_prefix(&self.path)
                .with_context(|| format!("'{}' is outside repository", path.display()))?
        } else {
            path
        };

        Ok(path
            .components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect())
    }

    /// Author identity from the environment, falling back to `user.name` and
    /// `user.email` stamped with the current time.
    pub fn current_author(&self) -> anyhow::Result<Author> {
        if let Some(author) = Author::from_env() {
            return Ok(author);
        }

        let config = self.config();
        match (config.user_name(), config.user_email()) {
            (Some(name), Some(email)) => Ok(Author::new(name.to_string(), email.to_string())),
            _ => anyhow::bail!(
                "Author identity unknown\n\n\
                 Run\n\n  graft config user.name \"Your Name\"\n  graft config user.email \"you@example.com\"\n\n\
                 to set your identity."
            ),
        }
    }

    /// Store the trees for the current stage-0 index entries; returns the root id.
    pub fn write_tree(&self, index: &Index) -> anyhow::Result<ObjectId> {
        let tree = Tree::build(index.entries())?;
        let tree_id = tree.object_id()?;

        tree.traverse(&mut |tree: &Tree| self.database.store(tree).map(|_| ()))?;

        Ok(tree_id)
    }

    /// Store a commit of `tree_id` and move HEAD to it.
    pub fn write_commit(
        &self,
        parents: Vec<ObjectId>,
        tree_id: ObjectId,
        author: Author,
        message: String,
    ) -> anyhow::Result<(ObjectId, Commit)> {
        let committer = self.current_author()?;
        let commit = Commit::new(parents, tree_id, author, message).with_committer(committer);
        let commit_id = self.database.store(&commit)?;
        self.refs.update_head(&commit_id)?;

        debug!(oid = %commit_id, "wrote commit");

        Ok((commit_id, commit))
    }

    /// `[branch abc1234] title`, as printed after every new commit.
    pub fn print_commit(&self, commit_id: &ObjectId, commit: &Commit) -> anyhow::Result<()> {
        let current_ref = self.refs.current_ref(None)?;
        let info = if current_ref.is_detached_head() {
            "detached HEAD".to_string()
        } else {
            self.refs.short_name(&current_ref)
        };
        let root = if commit.parents().is_empty() {
            " (root-commit)"
        } else {
            ""
        };

        writeln!(
            self.writer(),
            "[{}{} {}] {}",
            info,
            root,
            commit_id.to_short_oid(),
            commit.short_message()
        )?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// An initialised repository with a configured author, writing output
    /// into the void.
    pub(crate) async fn repository(path: &Path) -> Repository {
        let mut repository = Repository::new(path, Box::new(std::io::sink())).unwrap();
        repository.init().await.unwrap();
        {
            let mut config = repository.config_mut();
            config.set("user.name", "A U Thor").unwrap();
            config.set("user.email", "author@example.com").unwrap();
        }
        repository
    }

    /// Output sink whose contents can be read back.
    #[derive(Clone, Default)]
    pub(crate) struct Capture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        /// Everything written since the last call, uncoloured.
        pub(crate) fn take(&self) -> String {
            String::from_utf8(std::mem::take(&mut *self.0.lock().unwrap())).unwrap()
        }
    }

    /// Like [`repository`], with output going to a [`Capture`].
    pub(crate) async fn capturing_repository(path: &Path) -> (Repository, Capture) {
        colored::control::set_override(false);
        let capture = Capture::default();
        let mut repository = Repository::new(path, Box::new(capture.clone())).unwrap();
        repository.init().await.unwrap();
        {
            let mut config = repository.config_mut();
            config.set("user.name", "A U Thor").unwrap();
            config.set("user.email", "author@example.com").unwrap();
        }
        capture.take();
        (repository, capture)
    }

    pub(crate) fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{repository, write};
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn commits_chain_onto_head() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;

        write(dir.path(), "a.txt", "one");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("first")).await.unwrap();
        let first = repository.refs().read_head().unwrap().unwrap();

        write(dir.path(), "a.txt", "two");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("second")).await.unwrap();
        let second = repository.refs().read_head().unwrap().unwrap();

        let commit = repository.database().load_commit(&second).unwrap();
        assert_eq!(commit.parents(), &[first]);
    }

    #[tokio::test]
    async fn staging_order_does_not_change_the_tree() {
        let left_dir = TempDir::new().unwrap();
        let right_dir = TempDir::new().unwrap();
        let mut left = repository(left_dir.path()).await;
        let mut right = repository(right_dir.path()).await;

        for root in [left_dir.path(), right_dir.path()] {
            write(root, "b.txt", "bee");
            write(root, "a/c.txt", "sea");
        }
        left.add(&["a".into(), "b.txt".into()]).await.unwrap();
        right.add(&["b.txt".into()]).await.unwrap();
        right.add(&["a/c.txt".into()]).await.unwrap();

        let left_tree = {
            let index = left.index();
            let index = index.lock().await;
            left.write_tree(&index).unwrap()
        };
        let right_tree = {
            let index = right.index();
            let index = index.lock().await;
            right.write_tree(&index).unwrap()
        };

        assert_eq!(left_tree, right_tree);
    }
}
