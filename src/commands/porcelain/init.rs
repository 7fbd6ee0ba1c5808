use crate::areas::refs::HEADS_DIR;
use crate::areas::repository::Repository;
use anyhow::Context;
use std::fs;
use std::io::Write;
use tracing::info;

const DEFAULT_BRANCH: &str = "master";

impl Repository {
    pub async fn init(&mut self) -> anyhow::Result<()> {
        let reinitialized = self.is_initialized();

        fs::create_dir_all(self.database().objects_path())
            .context("Failed to create .git/objects directory")?;
        fs::create_dir_all(self.database().pack_dir())
            .context("Failed to create .git/objects/pack directory")?;
        fs::create_dir_all(self.refs().heads_path())
            .context("Failed to create .git/refs/heads directory")?;

        if !reinitialized {
            self.refs()
                .set_head_symref(&format!("{}/{}", HEADS_DIR, DEFAULT_BRANCH))
                .context("Failed to create initial HEAD reference")?;
        }

        info!(path = %self.git_path().display(), reinitialized, "initialized repository");

        writeln!(
            self.writer(),
            "{} empty Graft repository in {}",
            if reinitialized { "Reinitialized" } else { "Initialized" },
            self.git_path().display()
        )?;

        Ok(())
    }
}
