use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use std::io::Write;

impl Repository {
    /// Print the merge base of two revisions, or with `all` every best
    /// common ancestor.
    pub async fn merge_base(&mut self, left: &str, right: &str, all: bool) -> anyhow::Result<()> {
        let left = Revision::try_parse(left)?.resolve(self)?;
        let right = Revision::try_parse(right)?.resolve(self)?;
        let graph = self.database().graph();

        let bases = if all {
            graph.best_common_ancestors(&left, &right)?
        } else {
            vec![graph.merge_base(&left, &right)?]
        };

        for base in bases {
            writeln!(self.writer(), "{}", base)?;
        }

        Ok(())
    }
}
