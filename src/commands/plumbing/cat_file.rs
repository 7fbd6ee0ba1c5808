use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::object::ObjectBox;
use std::io::Write;

/// What `cat-file` prints about an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatFileMode {
    Type,
    Size,
    Exists,
    #[default]
    Pretty,
}

impl Repository {
    pub async fn cat_file(&mut self, object: &str, mode: CatFileMode) -> anyhow::Result<()> {
        let oid = Revision::try_parse(object)?.resolve_object(self)?;

        if mode == CatFileMode::Exists {
            return Ok(());
        }

        let raw = self.database().load_raw(&oid)?;
        match mode {
            CatFileMode::Type => writeln!(self.writer(), "{}", raw.object_type)?,
            CatFileMode::Size => writeln!(self.writer(), "{}", raw.data.len())?,
            CatFileMode::Exists => {}
            CatFileMode::Pretty => match raw.parse()? {
                ObjectBox::Blob(blob) => self.writer().write_all(blob.content())?,
                object => writeln!(self.writer(), "{}", object.display())?,
            },
        }

        Ok(())
    }
}
