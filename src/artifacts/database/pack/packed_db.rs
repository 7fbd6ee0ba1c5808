use crate::artifacts::database::pack::pack_index::PackIndex;
use crate::artifacts::database::pack::reader::decode_record;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use anyhow::Context;
use std::cell::RefCell;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug)]
struct LoadedPack {
    pack_path: PathBuf,
    index: PackIndex,
}

/// Read access to every `pack-*.pack` under `objects/pack`.
///
/// Indexes are loaded on first use and dropped by `reload`.
#[derive(Debug)]
pub struct PackedDb {
    pack_dir: Box<Path>,
    packs: RefCell<Option<Vec<LoadedPack>>>,
}

impl PackedDb {
    pub fn new(pack_dir: Box<Path>) -> Self {
        PackedDb {
            pack_dir,
            packs: RefCell::new(None),
        }
    }

    pub fn reload(&self) {
        self.packs.borrow_mut().take();
    }

    pub fn has(&self, oid: &ObjectId) -> anyhow::Result<bool> {
        self.with_packs(|packs| {
            packs
                .iter()
                .any(|pack| pack.index.offset(oid).is_some())
        })
    }

    pub fn load_raw(&self, oid: &ObjectId) -> anyhow::Result<Option<RawObject>> {
        let location = self.with_packs(|packs| {
            packs.iter().find_map(|pack| {
                pack.index
                    .offset(oid)
                    .map(|offset| (pack.pack_path.clone(), offset))
            })
        })?;

        let Some((pack_path, offset)) = location else {
            return Ok(None);
        };

        let mut file = std::fs::File::open(&pack_path)
            .with_context(|| format!("Unable to open pack {}", pack_path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        let object = decode_record(&mut BufReader::new(file))?;

        if &object.object_id()? != oid {
            anyhow::bail!(RepoError::CorruptPack(format!(
                "object at offset {} of {} does not hash to {}",
                offset,
                pack_path.display(),
                oid
            )));
        }

        Ok(Some(object))
    }

    pub fn prefix_match(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        self.with_packs(|packs| {
            packs
                .iter()
                .flat_map(|pack| pack.index.oids())
                .filter(|oid| oid.starts_with(prefix))
                .cloned()
                .collect()
        })
    }

    fn with_packs<T>(&self, func: impl FnOnce(&[LoadedPack]) -> T) -> anyhow::Result<T> {
        if self.packs.borrow().is_none() {
            let loaded = self.load_packs()?;
            *self.packs.borrow_mut() = Some(loaded);
        }

        let packs = self.packs.borrow();
        Ok(func(packs.as_deref().unwrap_or_default()))
    }

    fn load_packs(&self) -> anyhow::Result<Vec<LoadedPack>> {
        if !self.pack_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut packs = Vec::new();
        for entry in std::fs::read_dir(&self.pack_dir)? {
            let idx_path = entry?.path();
            if idx_path.extension().and_then(|ext| ext.to_str()) != Some("idx") {
                continue;
            }

            let pack_path = idx_path.with_extension("pack");
            if !pack_path.exists() {
                warn!(index = %idx_path.display(), "index without a pack, skipping");
                continue;
            }

            packs.push(LoadedPack {
                index: PackIndex::load(&idx_path)?,
                pack_path,
            });
        }
        packs.sort_by(|a, b| a.pack_path.cmp(&b.pack_path));

        Ok(packs)
    }
}
