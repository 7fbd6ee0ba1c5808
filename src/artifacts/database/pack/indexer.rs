use crate::areas::database::Database;
use crate::artifacts::database::pack::pack_index::PackIndex;
use crate::artifacts::database::pack::reader::PackReader;
use crate::artifacts::database::pack::delta::DeltaResolver;
use crate::artifacts::database::pack::writer::{PackWriter, RecordPosition};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use fake::rand;
use std::collections::BTreeMap;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores a received pack whole, next to a freshly built `.idx`.
///
/// The pack is rewritten into a temporary file while each record is checked,
/// with deltas expanded; the `pack-<sha>.pack`/`.idx` pair only appears once
/// everything verified.
#[derive(new)]
pub struct Indexer<'d> {
    database: &'d Database,
}

impl Indexer<'_> {
    pub fn index<R: Read>(&self, mut pack: PackReader<R>) -> anyhow::Result<Vec<ObjectId>> {
        let pack_dir = self.database.pack_dir();
        std::fs::create_dir_all(&pack_dir)
            .with_context(|| format!("Unable to create {}", pack_dir.display()))?;

        let temp_pack = pack_dir.join(format!("tmp_pack_{}", rand::random::<u32>()));
        let temp_idx = pack_dir.join(format!("tmp_idx_{}", rand::random::<u32>()));

        let result = self.write_pack(&mut pack, &temp_pack, &temp_idx);
        let result = result.and_then(|(positions, checksum)| {
            pack.finish()?;
            Ok((positions, checksum))
        });

        let (positions, checksum) = match result {
            Ok(written) => written,
            Err(error) => {
                let _ = std::fs::remove_file(&temp_pack);
                let _ = std::fs::remove_file(&temp_idx);
                return Err(error);
            }
        };

        let name = checksum.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        let (pack_path, idx_path) = pack_paths(&pack_dir, &name);
        std::fs::rename(&temp_pack, &pack_path)?;
        // the .idx lands last so readers never see a pack without its index
        std::fs::rename(&temp_idx, &idx_path)?;
        self.database.reload_packs();

        debug!(pack = %pack_path.display(), objects = positions.len(), "stored pack");
        Ok(positions.into_keys().collect())
    }

    fn write_pack<R: Read>(
        &self,
        pack: &mut PackReader<R>,
        temp_pack: &Path,
        temp_idx: &Path,
    ) -> anyhow::Result<(BTreeMap<ObjectId, RecordPosition>, [u8; 20])> {
        let file = std::fs::File::create(temp_pack)?;
        let mut writer = PackWriter::new(BufWriter::new(file), pack.count())?;
        let mut resolver = DeltaResolver::new(self.database);
        let mut positions = BTreeMap::new();

        while let Some(record) = pack.next_record()? {
            let (oid, object) = resolver.resolve(record)?;
            let position = writer.write_object(&object)?;
            positions.insert(oid, position);
        }
        let (checksum, _) = writer.finish()?;

        let mut idx = BufWriter::new(std::fs::File::create(temp_idx)?);
        PackIndex::write(&positions, &checksum, &mut idx)?;
        std::io::Write::flush(&mut idx)?;

        Ok((positions, checksum))
    }
}

pub fn pack_paths(pack_dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        pack_dir.join(format!("pack-{}.pack", name)),
        pack_dir.join(format!("pack-{}.idx", name)),
    )
}
