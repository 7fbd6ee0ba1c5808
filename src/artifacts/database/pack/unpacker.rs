use crate::areas::database::Database;
use crate::artifacts::database::pack::delta::DeltaResolver;
use crate::artifacts::database::pack::reader::PackReader;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use derive_new::new;
use std::io::Read;
use tracing::debug;

/// Explodes a received pack into loose objects.
///
/// Every record is decoded, expanded if it is a delta and checked, and the
/// trailer verified, before the first object is written.
#[derive(new)]
pub struct Unpacker<'d> {
    database: &'d Database,
}

impl Unpacker<'_> {
    pub fn unpack<R: Read>(&self, mut pack: PackReader<R>) -> anyhow::Result<Vec<ObjectId>> {
        let mut resolver = DeltaResolver::new(self.database);
        let mut objects = Vec::new();

        while let Some(record) = pack.next_record()? {
            objects.push(resolver.resolve(record)?);
        }
        pack.finish()?;

        debug!(count = objects.len(), "writing unpacked objects");
        objects
            .into_iter()
            .map(|(oid, object)| {
                self.database.store_raw(&object)?;
                Ok(oid)
            })
            .collect()
    }
}

/// Re-hash a decoded object and make sure its payload parses as its type.
pub fn validate(object: &RawObject) -> anyhow::Result<ObjectId> {
    object.parse().map_err(|error| {
        RepoError::CorruptPack(format!("malformed {} object: {:#}", object.object_type, error))
    })?;

    object.object_id()
}
