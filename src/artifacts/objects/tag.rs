//! Annotated tag objects
//!
//! ```text
//! object <oid>
//! type <object-type>
//! tag <name>
//! tagger <name> <email> <unix-seconds> <+hhmm>
//!
//! <message>
//! ```

use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Read};

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    name: String,
    tagger: Author,
    message: String,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Author {
        &self.tagger
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(self.display()))
    }
}

impl Unpackable for Tag {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .unwrap_or((content.as_str(), ""));

        let mut target = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        for header in headers.lines() {
            match header.split_once(' ') {
                Some(("object", value)) => target = Some(ObjectId::try_parse(value)?),
                Some(("type", value)) => target_type = Some(ObjectType::try_from(value)?),
                Some(("tag", value)) => name = Some(value.to_string()),
                Some(("tagger", value)) => tagger = Some(Author::try_from(value)?),
                _ => {}
            }
        }

        Ok(Tag::new(
            target.context("tag is missing its object line")?,
            target_type.context("tag is missing its type line")?,
            name.context("tag is missing its name")?,
            tagger.context("tag is missing its tagger")?,
            message.to_string(),
        ))
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.target,
            self.target_type,
            self.name,
            self.tagger.display(),
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tag_headers_parse_back() {
        let tagger = Author::try_from("T <t@example.com> 1700000000 +0000").unwrap();
        let tag = Tag::new(
            ObjectId::try_parse("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
            ObjectType::Commit,
            "v1.0".to_string(),
            tagger,
            "release\n".to_string(),
        );

        let parsed = Tag::deserialize(Cursor::new(tag.serialize().unwrap())).unwrap();

        pretty_assertions::assert_eq!(parsed, tag);
    }
}
