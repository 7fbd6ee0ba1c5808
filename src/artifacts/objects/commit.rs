//! Commit objects
//!
//! ```text
//! tree <tree-oid>
//! parent <parent-oid>          (zero or more)
//! author <name> <email> <unix-seconds> <+hhmm>
//! committer <name> <email> <unix-seconds> <+hhmm>
//!
//! <message>
//! ```
//!
//! The message is everything after the first blank line, kept byte for byte.

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::io::{BufRead, Read};

const AUTHOR_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Identity and timestamp of an author, committer or tagger
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Author {
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// The header form: "Name <email> seconds +hhmm"
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    /// Identity from `GRAFT_AUTHOR_*`, falling back to `GIT_AUTHOR_*`.
    ///
    /// Missing name or email yields `None` so the caller can consult the
    /// repository config; an unparsable date falls back to the current time.
    pub fn from_env() -> Option<Self> {
        let var = |suffix: &str| {
            std::env::var(format!("GRAFT_AUTHOR_{}", suffix))
                .or_else(|_| std::env::var(format!("GIT_AUTHOR_{}", suffix)))
                .ok()
        };

        let name = var("NAME")?;
        let email = var("EMAIL")?;
        let timestamp = var("DATE").and_then(|date| Self::parse_date(&date));

        Some(match timestamp {
            Some(ts) => Author::new_with_timestamp(name, email, ts),
            None => Author::new(name, email),
        })
    }

    pub fn parse_date(date: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        chrono::DateTime::parse_from_rfc2822(date)
            .or_else(|_| chrono::DateTime::parse_from_str(date, AUTHOR_DATE_FORMAT))
            .ok()
    }

    /// "Mon Jan 1 12:34:56 2024 +0000"
    pub fn readable_timestamp(&self) -> String {
        self.timestamp
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string()
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // "name <email> timestamp timezone", read from the right
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            anyhow::bail!("Invalid author format");
        }

        let timezone = parts[0];
        let timestamp = parts[1]
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("Invalid timestamp"))?;
        let name_email = parts[2];

        let email_start = name_email
            .find('<')
            .context("Invalid author format: missing '<'")?;
        let email_end = name_email
            .rfind('>')
            .context("Invalid author format: missing '>'")?;

        let name = name_email[..email_start].trim().to_string();
        let email = name_email[email_start + 1..email_end].to_string();

        let offset = chrono::DateTime::parse_from_str(
            &format!("1970-01-01 00:00:00 {}", timezone),
            AUTHOR_DATE_FORMAT,
        )
        .map_err(|_| anyhow::anyhow!("Invalid timezone"))?
        .offset()
        .to_owned();
        let datetime = chrono::DateTime::from_timestamp(timestamp, 0)
            .context("Invalid timestamp")?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp: datetime,
        })
    }
}

/// The parts of a commit the revision graph needs
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    pub timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl PartialOrd for SlimCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlimCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| other.oid.cmp(&self.oid))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    parents: Vec<ObjectId>,
    tree_oid: ObjectId,
    author: Author,
    committer: Author,
    message: String,
}

impl Commit {
    /// A commit whose committer is its author.
    pub fn new(parents: Vec<ObjectId>, tree_oid: ObjectId, author: Author, message: String) -> Self {
        Commit {
            parents,
            tree_oid,
            committer: author.clone(),
            author,
            message,
        }
    }

    pub fn with_committer(mut self, committer: Author) -> Self {
        self.committer = committer;
        self
    }

    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.committer.timestamp()
    }

    pub fn to_slim(&self, oid: ObjectId) -> SlimCommit {
        SlimCommit {
            oid,
            parents: self.parents.clone(),
            timestamp: self.timestamp(),
        }
    }

    fn headers(&self) -> Vec<String> {
        let mut headers = vec![format!("tree {}", self.tree_oid)];
        headers.extend(self.parents.iter().map(|parent| format!("parent {}", parent)));
        headers.push(format!("author {}", self.author.display()));
        headers.push(format!("committer {}", self.committer.display()));

        headers
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(self.display()))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .unwrap_or((content.as_str(), ""));

        let mut tree_oid = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for header in headers.lines() {
            let (key, value) = header
                .split_once(' ')
                .with_context(|| format!("malformed header line: {}", header))?;

            match key {
                "tree" => tree_oid = Some(ObjectId::try_parse(value)?),
                "parent" => parents.push(ObjectId::try_parse(value)?),
                "author" => author = Some(Author::try_from(value)?),
                "committer" => committer = Some(Author::try_from(value)?),
                // unknown headers (gpgsig, encoding, ...) are skipped
                _ => {}
            }
        }

        let tree_oid = tree_oid.context("missing tree line")?;
        let author = author.context("missing author line")?;
        let committer = committer.unwrap_or_else(|| author.clone());

        Ok(Commit::new(parents, tree_oid, author, message.to_string()).with_committer(committer))
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        format!("{}\n\n{}", self.headers().join("\n"), self.message)
    }
}
