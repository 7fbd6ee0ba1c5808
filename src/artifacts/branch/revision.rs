use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::{ANCESTOR_REGEX, PARENT_REGEX, REF_ALIASES};
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepoError;
use anyhow::Context;

/// Minimum number of hex digits accepted as an abbreviated id
const MIN_PREFIX_LENGTH: usize = 4;

/// A revision expression naming a commit.
///
/// Supported forms:
/// - ref names: `main`, `feature/x`, `origin/main`, `HEAD`, `ORIG_HEAD`
/// - the alias `@` for `HEAD`
/// - full or abbreviated object ids (4 to 40 hex digits)
/// - `<rev>^` for the first parent, `<rev>~<n>` for the n-th first-parent ancestor
///
/// Hex-looking names parse as refs and only fall back to object ids when no
/// ref of that name exists.
#[derive(Debug, Clone)]
pub enum Revision {
    Ref(BranchName),
    Ancestor(Box<Revision>, usize),
    Parent(Box<Revision>),
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Revision::Ref(name) => write!(f, "{}", name),
            Revision::Ancestor(base, generations) => write!(f, "{}~{}", base, generations),
            Revision::Parent(base) => write!(f, "{}^", base),
        }
    }
}

impl Revision {
    /// Resolve to a commit id.
    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        let oid = self.resolve_object(repository)?;
        Self::validate_oid_is_commit(&oid, repository)?;

        Ok(oid)
    }

    /// Resolve to an object id of any type.
    pub fn resolve_object(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        match self {
            Revision::Ref(name) => {
                if let Some(oid) = repository.refs().read_ref(name.as_ref())? {
                    return Ok(oid);
                }

                if Self::looks_like_oid(name.as_ref()) {
                    return Self::resolve_oid(name.as_ref(), repository);
                }

                anyhow::bail!(RepoError::NotFound(format!(
                    "Not a valid object name: '{}'.",
                    name
                )))
            }
            Revision::Parent(base) => {
                let oid = base.resolve(repository)?;
                Self::commit_parent(&oid, repository)?.ok_or_else(|| {
                    RepoError::NotFound(format!("Not a valid object name: '{}'.", self)).into()
                })
            }
            Revision::Ancestor(base, generations) => {
                let mut oid = base.resolve(repository)?;
                for _ in 0..*generations {
                    oid = Self::commit_parent(&oid, repository)?.ok_or_else(|| {
                        anyhow::Error::from(RepoError::NotFound(format!(
                            "Not a valid object name: '{}'.",
                            self
                        )))
                    })?;
                }

                Ok(oid)
            }
        }
    }

    fn commit_parent(
        oid: &ObjectId,
        repository: &Repository,
    ) -> anyhow::Result<Option<ObjectId>> {
        let commit = repository.database().load_commit(oid)?;
        Ok(commit.parent().cloned())
    }

    fn resolve_oid(oid_str: &str, repository: &Repository) -> anyhow::Result<ObjectId> {
        if oid_str.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(oid_str)?;
            if !repository.database().has(&oid)? {
                anyhow::bail!(RepoError::NotFound(format!(
                    "Not a valid object name: '{}'.",
                    oid_str
                )));
            }
            return Ok(oid);
        }

        let matches = repository.database().prefix_match(oid_str)?;

        match matches.as_slice() {
            [] => anyhow::bail!(RepoError::NotFound(format!(
                "ambiguous argument '{}': unknown revision or path not in the working tree",
                oid_str
            ))),
            [oid] => Ok(oid.clone()),
            candidates => {
                let mut error_msg = format!(
                    "short SHA1 {} is ambiguous\nhint: The candidates are:",
                    oid_str
                );
                for oid in candidates {
                    let object_type = repository
                        .database()
                        .get_object_type(oid)
                        .map(|object_type| object_type.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    error_msg.push_str(&format!(
                        "\nhint:   {} {}",
                        oid.to_short_oid(),
                        object_type
                    ));
                }
                anyhow::bail!(error_msg)
            }
        }
    }

    fn validate_oid_is_commit(oid: &ObjectId, repository: &Repository) -> anyhow::Result<()> {
        let obj_type = repository
            .database()
            .get_object_type(oid)
            .with_context(|| format!("object {} not found", oid))?;

        if obj_type != ObjectType::Commit {
            anyhow::bail!(
                "object {} is a {}, not a commit",
                oid.to_short_oid(),
                obj_type
            );
        }

        Ok(())
    }

    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        let parent_regex = regex::Regex::new(PARENT_REGEX)
            .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?;
        let ancestor_regex = regex::Regex::new(ANCESTOR_REGEX)
            .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?;

        if let Some(caps) = parent_regex.captures(revision) {
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Parent(Box::new(base_revision)))
        } else if let Some(caps) = ancestor_regex.captures(revision) {
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Ancestor(Box::new(base_revision), generations))
        } else {
            let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);
            let branch_name = BranchName::try_parse(resolved_name.to_string())?;
            Ok(Revision::Ref(branch_name))
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        (MIN_PREFIX_LENGTH..=OBJECT_ID_LENGTH).contains(&s.len())
            && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}
