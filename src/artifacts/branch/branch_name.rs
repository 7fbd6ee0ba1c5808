use crate::artifacts::branch::INVALID_BRANCH_NAME_REGEX;
use crate::errors::RepoError;
use anyhow::Context;
use derive_new::new;

const REF_PREFIX: &str = "refs/heads/";
const REFS_ROOT: &str = "refs/";

/// Accept only names under `refs/` that follow the branch naming rules
/// component by component, so a ref path never leaves `refs/`.
pub fn check_ref_format(name: &str) -> anyhow::Result<()> {
    let re = regex::Regex::new(INVALID_BRANCH_NAME_REGEX)
        .with_context(|| format!("invalid branch name regex: {INVALID_BRANCH_NAME_REGEX}"))?;

    let valid = name
        .strip_prefix(REFS_ROOT)
        .is_some_and(|rest| {
            !rest.is_empty()
                && !rest.ends_with('.')
                && rest.split('/').all(|component| !component.is_empty())
                && !re.is_match(rest)
        });
    if !valid {
        anyhow::bail!(RepoError::InvalidRefName(name.to_string()));
    }

    Ok(())
}

/// A ref path relative to `.git`, such as `HEAD` or `refs/heads/main`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, new)]
pub struct SymRefName(String);

impl SymRefName {
    pub fn is_detached_head(&self) -> bool {
        self.0 == "HEAD"
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(REF_PREFIX)
    }

    pub fn as_ref_path(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SymRefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: String) -> anyhow::Result<Self> {
        if name.is_empty() {
            anyhow::bail!("branch name cannot be empty");
        }

        let re = regex::Regex::new(INVALID_BRANCH_NAME_REGEX)
            .with_context(|| format!("invalid branch name regex: {INVALID_BRANCH_NAME_REGEX}"))?;

        if re.is_match(&name) {
            anyhow::bail!("'{}' is not a valid branch name.", name);
        }

        Ok(Self(name))
    }

    /// `refs/heads/topic` -> `topic`
    pub fn try_parse_sym_ref_name(sym_ref_name: &SymRefName) -> anyhow::Result<Self> {
        match sym_ref_name.0.strip_prefix(REF_PREFIX) {
            Some(name) => Self::try_parse(name.to_string()),
            None => anyhow::bail!(
                "symbolic ref name must start with '{}', got '{}'",
                REF_PREFIX,
                sym_ref_name.0
            ),
        }
    }

    pub fn to_sym_ref_name(&self) -> SymRefName {
        SymRefName::new(format!("{}{}", REF_PREFIX, self.0))
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
