//! Repository configuration
//!
//! Stored as TOML at `.git/config.toml`:
//!
//! ```toml
//! [user]
//! name = "A U Thor"
//! email = "author@example.com"
//!
//! [transfer]
//! unpack_limit = 100
//!
//! [receive]
//! deny_non_fast_forwards = true
//! deny_deletes = true
//! deny_current_branch = true
//!
//! [remote.origin]
//! url = "../upstream"
//! fetch = "+refs/heads/*:refs/remotes/origin/*"
//! ```
//!
//! Keys are addressed as dotted paths (`user.name`, `remote.origin.url`).

use crate::artifacts::core::lockfile::Lockfile;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Incoming packs with more objects than this are kept as packs instead of
/// being exploded into loose objects.
pub const DEFAULT_UNPACK_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    user: UserSection,
    transfer: TransferSection,
    receive: ReceiveSection,
    remote: BTreeMap<String, RemoteSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct UserSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TransferSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    unpack_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ReceiveSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    deny_non_fast_forwards: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deny_deletes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deny_current_branch: Option<bool>,
}

impl ReceiveSection {
    const KEYS: [&'static str; 3] = [
        "deny_non_fast_forwards",
        "deny_deletes",
        "deny_current_branch",
    ];

    fn flag(&self, name: &str) -> Option<Option<bool>> {
        match name {
            "deny_non_fast_forwards" => Some(self.deny_non_fast_forwards),
            "deny_deletes" => Some(self.deny_deletes),
            "deny_current_branch" => Some(self.deny_current_branch),
            _ => None,
        }
    }

    fn flag_mut(&mut self, name: &str) -> Option<&mut Option<bool>> {
        match name {
            "deny_non_fast_forwards" => Some(&mut self.deny_non_fast_forwards),
            "deny_deletes" => Some(&mut self.deny_deletes),
            "deny_current_branch" => Some(&mut self.deny_current_branch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSection {
    pub url: String,
    pub fetch: String,
}

impl RemoteSection {
    pub fn with_default_refspec(name: &str, url: String) -> Self {
        RemoteSection {
            url,
            fetch: format!("+refs/heads/*:refs/remotes/{}/*", name),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    path: Box<Path>,
    data: ConfigFile,
}

impl Config {
    /// Load the config at `path`; a missing file is an empty config.
    pub fn open(path: Box<Path>) -> anyhow::Result<Self> {
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
            Err(error) => return Err(error.into()),
        };

        Ok(Config { path, data })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(&self.data)?;

        let mut lockfile = Lockfile::new(self.path.to_path_buf());
        lockfile.hold_for_update()?;
        lockfile.write_all(contents.as_bytes())?;
        lockfile.commit()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match split_key(key)? {
            ("user", None, "name") => self.data.user.name.clone(),
            ("user", None, "email") => self.data.user.email.clone(),
            ("transfer", None, "unpack_limit") => {
                self.data.transfer.unpack_limit.map(|v| v.to_string())
            }
            ("receive", None, name) => self
                .data
                .receive
                .flag(name)?
                .map(|v| v.to_string()),
            ("remote", Some(name), "url") => self.data.remote.get(name).map(|r| r.url.clone()),
            ("remote", Some(name), "fetch") => {
                self.data.remote.get(name).map(|r| r.fetch.clone())
            }
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let parts = split_key(key).with_context(|| format!("invalid key: {}", key))?;

        match parts {
            ("user", None, "name") => self.data.user.name = Some(value.to_string()),
            ("user", None, "email") => self.data.user.email = Some(value.to_string()),
            ("transfer", None, "unpack_limit") => {
                let limit = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid unsigned integer: {}", value))?;
                self.data.transfer.unpack_limit = Some(limit);
            }
            ("receive", None, name) => {
                let flag = self
                    .data
                    .receive
                    .flag_mut(name)
                    .with_context(|| format!("invalid key: {}", key))?;
                let deny = value
                    .parse::<bool>()
                    .with_context(|| format!("invalid boolean: {}", value))?;
                *flag = Some(deny);
            }
            ("remote", Some(name), field @ ("url" | "fetch")) => {
                let remote = self
                    .data
                    .remote
                    .entry(name.to_string())
                    .or_insert_with(|| RemoteSection::with_default_refspec(name, String::new()));
                match field {
                    "url" => remote.url = value.to_string(),
                    _ => remote.fetch = value.to_string(),
                }
            }
            _ => anyhow::bail!("invalid key: {}", key),
        }

        Ok(())
    }

    /// Remove a key, reporting whether it was set.
    pub fn unset(&mut self, key: &str) -> anyhow::Result<bool> {
        let parts = split_key(key).with_context(|| format!("invalid key: {}", key))?;

        let removed = match parts {
            ("user", None, "name") => self.data.user.name.take().is_some(),
            ("user", None, "email") => self.data.user.email.take().is_some(),
            ("transfer", None, "unpack_limit") => self.data.transfer.unpack_limit.take().is_some(),
            ("receive", None, name) => self
                .data
                .receive
                .flag_mut(name)
                .with_context(|| format!("invalid key: {}", key))?
                .take()
                .is_some(),
            ("remote", Some(name), "url" | "fetch") => self.data.remote.remove(name).is_some(),
            _ => anyhow::bail!("invalid key: {}", key),
        };

        Ok(removed)
    }

    /// Every key that is set, as `(dotted.key, value)`.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        let user = &self.data.user;
        if let Some(name) = &user.name {
            entries.push(("user.name".to_string(), name.clone()));
        }
        if let Some(email) = &user.email {
            entries.push(("user.email".to_string(), email.clone()));
        }
        if let Some(limit) = self.data.transfer.unpack_limit {
            entries.push(("transfer.unpack_limit".to_string(), limit.to_string()));
        }
        for name in ReceiveSection::KEYS {
            if let Some(Some(deny)) = self.data.receive.flag(name) {
                entries.push((format!("receive.{}", name), deny.to_string()));
            }
        }
        for (name, remote) in &self.data.remote {
            entries.push((format!("remote.{}.url", name), remote.url.clone()));
            entries.push((format!("remote.{}.fetch", name), remote.fetch.clone()));
        }

        entries
    }

    pub fn user_name(&self) -> Option<&str> {
        self.data.user.name.as_deref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.data.user.email.as_deref()
    }

    pub fn unpack_limit(&self) -> usize {
        self.data
            .transfer
            .unpack_limit
            .unwrap_or(DEFAULT_UNPACK_LIMIT)
    }

    /// Whether receive-pack refuses ref updates that are not fast-forwards.
    pub fn deny_non_fast_forwards(&self) -> bool {
        self.data.receive.deny_non_fast_forwards.unwrap_or(false)
    }

    /// Whether receive-pack refuses to delete refs.
    pub fn deny_deletes(&self) -> bool {
        self.data.receive.deny_deletes.unwrap_or(false)
    }

    /// Whether receive-pack refuses to move the branch HEAD points at.
    pub fn deny_current_branch(&self) -> bool {
        self.data.receive.deny_current_branch.unwrap_or(false)
    }

    pub fn remote(&self, name: &str) -> Option<&RemoteSection> {
        self.data.remote.get(name)
    }

    pub fn remotes(&self) -> impl Iterator<Item = (&String, &RemoteSection)> {
        self.data.remote.iter()
    }

    pub fn add_remote(&mut self, name: &str, url: &str) -> anyhow::Result<()> {
        if self.data.remote.contains_key(name) {
            anyhow::bail!("remote {} already exists.", name);
        }

        self.data.remote.insert(
            name.to_string(),
            RemoteSection::with_default_refspec(name, url.to_string()),
        );
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> anyhow::Result<()> {
        if self.data.remote.remove(name).is_none() {
            anyhow::bail!("No such remote: '{}'", name);
        }

        Ok(())
    }
}

/// Split `section[.subsection].name`; the subsection may contain dots.
fn split_key(key: &str) -> Option<(&str, Option<&str>, &str)> {
    let (section, rest) = key.split_once('.')?;
    match rest.rsplit_once('.') {
        Some((subsection, name)) => Some((section, Some(subsection), name)),
        None => Some((section, None, rest)),
    }
}
