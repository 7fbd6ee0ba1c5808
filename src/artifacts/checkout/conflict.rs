use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};

#[derive(Debug)]
pub struct ConflictMessage {
    pub header: &'static str,
    pub footer: Option<&'static str>,
}

impl From<ConflictType> for ConflictMessage {
    fn from(value: ConflictType) -> Self {
        match value {
            ConflictType::StaleFile => Self {
                header: "Your local changes to the following files would be overwritten by checkout:",
                footer: Some("Please commit your changes or stash them before you switch branches."),
            },
            ConflictType::StaleDirectory => Self {
                header: "Updating the following directories would lose untracked files in them:",
                footer: None,
            },
            ConflictType::UntrackedOverwritten => Self {
                header: "The following untracked working tree files would be overwritten by checkout:",
                footer: Some("Please move or remove them before you switch branches."),
            },
            ConflictType::UntrackedRemoved => Self {
                header: "The following untracked working tree files would be removed by checkout:",
                footer: Some("Please move or remove them before you switch branches."),
            },
        }
    }
}

/// Ways a checkout could destroy work that is not committed anywhere.
/// Declaration order is reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictType {
    StaleFile,
    StaleDirectory,
    UntrackedOverwritten,
    UntrackedRemoved,
}

impl ConflictType {
    pub fn classify(
        stat: Option<&EntryMetadata>,
        entry: Option<&IndexEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> ConflictType {
        if entry.is_some() {
            ConflictType::StaleFile
        } else if let Some(stat) = stat
            && stat.mode.is_tree()
        {
            ConflictType::StaleDirectory
        } else if new_entry.is_some() {
            ConflictType::UntrackedOverwritten
        } else {
            ConflictType::UntrackedRemoved
        }
    }

    /// The `error: ...` block listing `paths` under this conflict's header.
    pub fn report<'p>(self, paths: impl IntoIterator<Item = &'p std::path::PathBuf>) -> String {
        let ConflictMessage { header, footer } = self.into();

        let mut lines = vec![format!("error: {}", header)];
        lines.extend(paths.into_iter().map(|path| format!("\t{}", path.display())));
        if let Some(footer) = footer {
            lines.push(footer.to_string());
        }

        lines.join("\n")
    }
}
