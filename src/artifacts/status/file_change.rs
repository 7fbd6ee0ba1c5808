use crate::artifacts::index::index_entry::Stage;
use colored::Colorize;

const LABEL_WIDTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WorkspaceChangeType {
    #[default]
    None,
    Untracked,
    Modified,
    Deleted,
}

impl WorkspaceChangeType {
    pub fn short_code(&self) -> &'static str {
        match self {
            WorkspaceChangeType::None => " ",
            WorkspaceChangeType::Untracked => "?",
            WorkspaceChangeType::Modified => "M",
            WorkspaceChangeType::Deleted => "D",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkspaceChangeType::Modified => "modified:",
            WorkspaceChangeType::Deleted => "deleted:",
            WorkspaceChangeType::None | WorkspaceChangeType::Untracked => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IndexChangeType {
    #[default]
    None,
    Added,
    Modified,
    Deleted,
}

impl IndexChangeType {
    pub fn short_code(&self) -> &'static str {
        match self {
            IndexChangeType::None => " ",
            IndexChangeType::Added => "A",
            IndexChangeType::Modified => "M",
            IndexChangeType::Deleted => "D",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndexChangeType::Added => "new file:",
            IndexChangeType::Modified => "modified:",
            IndexChangeType::Deleted => "deleted:",
            IndexChangeType::None => "",
        }
    }
}

/// How a path ended up unmerged, derived from which stages are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictKind {
    BothModified,
    DeletedByThem,
    DeletedByUs,
    BothAdded,
    AddedByUs,
    AddedByThem,
}

impl ConflictKind {
    pub fn from_stages(stages: &[Stage]) -> Option<Self> {
        let has = |stage| stages.contains(&stage);

        match (has(Stage::Base), has(Stage::Ours), has(Stage::Theirs)) {
            (true, true, true) => Some(ConflictKind::BothModified),
            (true, true, false) => Some(ConflictKind::DeletedByThem),
            (true, false, true) => Some(ConflictKind::DeletedByUs),
            (false, true, true) => Some(ConflictKind::BothAdded),
            (false, true, false) => Some(ConflictKind::AddedByUs),
            (false, false, true) => Some(ConflictKind::AddedByThem),
            _ => None,
        }
    }

    pub fn short_code(&self) -> &'static str {
        match self {
            ConflictKind::BothModified => "UU",
            ConflictKind::DeletedByThem => "UD",
            ConflictKind::DeletedByUs => "DU",
            ConflictKind::BothAdded => "AA",
            ConflictKind::AddedByUs => "AU",
            ConflictKind::AddedByThem => "UA",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::BothModified => "both modified:",
            ConflictKind::DeletedByThem => "deleted by them:",
            ConflictKind::DeletedByUs => "deleted by us:",
            ConflictKind::BothAdded => "both added:",
            ConflictKind::AddedByUs => "added by us:",
            ConflictKind::AddedByThem => "added by them:",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileChangeType {
    Workspace(WorkspaceChangeType),
    Index(IndexChangeType),
    Conflict(ConflictKind),
}

impl FileChangeType {
    fn label(&self) -> &'static str {
        match self {
            FileChangeType::Workspace(change) => change.label(),
            FileChangeType::Index(change) => change.label(),
            FileChangeType::Conflict(kind) => kind.label(),
        }
    }
}

/// The padded label of a long-format status line, coloured by area.
impl std::fmt::Display for FileChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = format!("{:<width$}", self.label(), width = LABEL_WIDTH);
        let colored_label = match self {
            FileChangeType::Index(_) => label.green(),
            FileChangeType::Workspace(_) | FileChangeType::Conflict(_) => label.red(),
        };

        write!(f, "{}", colored_label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FileChange {
    pub(crate) workspace_change: WorkspaceChangeType,
    pub(crate) index_change: IndexChangeType,
}

/// The two-letter porcelain code: index column, then workspace column.
impl std::fmt::Display for FileChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            self.index_change.short_code(),
            self.workspace_change.short_code()
        )
    }
}
