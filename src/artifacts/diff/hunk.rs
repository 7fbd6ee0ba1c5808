//! Grouping of edits into unified-diff hunks

use crate::artifacts::diff::myers::{Edit, EditKind, Line};

/// Unchanged lines kept around each change
pub const HUNK_CONTEXT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub a_start: usize,
    pub b_start: usize,
    pub edits: Vec<Edit>,
}

impl Hunk {
    /// Split an edit script into hunks.
    ///
    /// Changes separated by at most twice the context share one hunk.
    pub fn filter(edits: &[Edit]) -> Vec<Hunk> {
        let changes = edits
            .iter()
            .enumerate()
            .filter(|(_, edit)| edit.kind != EditKind::Eql)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        let mut hunks = Vec::new();
        let mut i = 0;

        while i < changes.len() {
            let first = changes[i];
            let mut last = first;
            while i + 1 < changes.len() && changes[i + 1] - last <= 2 * HUNK_CONTEXT + 1 {
                i += 1;
                last = changes[i];
            }
            i += 1;

            let start = first.saturating_sub(HUNK_CONTEXT);
            let end = (last + HUNK_CONTEXT + 1).min(edits.len());
            let slice = &edits[start..end];

            hunks.push(Hunk {
                a_start: Self::first_number(slice, |edit| edit.a_line.as_ref()),
                b_start: Self::first_number(slice, |edit| edit.b_line.as_ref()),
                edits: slice.to_vec(),
            });
        }

        hunks
    }

    fn first_number(edits: &[Edit], side: impl Fn(&Edit) -> Option<&Line>) -> usize {
        edits
            .iter()
            .find_map(|edit| side(edit).map(|line| line.number))
            .unwrap_or(0)
    }

    pub fn a_size(&self) -> usize {
        self.edits.iter().filter(|edit| edit.a_line.is_some()).count()
    }

    pub fn b_size(&self) -> usize {
        self.edits.iter().filter(|edit| edit.b_line.is_some()).count()
    }

    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.a_start,
            self.a_size(),
            self.b_start,
            self.b_size()
        )
    }
}
