//! Path filters for tree diffs
//!
//! A filter is a trie of path components. Descending into a tree narrows the
//! filter to the matching child; reaching a filtered path (or starting with
//! no paths at all) switches the filter to match everything below it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Trie {
    matches_all: bool,
    children: BTreeMap<String, Trie>,
}

impl Trie {
    fn insert<'c>(&mut self, components: impl Iterator<Item = &'c str>) {
        let node = components.fold(self, |node, part| {
            node.children.entry(part.to_string()).or_default()
        });
        node.matches_all = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    trie: Trie,
    root_path: PathBuf,
}

impl PathFilter {
    /// A filter that lets every path through.
    pub fn empty() -> Self {
        Self {
            trie: Trie {
                matches_all: true,
                children: BTreeMap::new(),
            },
            root_path: PathBuf::new(),
        }
    }

    /// A filter matching `paths` and everything below them; empty means all.
    pub fn new(paths: &[PathBuf]) -> Self {
        if paths.is_empty() {
            return Self::empty();
        }

        let mut trie = Trie::default();
        for path in paths {
            trie.insert(
                path.components()
                    .filter_map(|component| component.as_os_str().to_str())
                    .filter(|part| *part != "."),
            );
        }

        Self {
            trie,
            root_path: PathBuf::new(),
        }
    }

    /// Path of the tree this filter applies to, relative to the root tree.
    pub fn path(&self) -> &Path {
        &self.root_path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.root_path.join(name)
    }

    /// Whether the tree entry `name` is inside the filtered set.
    pub fn matches(&self, name: &str) -> bool {
        self.trie.matches_all || self.trie.children.contains_key(name)
    }

    /// The filter to apply inside subtree `name`.
    pub fn subpath(&self, name: &str) -> Self {
        let trie = if self.trie.matches_all {
            self.trie.clone()
        } else {
            self.trie.children.get(name).cloned().unwrap_or_default()
        };

        Self {
            trie,
            root_path: self.root_path.join(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_filter_matches_everything_at_every_depth() {
        let filter = PathFilter::empty();

        assert!(filter.matches("anything"));
        assert!(filter.subpath("a").subpath("b").matches("c"));
        assert_eq!(filter.subpath("a").subpath("b").path(), Path::new("a/b"));
    }

    #[test]
    fn no_paths_means_no_filtering() {
        assert_eq!(PathFilter::new(&[]), PathFilter::empty());
    }

    #[test]
    fn filter_narrows_while_descending() {
        let filter = PathFilter::new(&[PathBuf::from("src/lib.rs"), PathBuf::from("docs")]);

        assert!(filter.matches("src"));
        assert!(filter.matches("docs"));
        assert!(!filter.matches("tests"));

        let src = filter.subpath("src");
        assert!(src.matches("lib.rs"));
        assert!(!src.matches("main.rs"));
        assert_eq!(src.join("lib.rs"), PathBuf::from("src/lib.rs"));
    }

    #[test]
    fn filtered_directory_matches_all_of_its_contents() {
        let filter = PathFilter::new(&[PathBuf::from("docs")]);
        let nested = filter.subpath("docs").subpath("guide");

        assert!(nested.matches("intro.md"));
    }

    #[test]
    fn unknown_subtree_matches_nothing() {
        let filter = PathFilter::new(&[PathBuf::from("src")]);

        assert!(!filter.subpath("tests").matches("it.rs"));
    }
}
