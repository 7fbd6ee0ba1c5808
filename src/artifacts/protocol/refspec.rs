use crate::areas::refs::HEADS_DIR;

const FORCE_PREFIX: char = '+';
const GLOB: char = '*';

/// `[+]<source>:<target>`, where both sides may contain a single `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refspec {
    pub source: String,
    pub target: String,
    pub forced: bool,
}

impl Refspec {
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let (forced, spec) = match spec.strip_prefix(FORCE_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let (source, target) = spec.split_once(':').unwrap_or((spec, spec));

        if source.matches(GLOB).count() > 1 || target.matches(GLOB).count() > 1 {
            anyhow::bail!("invalid refspec '{}'", spec);
        }
        if source.contains(GLOB) != target.contains(GLOB) {
            anyhow::bail!("invalid refspec '{}'", spec);
        }

        Ok(Self {
            source: qualify(source),
            target: qualify(target),
            forced,
        })
    }

    /// The target for `name`, if the source side matches it.
    pub fn map(&self, name: &str) -> Option<String> {
        match self.source.split_once(GLOB) {
            None => (name == self.source).then(|| self.target.clone()),
            Some((prefix, suffix)) => {
                let stem = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
                Some(self.target.replacen(GLOB, stem, 1))
            }
        }
    }
}

/// Short branch names become `refs/heads/<name>`; an empty side stays empty
/// and denotes deletion.
fn qualify(name: &str) -> String {
    if name.is_empty() || name.starts_with("refs/") || name == "HEAD" {
        name.to_string()
    } else {
        format!("{}/{}", HEADS_DIR, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("+refs/heads/*:refs/remotes/origin/*", "refs/heads/topic", Some("refs/remotes/origin/topic"))]
    #[case("+refs/heads/*:refs/remotes/origin/*", "refs/tags/v1", None)]
    #[case("master", "refs/heads/master", Some("refs/heads/master"))]
    #[case("master:other", "refs/heads/master", Some("refs/heads/other"))]
    fn maps_matching_names(#[case] spec: &str, #[case] name: &str, #[case] expected: Option<&str>) {
        let refspec = Refspec::parse(spec).unwrap();

        assert_eq!(refspec.map(name).as_deref(), expected);
    }

    #[test]
    fn plus_marks_forced_updates() {
        let refspec = Refspec::parse("+master").unwrap();

        assert!(refspec.forced);
        assert_eq!(refspec.target, "refs/heads/master");
    }

    #[test]
    fn empty_source_deletes() {
        let refspec = Refspec::parse(":topic").unwrap();

        assert_eq!(refspec.source, "");
        assert_eq!(refspec.target, "refs/heads/topic");
    }

    #[test]
    fn unbalanced_globs_are_rejected() {
        assert!(Refspec::parse("refs/heads/*:refs/remotes/origin/master").is_err());
    }
}
