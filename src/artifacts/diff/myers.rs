//! Myers' O(ND) shortest edit script
//!
//! The forward pass records the furthest-reaching `x` on every diagonal `k`
//! for each edit distance `d`; the backtrack walks those snapshots from the
//! end of both sequences back to the origin, emitting one edit per step.
//!
//! Ties prefer deletions over insertions, so for equal inputs the script is
//! always the same.

use derive_new::new;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Line {
    /// 1-based line number
    pub number: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Eql,
    Ins,
    Del,
}

impl EditKind {
    pub fn symbol(&self) -> char {
        match self {
            EditKind::Eql => ' ',
            EditKind::Ins => '+',
            EditKind::Del => '-',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub kind: EditKind,
    pub a_line: Option<Line>,
    pub b_line: Option<Line>,
}

impl Edit {
    pub fn text(&self) -> &str {
        self.a_line
            .as_ref()
            .or(self.b_line.as_ref())
            .map(|line| line.text.as_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.symbol(), self.text())
    }
}

/// Split text into numbered lines, dropping the line terminators.
pub fn lines(text: &str) -> Vec<Line> {
    text.lines()
        .enumerate()
        .map(|(i, text)| Line::new(i + 1, text.to_string()))
        .collect()
}

pub fn diff(a: &str, b: &str) -> Vec<Edit> {
    diff_lines(&lines(a), &lines(b))
}

pub fn diff_lines(a: &[Line], b: &[Line]) -> Vec<Edit> {
    let mut edits = Vec::with_capacity(a.len().max(b.len()));

    backtrack(a, b, |prev_x, prev_y, x, y| {
        let edit = if x == prev_x {
            Edit {
                kind: EditKind::Ins,
                a_line: None,
                b_line: Some(b[prev_y].clone()),
            }
        } else if y == prev_y {
            Edit {
                kind: EditKind::Del,
                a_line: Some(a[prev_x].clone()),
                b_line: None,
            }
        } else {
            Edit {
                kind: EditKind::Eql,
                a_line: Some(a[prev_x].clone()),
                b_line: Some(b[prev_y].clone()),
            }
        };
        edits.push(edit);
    });

    edits.reverse();
    edits
}

fn shortest_edit(a: &[Line], b: &[Line]) -> Vec<Vec<isize>> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = (n + m) as usize;
    let offset = max as isize;

    let mut v = vec![0isize; 2 * max + 2];
    let mut trace = Vec::new();

    for d in 0..=max as isize {
        trace.push(v.clone());

        for k in (-d..=d).step_by(2) {
            let index = (k + offset) as usize;

            let mut x = if k == -d || (k != d && v[index - 1] < v[index + 1]) {
                v[index + 1]
            } else {
                v[index - 1] + 1
            };
            let mut y = x - k;

            while x < n && y < m && a[x as usize].text == b[y as usize].text {
                x += 1;
                y += 1;
            }

            v[index] = x;

            if x >= n && y >= m {
                return trace;
            }
        }
    }

    trace
}

fn backtrack(a: &[Line], b: &[Line], mut emit: impl FnMut(usize, usize, usize, usize)) {
    let (mut x, mut y) = (a.len() as isize, b.len() as isize);
    let offset = (a.len() + b.len()) as isize;

    for (d, v) in shortest_edit(a, b).iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let at = |k: isize| v[(k + offset) as usize];

        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            emit((x - 1) as usize, (y - 1) as usize, x as usize, y as usize);
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            emit(prev_x as usize, prev_y as usize, x as usize, y as usize);
        }

        x = prev_x;
        y = prev_y;
    }
}

/// Rebuild the new side from an edit script.
pub fn apply(edits: &[Edit]) -> Vec<String> {
    edits
        .iter()
        .filter_map(|edit| edit.b_line.as_ref().map(|line| line.text.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn script(a: &str, b: &str) -> String {
        diff(a, b)
            .iter()
            .map(|edit| edit.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn classic_example_has_the_minimal_script() {
        let a = "A\nB\nC\nA\nB\nB\nA\n";
        let b = "C\nB\nA\nB\nA\nC\n";

        let edits = diff(a, b);
        let changes = edits.iter().filter(|edit| edit.kind != EditKind::Eql).count();

        assert_eq!(changes, 5);
        assert_eq!(
            script(a, b),
            "-A\n-B\n C\n+B\n A\n B\n-B\n A\n+C"
        );
    }

    #[rstest]
    #[case("", "", "")]
    #[case("a\n", "a\n", " a")]
    #[case("", "a\nb\n", "+a\n+b")]
    #[case("a\nb\n", "", "-a\n-b")]
    #[case("a\nb\nc\n", "a\nx\nc\n", " a\n-b\n+x\n c")]
    fn small_scripts(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
        assert_eq!(script(a, b), expected);
    }

    #[test]
    fn edits_keep_their_line_numbers() {
        let edits = diff("a\nb\n", "b\nc\n");

        assert_eq!(edits[0].a_line, Some(Line::new(1, "a".into())));
        assert_eq!(edits[1].a_line.as_ref().map(|line| line.number), Some(2));
        assert_eq!(edits[1].b_line.as_ref().map(|line| line.number), Some(1));
        assert_eq!(edits[2].b_line, Some(Line::new(2, "c".into())));
    }

    proptest! {
        #[test]
        fn applying_the_script_yields_the_new_side(
            a in prop::collection::vec("[abc]", 0..12),
            b in prop::collection::vec("[abc]", 0..12),
        ) {
            let a_text = a.iter().map(|line| format!("{}\n", line)).collect::<String>();
            let b_text = b.iter().map(|line| format!("{}\n", line)).collect::<String>();

            let edits = diff(&a_text, &b_text);
            let old_side = edits
                .iter()
                .filter_map(|edit| edit.a_line.as_ref().map(|line| line.text.clone()))
                .collect::<Vec<_>>();

            prop_assert_eq!(apply(&edits), b);
            prop_assert_eq!(old_side, a);
        }

        #[test]
        fn diff_is_deterministic(
            a in prop::collection::vec("[ab]", 0..8),
            b in prop::collection::vec("[ab]", 0..8),
        ) {
            let a_text = a.join("\n");
            let b_text = b.join("\n");

            prop_assert_eq!(diff(&a_text, &b_text), diff(&a_text, &b_text));
        }
    }
}
