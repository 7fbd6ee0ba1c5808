//! Three-way line merge
//!
//! Both sides are diffed against the original. Walking the three texts in
//! step, stretches where all three agree are emitted as clean; between them,
//! a stretch changed on one side only takes that side, and a stretch changed
//! on both sides differently becomes a conflict.

use crate::artifacts::diff::myers::{EditKind, Line, diff_lines};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Clean(Vec<String>),
    Conflict {
        o: Vec<String>,
        a: Vec<String>,
        b: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff3Result {
    chunks: Vec<Chunk>,
}

impl Diff3Result {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn is_clean(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| matches!(chunk, Chunk::Clean(_)))
    }

    /// The merged text, with `<<<<<<< a_name`, `=======` and `>>>>>>> b_name`
    /// around each conflict.
    pub fn to_text(&self, a_name: &str, b_name: &str) -> String {
        let mut text = String::new();

        for chunk in &self.chunks {
            match chunk {
                Chunk::Clean(lines) => text.extend(lines.iter().map(String::as_str)),
                Chunk::Conflict { a, b, .. } => {
                    text.push_str(&format!("<<<<<<< {}\n", a_name));
                    push_section(&mut text, a);
                    text.push_str("=======\n");
                    push_section(&mut text, b);
                    text.push_str(&format!(">>>>>>> {}\n", b_name));
                }
            }
        }

        text
    }
}

fn push_section(text: &mut String, lines: &[String]) {
    for line in lines {
        text.push_str(line);
    }
    if !text.ends_with('\n') && !lines.is_empty() {
        text.push('\n');
    }
}

/// Lines with their terminators kept, so the merged text is byte exact.
fn split_lines(text: &str) -> Vec<Line> {
    text.split_inclusive('\n')
        .enumerate()
        .map(|(i, line)| Line::new(i + 1, line.to_string()))
        .collect()
}

/// Line number in `o` to the matching line number in the other side.
fn match_set(o: &[Line], other: &[Line]) -> HashMap<usize, usize> {
    diff_lines(o, other)
        .into_iter()
        .filter(|edit| edit.kind == EditKind::Eql)
        .filter_map(|edit| Some((edit.a_line?.number, edit.b_line?.number)))
        .collect()
}

pub fn merge(o: &str, a: &str, b: &str) -> Diff3Result {
    Diff3::new(split_lines(o), split_lines(a), split_lines(b)).merge()
}

struct Diff3 {
    o: Vec<Line>,
    a: Vec<Line>,
    b: Vec<Line>,
    match_a: HashMap<usize, usize>,
    match_b: HashMap<usize, usize>,
    // line counts consumed so far on each side
    line_o: usize,
    line_a: usize,
    line_b: usize,
    chunks: Vec<Chunk>,
}

impl Diff3 {
    fn new(o: Vec<Line>, a: Vec<Line>, b: Vec<Line>) -> Self {
        let match_a = match_set(&o, &a);
        let match_b = match_set(&o, &b);

        Diff3 {
            o,
            a,
            b,
            match_a,
            match_b,
            line_o: 0,
            line_a: 0,
            line_b: 0,
            chunks: Vec::new(),
        }
    }

    fn merge(mut self) -> Diff3Result {
        loop {
            match self.find_next_mismatch() {
                Some(1) => match self.find_next_match() {
                    Some((o, a, b)) => self.emit_chunk(o, a, b),
                    None => {
                        self.emit_final_chunk();
                        break;
                    }
                },
                Some(i) => self.emit_chunk(self.line_o + i, self.line_a + i, self.line_b + i),
                None => {
                    self.emit_final_chunk();
                    break;
                }
            }
        }

        Diff3Result {
            chunks: self.chunks,
        }
    }

    /// Offset of the first line where the sides stop agreeing, if any.
    fn find_next_mismatch(&self) -> Option<usize> {
        let mut i = 1;
        while self.in_bounds(i)
            && self.matches(&self.match_a, self.line_a, i)
            && self.matches(&self.match_b, self.line_b, i)
        {
            i += 1;
        }

        self.in_bounds(i).then_some(i)
    }

    fn in_bounds(&self, i: usize) -> bool {
        self.line_o + i <= self.o.len()
            || self.line_a + i <= self.a.len()
            || self.line_b + i <= self.b.len()
    }

    fn matches(&self, matches: &HashMap<usize, usize>, offset: usize, i: usize) -> bool {
        matches.get(&(self.line_o + i)) == Some(&(offset + i))
    }

    /// Next original line that both sides still contain.
    fn find_next_match(&self) -> Option<(usize, usize, usize)> {
        ((self.line_o + 1)..=self.o.len()).find_map(|o| {
            match (self.match_a.get(&o), self.match_b.get(&o)) {
                (Some(&a), Some(&b)) => Some((o, a, b)),
                _ => None,
            }
        })
    }

    fn emit_chunk(&mut self, o: usize, a: usize, b: usize) {
        let o_lines = texts(&self.o[self.line_o..o - 1]);
        let a_lines = texts(&self.a[self.line_a..a - 1]);
        let b_lines = texts(&self.b[self.line_b..b - 1]);
        self.write_chunk(o_lines, a_lines, b_lines);

        self.line_o = o - 1;
        self.line_a = a - 1;
        self.line_b = b - 1;
    }

    fn emit_final_chunk(&mut self) {
        let o_lines = texts(&self.o[self.line_o..]);
        let a_lines = texts(&self.a[self.line_a..]);
        let b_lines = texts(&self.b[self.line_b..]);
        self.write_chunk(o_lines, a_lines, b_lines);
    }

    fn write_chunk(&mut self, o: Vec<String>, a: Vec<String>, b: Vec<String>) {
        let chunk = if a == o || a == b {
            Chunk::Clean(b)
        } else if b == o {
            Chunk::Clean(a)
        } else {
            Chunk::Conflict { o, a, b }
        };

        if chunk != Chunk::Clean(Vec::new()) {
            self.chunks.push(chunk);
        }
    }
}

fn texts(lines: &[Line]) -> Vec<String> {
    lines.iter().map(|line| line.text.clone()).collect()
}
