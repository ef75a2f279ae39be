//! Zoekt-style native query syntax.
//!
//! A query is a whitespace separated list of atoms, all of which must hold:
//!
//! - `word` or `"quoted phrase"`: case-insensitive substring of the content
//! - `/regex/`: case-insensitive regular expression over the content
//! - `lang:Go`: language equals, ignoring case
//! - `file:src/`: case-insensitive substring of the filename
//!
//! Any atom may be negated with a leading `-`.

use regex::{Regex, RegexBuilder};

use reposearch_core::normalize::find_ignore_ascii_case;
use reposearch_types::CodeDocument;

use crate::error::TrigramError;

#[derive(Debug, Clone)]
pub enum Atom {
    Substring(String),
    Regex(Regex),
    Lang(String),
    File(String),
}

impl Atom {
    /// Span of the atom in the content; `Some((0, 0))` for metadata atoms.
    fn find(&self, doc: &CodeDocument) -> Option<(usize, usize)> {
        match self {
            Atom::Substring(needle) => find_ignore_ascii_case(&doc.content, needle)
                .map(|start| (start, start + needle.len())),
            Atom::Regex(re) => re.find(&doc.content).map(|m| (m.start(), m.end())),
            Atom::Lang(lang) => doc.language.eq_ignore_ascii_case(lang).then_some((0, 0)),
            Atom::File(part) => find_ignore_ascii_case(&doc.filename, part).map(|_| (0, 0)),
        }
    }

    fn is_content(&self) -> bool {
        matches!(self, Atom::Substring(_) | Atom::Regex(_))
    }
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub atom: Atom,
    pub negated: bool,
}

/// A parsed native query.
#[derive(Debug, Clone)]
pub struct NativeQuery {
    pub clauses: Vec<Clause>,
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_atoms(input: &str) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !buf.is_empty() {
                    out.push((std::mem::take(&mut buf), quoted));
                }
                quoted = false;
            }
            c => buf.push(c),
        }
    }
    if !buf.is_empty() {
        out.push((buf, quoted));
    }
    out
}

fn parse_atom(text: &str, quoted: bool) -> Result<Atom, TrigramError> {
    if quoted {
        return Ok(Atom::Substring(text.to_string()));
    }
    if let Some(lang) = text.strip_prefix("lang:") {
        return Ok(Atom::Lang(lang.to_string()));
    }
    if let Some(file) = text.strip_prefix("file:") {
        return Ok(Atom::File(file.to_string()));
    }
    if text.len() > 2 && text.starts_with('/') && text.ends_with('/') {
        let pattern = &text[1..text.len() - 1];
        let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        return Ok(Atom::Regex(re));
    }
    Ok(Atom::Substring(text.to_string()))
}

impl NativeQuery {
    pub fn parse(input: &str) -> Result<Self, TrigramError> {
        let mut clauses = Vec::new();
        for (token, quoted) in split_atoms(input) {
            let (text, negated) = match token.strip_prefix('-') {
                Some(rest) if !rest.is_empty() => (rest, true),
                _ => (token.as_str(), false),
            };
            let atom = parse_atom(text, quoted)?;
            if matches!(&atom, Atom::Lang(v) | Atom::File(v) | Atom::Substring(v) if v.is_empty()) {
                return Err(TrigramError::InvalidQuery(format!("empty atom in {:?}", input)));
            }
            clauses.push(Clause { atom, negated });
        }
        if clauses.is_empty() {
            return Err(TrigramError::InvalidQuery("empty query".to_string()));
        }
        Ok(Self { clauses })
    }

    /// Substrings every matching document must contain, for prefiltering.
    pub fn required_substrings(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().filter_map(|c| match (&c.atom, c.negated) {
            (Atom::Substring(s), false) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Evaluate against a document; returns the earliest content span.
    pub fn find(&self, doc: &CodeDocument) -> Option<(usize, usize)> {
        let mut first: Option<(usize, usize)> = None;
        for clause in &self.clauses {
            let found = clause.atom.find(doc);
            match (found, clause.negated) {
                (Some(_), true) | (None, false) => return None,
                (Some(span), false) if clause.atom.is_content() => {
                    if first.map_or(true, |f| span.0 < f.0) {
                        first = Some(span);
                    }
                }
                _ => {}
            }
        }
        Some(first.unwrap_or((0, 0)))
    }
}
