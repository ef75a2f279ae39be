//! In-memory trigram postings for one repository.

use std::collections::{BTreeMap, HashMap, HashSet};

use reposearch_types::CodeDocument;

pub type Trigram = [u8; 3];

/// Distinct ASCII-lowercased byte trigrams of `text`.
pub fn trigrams(text: &str) -> HashSet<Trigram> {
    text.as_bytes()
        .windows(3)
        .map(|w| {
            [
                w[0].to_ascii_lowercase(),
                w[1].to_ascii_lowercase(),
                w[2].to_ascii_lowercase(),
            ]
        })
        .collect()
}

/// Sorted intersection of two ordinal lists.
fn intersect_sorted(left: &[u32], right: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(left[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Documents of one repository, ordered by filename, plus their postings.
#[derive(Debug, Default)]
pub struct RepoIndex {
    docs: Vec<CodeDocument>,
    postings: HashMap<Trigram, Vec<u32>>,
}

impl RepoIndex {
    pub fn new(mut docs: Vec<CodeDocument>) -> Self {
        docs.sort_by(|a, b| a.filename.cmp(&b.filename));
        docs.dedup_by(|a, b| a.filename == b.filename);
        let mut postings: HashMap<Trigram, Vec<u32>> = HashMap::new();
        for (ordinal, doc) in docs.iter().enumerate() {
            for tri in trigrams(&doc.content) {
                postings.entry(tri).or_default().push(ordinal as u32);
            }
        }
        Self { docs, postings }
    }

    pub fn docs(&self) -> &[CodeDocument] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Apply upserts and deletes by filename, rebuilding the postings.
    pub fn apply(&mut self, upserts: Vec<CodeDocument>, deletes: &[String]) {
        let mut by_name: BTreeMap<String, CodeDocument> = std::mem::take(&mut self.docs)
            .into_iter()
            .map(|doc| (doc.filename.clone(), doc))
            .collect();
        for doc in upserts {
            by_name.insert(doc.filename.clone(), doc);
        }
        for filename in deletes {
            by_name.remove(filename);
        }
        *self = Self::new(by_name.into_values().collect());
    }

    /// Ordinals of documents that may contain `needle`, ignoring ASCII case.
    ///
    /// `None` when the needle is too short to narrow anything down.
    pub fn candidates(&self, needle: &str) -> Option<Vec<u32>> {
        let grams = trigrams(needle);
        if grams.is_empty() {
            return None;
        }
        let mut lists: Vec<&Vec<u32>> = Vec::with_capacity(grams.len());
        for tri in &grams {
            match self.postings.get(tri) {
                Some(list) => lists.push(list),
                None => return Some(Vec::new()),
            }
        }
        lists.sort_by_key(|list| list.len());
        let mut out = lists[0].clone();
        for list in &lists[1..] {
            out = intersect_sorted(&out, list);
            if out.is_empty() {
                break;
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(filename: &str, content: &str) -> CodeDocument {
        CodeDocument {
            repo_id: 1,
            filename: filename.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_candidates_case_insensitive() {
        let repo = RepoIndex::new(vec![
            doc("b.rs", "fn Parse() {}"),
            doc("a.rs", "fn render() {}"),
        ]);
        assert_eq!(repo.docs()[0].filename, "a.rs");
        assert_eq!(repo.candidates("PARSE"), Some(vec![1]));
        assert_eq!(repo.candidates("fn "), Some(vec![0, 1]));
        assert_eq!(repo.candidates("zzz"), Some(vec![]));
        assert_eq!(repo.candidates("fn"), None);
    }

    #[test]
    fn test_apply_upserts_then_deletes() {
        let mut repo = RepoIndex::new(vec![doc("a.rs", "old"), doc("b.rs", "keep")]);
        repo.apply(vec![doc("a.rs", "new"), doc("c.rs", "added")], &["b.rs".to_string()]);
        let names: Vec<&str> = repo.docs().iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.rs", "c.rs"]);
        assert_eq!(repo.candidates("new"), Some(vec![0]));
        assert_eq!(repo.candidates("old"), Some(vec![]));
    }
}
