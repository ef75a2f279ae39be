//! Query translation helpers.
//!
//! `keyword` decides how a keyword is interpreted; `filter` compiles issue
//! filters into a tree that adapters lower to their native query form.

mod filter;
mod keyword;

pub use filter::{issue_filter, Filter, IssueField};
pub use keyword::{fuzziness, quoted_phrase, split_terms, Keyword, MAX_FUZZINESS};
