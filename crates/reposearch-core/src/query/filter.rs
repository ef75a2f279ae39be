//! Backend-neutral issue filters.
//!
//! `IssueSearchOptions` compiles once into a [`Filter`] tree. Each adapter
//! lowers the tree into its own query language, so every backend applies
//! the same conditions.

use reposearch_types::{IssueDocument, IssueSearchOptions};

/// Filterable issue fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueField {
    RepoId,
    IsPublic,
    IsPull,
    IsClosed,
    LabelIds,
    NoLabel,
    MilestoneId,
    ProjectId,
    ProjectColumnId,
    PosterId,
    AssigneeId,
    MentionIds,
    ReviewedIds,
    ReviewRequestedIds,
    SubscriberIds,
    UpdatedUnix,
}

impl IssueField {
    /// Field name in stored documents.
    pub fn name(&self) -> &'static str {
        match self {
            IssueField::RepoId => "repo_id",
            IssueField::IsPublic => "is_public",
            IssueField::IsPull => "is_pull",
            IssueField::IsClosed => "is_closed",
            IssueField::LabelIds => "label_ids",
            IssueField::NoLabel => "no_label",
            IssueField::MilestoneId => "milestone_id",
            IssueField::ProjectId => "project_id",
            IssueField::ProjectColumnId => "project_column_id",
            IssueField::PosterId => "poster_id",
            IssueField::AssigneeId => "assignee_id",
            IssueField::MentionIds => "mention_ids",
            IssueField::ReviewedIds => "reviewed_ids",
            IssueField::ReviewRequestedIds => "review_requested_ids",
            IssueField::SubscriberIds => "subscriber_ids",
            IssueField::UpdatedUnix => "updated_unix",
        }
    }

    /// True for fields holding a list of ids; equality means membership.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            IssueField::LabelIds
                | IssueField::MentionIds
                | IssueField::ReviewedIds
                | IssueField::ReviewRequestedIds
                | IssueField::SubscriberIds
        )
    }

    /// Integer values of this field on a document.
    pub fn values<'a>(&self, doc: &'a IssueDocument) -> std::borrow::Cow<'a, [i64]> {
        use std::borrow::Cow;
        match self {
            IssueField::RepoId => Cow::Owned(vec![doc.repo_id]),
            IssueField::LabelIds => Cow::Borrowed(&doc.label_ids),
            IssueField::MilestoneId => Cow::Owned(vec![doc.milestone_id]),
            IssueField::ProjectId => Cow::Owned(vec![doc.project_id]),
            IssueField::ProjectColumnId => Cow::Owned(vec![doc.project_column_id]),
            IssueField::PosterId => Cow::Owned(vec![doc.poster_id]),
            IssueField::AssigneeId => Cow::Owned(vec![doc.assignee_id]),
            IssueField::MentionIds => Cow::Borrowed(&doc.mention_ids),
            IssueField::ReviewedIds => Cow::Borrowed(&doc.reviewed_ids),
            IssueField::ReviewRequestedIds => Cow::Borrowed(&doc.review_requested_ids),
            IssueField::SubscriberIds => Cow::Borrowed(&doc.subscriber_ids),
            IssueField::UpdatedUnix => Cow::Owned(vec![doc.updated_unix]),
            IssueField::IsPublic => Cow::Owned(vec![doc.is_public as i64]),
            IssueField::IsPull => Cow::Owned(vec![doc.is_pull as i64]),
            IssueField::IsClosed => Cow::Owned(vec![doc.is_closed as i64]),
            IssueField::NoLabel => Cow::Owned(vec![doc.no_label as i64]),
        }
    }
}

/// A condition over issue fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Field equals (or, for lists, contains) the value
    Eq(IssueField, i64),
    /// Boolean field equals the value
    Bool(IssueField, bool),
    /// Field equals (or contains) any of the values
    In(IssueField, Vec<i64>),
    /// Inclusive range; open ends are `None`
    Range {
        field: IssueField,
        gte: Option<i64>,
        lte: Option<i64>,
    },
    /// All conditions hold; an empty list always holds
    And(Vec<Filter>),
    /// Any condition holds
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::And(children) if children.is_empty())
    }

    /// Evaluate against a document held in memory.
    pub fn matches(&self, doc: &IssueDocument) -> bool {
        match self {
            Filter::Eq(field, value) => field.values(doc).contains(value),
            Filter::Bool(field, value) => field.values(doc).contains(&(*value as i64)),
            Filter::In(field, values) => {
                let have = field.values(doc);
                values.iter().any(|v| have.contains(v))
            }
            Filter::Range { field, gte, lte } => field.values(doc).iter().any(|v| {
                gte.map_or(true, |lo| *v >= lo) && lte.map_or(true, |hi| *v <= hi)
            }),
            Filter::And(children) => children.iter().all(|c| c.matches(doc)),
            Filter::Or(children) => children.iter().any(|c| c.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }
}

fn eq_filter(out: &mut Vec<Filter>, field: IssueField, value: Option<i64>) {
    if let Some(value) = value {
        out.push(Filter::Eq(field, value));
    }
}

/// Compile the filter part of an issue search.
///
/// Returns `Filter::And(vec![])` when nothing restricts the search.
pub fn issue_filter(opts: &IssueSearchOptions) -> Filter {
    let mut filters = Vec::new();

    match (opts.repo_ids.is_empty(), opts.all_public) {
        (false, true) => filters.push(Filter::Or(vec![
            Filter::In(IssueField::RepoId, opts.repo_ids.clone()),
            Filter::Bool(IssueField::IsPublic, true),
        ])),
        (false, false) => filters.push(Filter::In(IssueField::RepoId, opts.repo_ids.clone())),
        (true, true) => filters.push(Filter::Bool(IssueField::IsPublic, true)),
        (true, false) => {}
    }

    if let Some(is_pull) = opts.is_pull {
        filters.push(Filter::Bool(IssueField::IsPull, is_pull));
    }
    if let Some(is_closed) = opts.is_closed {
        filters.push(Filter::Bool(IssueField::IsClosed, is_closed));
    }

    if opts.no_label_only {
        filters.push(Filter::Bool(IssueField::NoLabel, true));
    } else {
        if !opts.included_label_ids.is_empty() {
            filters.push(Filter::And(
                opts.included_label_ids
                    .iter()
                    .map(|id| Filter::Eq(IssueField::LabelIds, *id))
                    .collect(),
            ));
        } else if !opts.included_any_label_ids.is_empty() {
            filters.push(Filter::In(
                IssueField::LabelIds,
                opts.included_any_label_ids.clone(),
            ));
        }
        for id in &opts.excluded_label_ids {
            filters.push(Filter::Not(Box::new(Filter::Eq(IssueField::LabelIds, *id))));
        }
    }

    match opts.milestone_ids.as_slice() {
        [] => {}
        [single] => filters.push(Filter::Eq(IssueField::MilestoneId, *single)),
        many => filters.push(Filter::In(IssueField::MilestoneId, many.to_vec())),
    }

    eq_filter(&mut filters, IssueField::ProjectId, opts.project_id);
    eq_filter(&mut filters, IssueField::ProjectColumnId, opts.project_column_id);
    eq_filter(&mut filters, IssueField::PosterId, opts.poster_id);
    eq_filter(&mut filters, IssueField::AssigneeId, opts.assignee_id);
    eq_filter(&mut filters, IssueField::MentionIds, opts.mention_id);
    eq_filter(&mut filters, IssueField::ReviewedIds, opts.reviewed_id);
    eq_filter(&mut filters, IssueField::ReviewRequestedIds, opts.review_requested_id);
    eq_filter(&mut filters, IssueField::SubscriberIds, opts.subscriber_id);

    if opts.updated_after_unix.is_some() || opts.updated_before_unix.is_some() {
        filters.push(Filter::Range {
            field: IssueField::UpdatedUnix,
            gte: opts.updated_after_unix,
            lte: opts.updated_before_unix,
        });
    }

    Filter::And(filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn issue(id: i64) -> IssueDocument {
        IssueDocument {
            id,
            repo_id: id % 3 + 1,
            is_public: id % 2 == 0,
            label_ids: vec![id % 4, id % 5],
            milestone_id: id % 2,
            updated_unix: 1000 + id,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_options_match_all() {
        let filter = issue_filter(&IssueSearchOptions::default());
        assert!(filter.is_match_all());
        assert!(filter.matches(&issue(1)));
    }

    #[test]
    fn test_repo_scope() {
        let opts = IssueSearchOptions {
            repo_ids: vec![1],
            all_public: true,
            ..Default::default()
        };
        let filter = issue_filter(&opts);
        assert_eq!(
            filter,
            Filter::And(vec![Filter::Or(vec![
                Filter::In(IssueField::RepoId, vec![1]),
                Filter::Bool(IssueField::IsPublic, true),
            ])])
        );
        // repo 1 (id 3) or public (id 4)
        assert!(filter.matches(&issue(3)));
        assert!(filter.matches(&issue(4)));
        assert!(!filter.matches(&issue(1)));
    }

    #[test]
    fn test_labels_include_all_any_and_exclude() {
        let doc = IssueDocument {
            label_ids: vec![1, 2],
            ..Default::default()
        };

        let all = IssueSearchOptions {
            included_label_ids: vec![1, 2],
            ..Default::default()
        };
        assert!(issue_filter(&all).matches(&doc));

        let all_missing = IssueSearchOptions {
            included_label_ids: vec![1, 3],
            ..Default::default()
        };
        assert!(!issue_filter(&all_missing).matches(&doc));

        let any = IssueSearchOptions {
            included_any_label_ids: vec![3, 2],
            ..Default::default()
        };
        assert!(issue_filter(&any).matches(&doc));

        let excluded = IssueSearchOptions {
            excluded_label_ids: vec![2],
            ..Default::default()
        };
        assert!(!issue_filter(&excluded).matches(&doc));
    }

    #[test]
    fn test_no_label_short_circuits_label_lists() {
        let opts = IssueSearchOptions {
            no_label_only: true,
            included_label_ids: vec![1],
            ..Default::default()
        };
        assert_eq!(
            issue_filter(&opts),
            Filter::And(vec![Filter::Bool(IssueField::NoLabel, true)])
        );
    }

    #[test]
    fn test_milestone_none_and_range() {
        let opts = IssueSearchOptions {
            milestone_ids: vec![0],
            updated_after_unix: Some(1002),
            updated_before_unix: Some(1004),
            ..Default::default()
        };
        let filter = issue_filter(&opts);
        let matched: Vec<i64> = (0..8)
            .map(issue)
            .filter(|d| filter.matches(d))
            .map(|d| d.id)
            .collect();
        assert_eq!(matched, vec![2, 4]);
    }

    #[test]
    fn test_membership_fields() {
        let doc = IssueDocument {
            mention_ids: vec![7],
            subscriber_ids: vec![8, 9],
            ..Default::default()
        };
        let opts = IssueSearchOptions {
            mention_id: Some(7),
            subscriber_id: Some(9),
            ..Default::default()
        };
        assert!(issue_filter(&opts).matches(&doc));

        let opts = IssueSearchOptions {
            reviewed_id: Some(7),
            ..Default::default()
        };
        assert!(!issue_filter(&opts).matches(&doc));
    }
}
