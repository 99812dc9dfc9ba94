use std::cmp::Ordering;

use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorBorrowed};
use tracing::warn;

use crate::domain::{FileRecord, Rank, SortConfig, SortDirection, SortKey};

/// Rows in display order, as indices into `records`: sorted by `sort`, then
/// reduced to the ones matching `filter`. The records themselves are left
/// untouched.
pub fn displayed_indices(records: &[FileRecord], sort: SortConfig, filter: Option<Rank>) -> Vec<usize> {
    let mut rows = sorted_indices(records, sort);
    rows.retain(|&idx| matches_filter(&records[idx], filter));
    rows
}

fn sorted_indices(records: &[FileRecord], sort: SortConfig) -> Vec<usize> {
    let collator = Collator::try_new(Default::default(), CollatorOptions::default())
        .inspect_err(|e| warn!("No collation data, comparing case folded text: {e}"))
        .ok();
    let mut rows: Vec<usize> = (0..records.len()).collect();
    // Stable sort, equal rows keep the order the server sent them in.
    rows.sort_by(|&a, &b| {
        let ordering = compare(collator.as_ref(), &records[a], &records[b], sort.key);
        match sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    rows
}

pub fn matches_filter(record: &FileRecord, filter: Option<Rank>) -> bool {
    match filter {
        None => true,
        Some(rank) => record.rank == Some(rank),
    }
}

fn compare(
    collator: Option<&CollatorBorrowed<'_>>,
    a: &FileRecord,
    b: &FileRecord,
    key: SortKey,
) -> Ordering {
    match key {
        SortKey::Name => locale_cmp(collator, &a.name, &b.name),
        SortKey::Position => locale_cmp(collator, a.position.as_str(), b.position.as_str()),
        // Unranked counts as 0
        SortKey::Rank => rank_value(a).cmp(&rank_value(b)),
        // Unparseable dates (None) sort before every real date
        SortKey::SubmissionDate => a.submission_date.parsed.cmp(&b.submission_date.parsed),
    }
}

fn rank_value(record: &FileRecord) -> u8 {
    record.rank.map(Rank::get).unwrap_or(0)
}

/// Root locale collation, so accents sort next to their base letter and
/// lowercase comes before uppercase. Strings the collator considers equal
/// fall back to their raw order.
fn locale_cmp(collator: Option<&CollatorBorrowed<'_>>, a: &str, b: &str) -> Ordering {
    let ordering = match collator {
        Some(collator) => collator.compare(a, b),
        None => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
    };
    ordering.then_with(|| a.cmp(b))
}
