use crate::models::{SortMode, SummaryRecord};

/// Order `records` for display. Every mode uses a stable sort, so records
/// with equal keys keep their incoming relative order.
pub fn rank(mut records: Vec<SummaryRecord>, mode: SortMode) -> Vec<SummaryRecord> {
    sort_in_place(&mut records, mode);
    records
}

pub fn sort_in_place(records: &mut [SummaryRecord], mode: SortMode) {
    match mode {
        SortMode::ById => records.sort_by_key(|r| r.summary_id),
        SortMode::ByName => records.sort_by_cached_key(|r| r.book_name.to_lowercase()),
        SortMode::ByLength => records.sort_by_key(|r| r.length.ordinal()),
        SortMode::ByDate => records.sort_by(|a, b| b.timestamp_raw.cmp(&a.timestamp_raw)),
    }
}
