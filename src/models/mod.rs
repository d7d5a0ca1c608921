mod summary;

pub use summary::{PipelineStage, SortMode, SummaryLength, SummaryRecord, SummaryRequest, UserId};
