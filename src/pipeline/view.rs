use crate::error::PipelineError;
use crate::models::{SortMode, SummaryRecord, UserId};

use super::orchestrator::Pipeline;
use super::ranker::sort_in_place;

/// One view session over a user's saved summaries: fetched once, re-ranked
/// locally whenever the sort mode changes.
pub struct SavedSummaries {
    user_id: UserId,
    mode: SortMode,
    records: Option<Vec<SummaryRecord>>,
}

impl SavedSummaries {
    pub fn new(user_id: UserId, mode: SortMode) -> Self {
        Self {
            user_id,
            mode,
            records: None,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn sort_mode(&self) -> SortMode {
        self.mode
    }

    pub fn is_loaded(&self) -> bool {
        self.records.is_some()
    }

    /// Ranked records; empty until the first successful load.
    pub fn records(&self) -> &[SummaryRecord] {
        self.records.as_deref().unwrap_or_default()
    }

    /// Fetch unless this session already holds a result.
    pub async fn load(&mut self, pipeline: &Pipeline) -> Result<&[SummaryRecord], PipelineError> {
        if self.records.is_none() {
            let records = pipeline.load_summaries(&self.user_id, self.mode).await?;
            self.records = Some(records);
        }
        Ok(self.records())
    }

    /// Start a new session and fetch again.
    pub async fn reload(&mut self, pipeline: &Pipeline) -> Result<&[SummaryRecord], PipelineError> {
        self.records = None;
        self.load(pipeline).await
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.mode = mode;
        if let Some(records) = self.records.as_mut() {
            sort_in_place(records, mode);
        }
    }

    /// Add a record created during this session without re-fetching. A
    /// record already present (e.g. picked up by a reload) is left as is.
    pub fn insert(&mut self, record: SummaryRecord) {
        if record.user_id != self.user_id {
            return;
        }
        if let Some(records) = self.records.as_mut() {
            if records.iter().any(|r| r.summary_id == record.summary_id) {
                return;
            }
            records.push(record);
            sort_in_place(records, self.mode);
        }
    }
}
