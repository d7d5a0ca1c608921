use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const TIMESTAMP_FORMAT: &str = "%d %b %Y, %H:%M";

/// Identity of the signed-in user. Every pipeline call is gated on one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(AppError::NotSignedIn);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested summary length. Labels outside the three known categories are
/// kept as-is and rank after them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
    Other(String),
}

impl SummaryLength {
    pub fn label(&self) -> &str {
        match self {
            Self::Short => "Short",
            Self::Medium => "Medium",
            Self::Long => "Long",
            Self::Other(label) => label,
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Short => 1,
            Self::Medium => 2,
            Self::Long => 3,
            Self::Other(_) => u8::MAX,
        }
    }

    /// Next known category, for the input popup.
    pub fn cycle(&self) -> Self {
        match self {
            Self::Short => Self::Medium,
            Self::Medium => Self::Long,
            Self::Long | Self::Other(_) => Self::Short,
        }
    }
}

impl From<&str> for SummaryLength {
    fn from(label: &str) -> Self {
        let label = label.trim();
        match label.to_ascii_lowercase().as_str() {
            "short" => Self::Short,
            "medium" => Self::Medium,
            "long" => Self::Long,
            _ => Self::Other(label.to_string()),
        }
    }
}

impl From<String> for SummaryLength {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<SummaryLength> for String {
    fn from(length: SummaryLength) -> Self {
        length.label().to_string()
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub summary_id: i64,
    pub book_name: String,
    pub user_id: UserId,
    pub add_prompt: String,
    pub length: SummaryLength,
    pub summary: String,
    pub timestamp_formatted: String,
    pub timestamp_raw: DateTime<Utc>,
}

impl SummaryRecord {
    /// Build the record for a freshly generated summary. The raw timestamp is
    /// kept at millisecond precision, which is what the store persists.
    pub fn from_generation(
        summary_id: i64,
        request: &SummaryRequest,
        summary: String,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let timestamp_raw =
            DateTime::from_timestamp_millis(generated_at.timestamp_millis()).unwrap_or(generated_at);

        Self {
            summary_id,
            book_name: request.book_name.clone(),
            user_id: request.user_id.clone(),
            add_prompt: request.add_prompt.clone(),
            length: request.length.clone(),
            summary,
            timestamp_formatted: format_timestamp(timestamp_raw),
            timestamp_raw,
        }
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Input to one run of the generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub user_id: UserId,
    pub book_name: String,
    pub add_prompt: String,
    pub length: SummaryLength,
}

impl SummaryRequest {
    pub fn new(
        user_id: UserId,
        book_name: impl Into<String>,
        add_prompt: impl Into<String>,
        length: SummaryLength,
    ) -> Result<Self> {
        let book_name = book_name.into().trim().to_string();
        if book_name.is_empty() {
            return Err(AppError::InvalidRequest("book name is empty".to_string()));
        }

        Ok(Self {
            user_id,
            book_name,
            add_prompt: add_prompt.into().trim().to_string(),
            length,
        })
    }
}

/// Where a single generation request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineStage {
    #[default]
    Idle,
    AllocatingId,
    Generating,
    Persisting,
    Fetching,
    Complete,
    Failed,
}

impl PipelineStage {
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::AllocatingId | Self::Generating | Self::Persisting | Self::Fetching
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::AllocatingId => "allocating id",
            Self::Generating => "generating",
            Self::Persisting => "persisting",
            Self::Fetching => "fetching",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    ById,
    ByName,
    ByLength,
    ByDate,
}

impl SortMode {
    pub fn cycle(self) -> Self {
        match self {
            Self::ById => Self::ByName,
            Self::ByName => Self::ByLength,
            Self::ByLength => Self::ByDate,
            Self::ByDate => Self::ById,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ById => "ID",
            Self::ByName => "Name",
            Self::ByLength => "Length",
            Self::ByDate => "Date",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" => Some(Self::ById),
            "name" => Some(Self::ByName),
            "length" => Some(Self::ByLength),
            "date" => Some(Self::ByDate),
            _ => None,
        }
    }
}
