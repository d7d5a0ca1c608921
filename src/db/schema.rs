pub const SCHEMA: &str = r#"
-- summaries table (rows are immutable once written)
CREATE TABLE IF NOT EXISTS summaries (
    summary_id INTEGER PRIMARY KEY,
    book_name TEXT NOT NULL,
    user_id TEXT NOT NULL,
    add_prompt TEXT NOT NULL DEFAULT '',
    length TEXT NOT NULL,
    summary TEXT NOT NULL,
    timestamp_formatted TEXT NOT NULL,
    timestamp_raw INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_summaries_user_time ON summaries(user_id, timestamp_raw DESC);

-- counters table (one row per named counter, written only by the allocator)
CREATE TABLE IF NOT EXISTS counters (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);
"#;
