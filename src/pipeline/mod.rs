mod orchestrator;
mod ranker;
mod view;

pub use orchestrator::{Pipeline, PipelineSettings};
pub use view::SavedSummaries;
