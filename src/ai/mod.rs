mod gemini;
mod prompt;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use gemini::GeminiClient;
pub use prompt::build_prompt;

/// Turns a prompt into generated summary text.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}
