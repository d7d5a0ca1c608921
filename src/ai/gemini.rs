use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, PipelineError, Result};

use super::SummaryGenerator;

/// Returned in place of a summary when the API answers with an empty body.
pub const EMPTY_BODY_FALLBACK: &str = "No response body";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

pub struct GeminiClient {
    client: Client,
    endpoint: Url,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let endpoint = endpoint_url(base_url, model, api_key)?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model
    }
}

fn endpoint_url(base_url: &str, model: &str, api_key: &str) -> Result<Url> {
    // Url::join drops the last path segment unless the base ends with '/'
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };

    let mut url = Url::parse(&base)
        .and_then(|base| base.join(&format!("v1beta/models/{model}:generateContent")))
        .map_err(|e| AppError::Config(format!("invalid Gemini base URL {base_url:?}: {e}")))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

#[async_trait]
impl SummaryGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, PipelineError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        // without_url keeps the API key out of error messages and logs
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                tracing::error!("Gemini request failed: {}", e);
                PipelineError::RequestFailed(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            let e = e.without_url();
            tracing::error!("Failed to read Gemini response body: {}", e);
            PipelineError::RequestFailed(e.to_string())
        })?;

        tracing::debug!("Gemini responded {} with {} bytes", status, body.len());

        if !status.is_success() {
            tracing::error!("Gemini API error {}: {}", status, body);
            return Err(PipelineError::RequestFailed(format!(
                "API error ({status}): {body}"
            )));
        }

        parse_response(&body)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
fn parse_response(body: &str) -> std::result::Result<String, PipelineError> {
    if body.trim().is_empty() {
        return Ok(EMPTY_BODY_FALLBACK.to_string());
    }

    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        tracing::error!("Error parsing Gemini response: {}", e);
        PipelineError::ResponseParseFailed(e.to_string())
    })?;

    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or_else(|| {
            tracing::error!("Gemini response has no candidate text");
            PipelineError::ResponseParseFailed("no candidate text in response".to_string())
        })
}
