use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::ai::GeminiClient;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, PipelineError, Result};
use crate::models::{PipelineStage, SortMode, SummaryLength, SummaryRecord, SummaryRequest, UserId};
use crate::pipeline::{Pipeline, PipelineSettings, SavedSummaries};
use crate::tui::AppAction;

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

/// Wire the SQLite repository and the Gemini client into a pipeline.
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let repository = Arc::new(Repository::new(&config.db_path).await?);
    let generator = Arc::new(GeminiClient::new(
        config.gemini_api_key.as_deref().unwrap_or_default(),
        &config.gemini_model,
        &config.gemini_base_url,
        config.request_timeout(),
    )?);
    tracing::debug!("Using Gemini model {}", generator.model_version());

    Ok(Pipeline::new(
        repository.clone(),
        generator,
        repository,
        PipelineSettings::from_config(config),
    ))
}

/// Resolve the signed-in user from the command line or the config file.
pub fn resolve_user(config: &Config, user_override: Option<&str>) -> Result<UserId> {
    match user_override.or(config.user_id.as_deref()) {
        Some(id) => UserId::new(id),
        None => Err(AppError::NotSignedIn),
    }
}

// Message for a finished generation request
pub struct SummaryResult {
    pub result: std::result::Result<SummaryRecord, PipelineError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputField {
    #[default]
    Book,
    Prompt,
}

pub struct App {
    // Data
    pub saved: Option<SavedSummaries>,

    // UI State
    pub selected_index: usize,
    pub show_help: bool,
    pub input_active: bool,
    pub input_field: InputField,
    pub book_input: String,
    pub prompt_input: String,
    pub input_length: SummaryLength,
    pub status_message: Option<String>,
    spinner_index: usize,

    // Async state
    pub stage: PipelineStage,
    stage_rx: Option<watch::Receiver<PipelineStage>>,
    summary_rx: mpsc::Receiver<SummaryResult>,
    summary_tx: mpsc::Sender<SummaryResult>,

    // Services
    pipeline: Arc<Pipeline>,
    pub has_api_key: bool,
    default_length: SummaryLength,
}

impl App {
    pub async fn new(config: &Config, user_override: Option<&str>) -> Result<Self> {
        let pipeline = Arc::new(build_pipeline(config).await?);

        let saved = match resolve_user(config, user_override) {
            Ok(user_id) => Some(SavedSummaries::new(user_id, SortMode::default())),
            Err(_) => None,
        };

        let (summary_tx, summary_rx) = mpsc::channel(1);

        let mut app = Self {
            saved,
            selected_index: 0,
            show_help: false,
            input_active: false,
            input_field: InputField::Book,
            book_input: String::new(),
            prompt_input: String::new(),
            input_length: config.default_length.clone(),
            status_message: None,
            spinner_index: 0,
            stage: PipelineStage::Idle,
            stage_rx: None,
            summary_rx,
            summary_tx,
            pipeline,
            has_api_key: config.gemini_api_key.is_some(),
            default_length: config.default_length.clone(),
        };

        app.load_summaries(false).await;

        Ok(app)
    }

    pub fn summaries(&self) -> &[SummaryRecord] {
        self.saved.as_ref().map(|s| s.records()).unwrap_or_default()
    }

    pub fn selected_summary(&self) -> Option<&SummaryRecord> {
        self.summaries().get(self.selected_index)
    }

    pub fn sort_mode(&self) -> SortMode {
        self.saved
            .as_ref()
            .map(|s| s.sort_mode())
            .unwrap_or_default()
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.spinner_index % SPINNER_FRAMES.len()]
    }

    pub fn tick_spinner(&mut self) {
        if self.stage.is_busy() {
            self.spinner_index = self.spinner_index.wrapping_add(1);
        }
    }

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => {
                self.pipeline.shutdown();
                return Ok(true);
            }

            AppAction::MoveUp => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }

            AppAction::MoveDown => {
                let len = self.summaries().len();
                if len > 0 && self.selected_index < len - 1 {
                    self.selected_index += 1;
                }
            }

            AppAction::MoveToTop => {
                self.selected_index = 0;
            }

            AppAction::MoveToBottom => {
                self.selected_index = self.summaries().len().saturating_sub(1);
            }

            AppAction::CycleSort => {
                if let Some(saved) = self.saved.as_mut() {
                    let selected_id = saved.records().get(self.selected_index).map(|r| r.summary_id);
                    saved.set_sort_mode(saved.sort_mode().cycle());
                    self.select_summary(selected_id);
                }
            }

            AppAction::Reload => {
                self.load_summaries(true).await;
            }

            AppAction::NewSummary => {
                if self.saved.is_none() {
                    self.status_message = Some(AppError::NotSignedIn.to_string());
                } else if !self.has_api_key {
                    self.status_message = Some("Gemini API key not configured".to_string());
                } else if !self.stage.is_busy() {
                    self.input_active = true;
                    self.input_field = InputField::Book;
                    self.book_input.clear();
                    self.prompt_input.clear();
                    self.input_length = self.default_length.clone();
                }
            }

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }

            AppAction::InputChar(c) => {
                self.active_input().push(c);
            }

            AppAction::InputBackspace => {
                self.active_input().pop();
            }

            AppAction::InputNextField => {
                self.input_field = match self.input_field {
                    InputField::Book => InputField::Prompt,
                    InputField::Prompt => InputField::Book,
                };
            }

            AppAction::InputCycleLength => {
                self.input_length = self.input_length.cycle();
            }

            AppAction::InputConfirm => {
                self.submit_request();
            }

            AppAction::InputCancel => {
                self.input_active = false;
            }
        }

        Ok(false)
    }

    fn active_input(&mut self) -> &mut String {
        match self.input_field {
            InputField::Book => &mut self.book_input,
            InputField::Prompt => &mut self.prompt_input,
        }
    }

    fn select_summary(&mut self, summary_id: Option<i64>) {
        self.selected_index = summary_id
            .and_then(|id| self.summaries().iter().position(|r| r.summary_id == id))
            .unwrap_or(0);
    }

    async fn load_summaries(&mut self, force: bool) {
        let Some(saved) = self.saved.as_mut() else {
            return;
        };

        // A running generation owns the stage display
        let generating = self.stage_rx.is_some();
        if !generating {
            self.stage = PipelineStage::Fetching;
        }
        let result = if force {
            saved.reload(&self.pipeline).await.map(|records| records.len())
        } else {
            saved.load(&self.pipeline).await.map(|records| records.len())
        };

        match result {
            Ok(count) => {
                if !generating {
                    self.stage = PipelineStage::Idle;
                    self.status_message = None;
                }
                if self.selected_index >= count {
                    self.selected_index = count.saturating_sub(1);
                }
            }
            Err(e) => {
                tracing::error!("Failed to load summaries: {}", e);
                if !generating {
                    self.stage = PipelineStage::Failed;
                }
                self.status_message = Some(e.to_string());
            }
        }
    }

    fn submit_request(&mut self) {
        let Some(saved) = self.saved.as_ref() else {
            return;
        };

        let request = match SummaryRequest::new(
            saved.user_id().clone(),
            self.book_input.clone(),
            self.prompt_input.clone(),
            self.input_length.clone(),
        ) {
            Ok(request) => request,
            Err(e) => {
                // Keep the popup open so the book name can be fixed
                self.status_message = Some(e.to_string());
                return;
            }
        };

        self.input_active = false;
        self.status_message = None;
        self.stage = PipelineStage::AllocatingId;

        // Spawn background task for the generation pipeline
        let pipeline = Arc::clone(&self.pipeline);
        let tx = self.summary_tx.clone();
        let (progress, stage_rx) = watch::channel(PipelineStage::Idle);
        self.stage_rx = Some(stage_rx);

        tokio::spawn(async move {
            let result = pipeline.request_summary_observed(request, &progress).await;
            let _ = tx.send(SummaryResult { result }).await;
        });
    }

    /// Poll for completed summary results (non-blocking)
    pub fn poll_summary_result(&mut self) {
        if let Some(stage_rx) = self.stage_rx.as_ref() {
            self.stage = *stage_rx.borrow();
        }

        let Ok(message) = self.summary_rx.try_recv() else {
            return;
        };
        self.stage_rx = None;

        match message.result {
            Ok(record) => {
                self.stage = PipelineStage::Complete;
                self.status_message = Some(format!(
                    "Saved summary #{} of {}",
                    record.summary_id, record.book_name
                ));
                let summary_id = record.summary_id;
                if let Some(saved) = self.saved.as_mut() {
                    saved.insert(record);
                }
                self.select_summary(Some(summary_id));
            }
            Err(e) => {
                tracing::error!("Failed to generate summary: {}", e);
                self.stage = PipelineStage::Failed;
                self.status_message = Some(e.to_string());
            }
        }
    }
}
