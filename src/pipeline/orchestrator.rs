use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::ai::{build_prompt, SummaryGenerator};
use crate::config::Config;
use crate::db::{IdAllocator, SummaryStore};
use crate::error::PipelineError;
use crate::models::{PipelineStage, SortMode, SummaryRecord, SummaryRequest, UserId};

use super::ranker::rank;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bounds for each remote round-trip.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub store_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            generation_timeout: config.request_timeout(),
            ..Self::default()
        }
    }

    fn timeout_for(&self, stage: PipelineStage) -> Duration {
        match stage {
            PipelineStage::Generating => self.generation_timeout,
            _ => self.store_timeout,
        }
    }
}

/// Allocate, generate, persist; and fetch-then-rank for the read path.
pub struct Pipeline {
    allocator: Arc<dyn IdAllocator>,
    generator: Arc<dyn SummaryGenerator>,
    store: Arc<dyn SummaryStore>,
    settings: PipelineSettings,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        allocator: Arc<dyn IdAllocator>,
        generator: Arc<dyn SummaryGenerator>,
        store: Arc<dyn SummaryStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            allocator,
            generator,
            store,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Abort every in-flight and future call on this pipeline.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn request_summary(
        &self,
        request: SummaryRequest,
    ) -> Result<SummaryRecord, PipelineError> {
        let (progress, _) = watch::channel(PipelineStage::Idle);
        self.request_summary_observed(request, &progress).await
    }

    /// Same as [`Pipeline::request_summary`], publishing each stage transition
    /// to `progress`.
    pub async fn request_summary_observed(
        &self,
        request: SummaryRequest,
        progress: &watch::Sender<PipelineStage>,
    ) -> Result<SummaryRecord, PipelineError> {
        let result = self.run_generation(&request, progress).await;

        match &result {
            Ok(record) => {
                tracing::info!(
                    "Saved summary {} of {:?} for {}",
                    record.summary_id,
                    record.book_name,
                    record.user_id
                );
                progress.send_replace(PipelineStage::Complete);
            }
            Err(e) => {
                tracing::warn!("Summary request for {:?} failed: {}", request.book_name, e);
                progress.send_replace(PipelineStage::Failed);
            }
        }

        result
    }

    async fn run_generation(
        &self,
        request: &SummaryRequest,
        progress: &watch::Sender<PipelineStage>,
    ) -> Result<SummaryRecord, PipelineError> {
        // Each stage consumes the previous stage's output; a failure returns
        // before anything is written.
        let summary_id = self
            .guard(PipelineStage::AllocatingId, progress, self.allocator.allocate_next_id())
            .await?;

        let prompt = build_prompt(&request.book_name, &request.length, &request.add_prompt);
        let summary = self
            .guard(PipelineStage::Generating, progress, self.generator.generate(&prompt))
            .await?;

        let record = SummaryRecord::from_generation(summary_id, request, summary, Utc::now());
        self.persist(&record, progress).await?;

        Ok(record)
    }

    /// Save without racing timeout or shutdown: a dropped save may still
    /// commit on the connection thread, so its outcome is always awaited.
    async fn persist(
        &self,
        record: &SummaryRecord,
        progress: &watch::Sender<PipelineStage>,
    ) -> Result<(), PipelineError> {
        tracing::debug!("Pipeline stage: {}", PipelineStage::Persisting);
        progress.send_replace(PipelineStage::Persisting);

        if self.shutdown.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.store.save(record).await
    }

    /// Fetch every record owned by `user_id` and rank it for display.
    pub async fn load_summaries(
        &self,
        user_id: &UserId,
        mode: SortMode,
    ) -> Result<Vec<SummaryRecord>, PipelineError> {
        let (progress, _) = watch::channel(PipelineStage::Idle);
        let records = self
            .guard(PipelineStage::Fetching, &progress, self.store.fetch_by_user(user_id))
            .await?;
        tracing::debug!("Loaded {} summaries for {}", records.len(), user_id);
        Ok(rank(records, mode))
    }

    /// Run one suspension point under its timeout, racing shutdown.
    async fn guard<T>(
        &self,
        stage: PipelineStage,
        progress: &watch::Sender<PipelineStage>,
        call: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        tracing::debug!("Pipeline stage: {}", stage);
        progress.send_replace(stage);

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(PipelineError::Cancelled),
            outcome = tokio::time::timeout(self.settings.timeout_for(stage), call) => {
                outcome.unwrap_or_else(|_| {
                    tracing::warn!("Timed out while {}", stage);
                    Err(PipelineError::TimedOut { stage })
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::models::SummaryLength;

    #[derive(Default)]
    pub(crate) struct FakeAllocator {
        next: AtomicI64,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    #[async_trait]
    impl IdAllocator for FakeAllocator {
        async fn allocate_next_id(&self) -> Result<i64, PipelineError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(PipelineError::AllocationFailed("counter unavailable".into()));
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    pub(crate) struct FakeGenerator {
        pub response: Result<String, PipelineError>,
        pub delay: Option<Duration>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeGenerator {
        pub fn answering(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                delay: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: PipelineError) -> Self {
            Self {
                response: Err(error),
                delay: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SummaryGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub records: Mutex<Vec<SummaryRecord>>,
        pub fetches: AtomicUsize,
        pub fail_save: bool,
        pub fail_fetch: bool,
        /// Time between committing a save and acknowledging it.
        pub save_ack_delay: Option<Duration>,
    }

    impl FakeStore {
        pub fn saved(&self) -> Vec<SummaryRecord> {
            self.records.lock().unwrap().clone()
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SummaryStore for FakeStore {
        async fn save(&self, record: &SummaryRecord) -> Result<(), PipelineError> {
            if self.fail_save {
                return Err(PipelineError::PersistFailed("write rejected".into()));
            }
            self.records.lock().unwrap().push(record.clone());
            if let Some(delay) = self.save_ack_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn fetch_by_user(&self, user_id: &UserId) -> Result<Vec<SummaryRecord>, PipelineError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch {
                return Err(PipelineError::FetchFailed("read rejected".into()));
            }
            let mut records: Vec<SummaryRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| &r.user_id == user_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.timestamp_raw.cmp(&a.timestamp_raw));
            Ok(records)
        }
    }

    pub(crate) fn pipeline(
        allocator: Arc<FakeAllocator>,
        generator: Arc<FakeGenerator>,
        store: Arc<FakeStore>,
    ) -> Pipeline {
        Pipeline::new(allocator, generator, store, PipelineSettings::default())
    }

    fn request(book: &str) -> SummaryRequest {
        SummaryRequest::new(
            UserId::new("reader-1").unwrap(),
            book,
            "mention the author",
            SummaryLength::Short,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn completed_request_returns_and_stores_full_record() {
        let generator = Arc::new(FakeGenerator::answering("A desert planet."));
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline(Arc::default(), generator.clone(), store.clone());
        let (progress, stage) = watch::channel(PipelineStage::Idle);

        let record = pipeline
            .request_summary_observed(request("Dune"), &progress)
            .await
            .unwrap();

        assert_eq!(record.summary_id, 1);
        assert_eq!(record.book_name, "Dune");
        assert_eq!(record.add_prompt, "mention the author");
        assert_eq!(record.length, SummaryLength::Short);
        assert_eq!(record.user_id.as_str(), "reader-1");
        assert_eq!(record.summary, "A desert planet.");
        assert!(!record.timestamp_formatted.is_empty());
        assert_eq!(store.saved(), vec![record]);
        assert_eq!(*stage.borrow(), PipelineStage::Complete);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"Dune\""));
        assert!(prompts[0].contains("mention the author"));
    }

    #[tokio::test]
    async fn allocation_failure_stops_before_generation() {
        let allocator = Arc::new(FakeAllocator {
            fail: true,
            ..FakeAllocator::default()
        });
        let generator = Arc::new(FakeGenerator::answering("unused"));
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline(allocator, generator.clone(), store.clone());
        let (progress, stage) = watch::channel(PipelineStage::Idle);

        let err = pipeline
            .request_summary_observed(request("Dune"), &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::AllocationFailed(_)));
        assert_eq!(generator.calls(), 0);
        assert!(store.saved().is_empty());
        assert_eq!(*stage.borrow(), PipelineStage::Failed);
    }

    #[tokio::test]
    async fn generation_failure_stores_nothing() {
        let generator = Arc::new(FakeGenerator::failing(PipelineError::ResponseParseFailed(
            "missing field `candidates`".into(),
        )));
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline(Arc::default(), generator, store.clone());

        let err = pipeline.request_summary(request("Dune")).await.unwrap_err();

        assert!(matches!(err, PipelineError::ResponseParseFailed(_)));
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn persist_failure_is_reported() {
        let store = Arc::new(FakeStore {
            fail_save: true,
            ..FakeStore::default()
        });
        let pipeline = pipeline(
            Arc::default(),
            Arc::new(FakeGenerator::answering("text")),
            store,
        );

        let err = pipeline.request_summary(request("Dune")).await.unwrap_err();
        assert!(matches!(err, PipelineError::PersistFailed(_)));
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let generator = Arc::new(FakeGenerator {
            delay: Some(Duration::from_secs(5)),
            ..FakeGenerator::answering("late")
        });
        let store = Arc::new(FakeStore::default());
        let settings = PipelineSettings {
            generation_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(Arc::new(FakeAllocator::default()), generator, store.clone(), settings);

        let err = pipeline.request_summary(request("Dune")).await.unwrap_err();

        assert_eq!(
            err,
            PipelineError::TimedOut {
                stage: PipelineStage::Generating
            }
        );
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_requests() {
        let generator = Arc::new(FakeGenerator::answering("text"));
        let pipeline = pipeline(Arc::default(), generator.clone(), Arc::default());
        pipeline.shutdown();

        let err = pipeline.request_summary(request("Dune")).await.unwrap_err();

        assert_eq!(err, PipelineError::Cancelled);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_ids() {
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline(
            Arc::default(),
            Arc::new(FakeGenerator::answering("text")),
            store.clone(),
        );

        let (a, b) = tokio::join!(
            pipeline.request_summary(request("Dune")),
            pipeline.request_summary(request("Emma"))
        );

        assert_ne!(a.unwrap().summary_id, b.unwrap().summary_id);
        assert_eq!(store.saved().len(), 2);
    }

    #[tokio::test]
    async fn load_ranks_fetched_records() {
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline(
            Arc::default(),
            Arc::new(FakeGenerator::answering("text")),
            store.clone(),
        );
        for book in ["zebra", "Apple", "mango"] {
            pipeline.request_summary(request(book)).await.unwrap();
        }

        let user = UserId::new("reader-1").unwrap();
        let by_id = pipeline.load_summaries(&user, SortMode::ById).await.unwrap();
        let by_name = pipeline.load_summaries(&user, SortMode::ByName).await.unwrap();

        let ids: Vec<i64> = by_id.iter().map(|r| r.summary_id).collect();
        let names: Vec<&str> = by_name.iter().map(|r| r.book_name.as_str()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(names, vec!["Apple", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn response_without_candidates_persists_nothing() {
        use crate::ai::GeminiClient;
        use crate::db::Repository;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"usageMetadata": {}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("summaries.db");
        let repository = Arc::new(Repository::new(db_path.to_str().unwrap()).await.unwrap());
        let generator = Arc::new(
            GeminiClient::new("key", "test-model", &server.uri(), Duration::from_secs(5)).unwrap(),
        );
        let pipeline = Pipeline::new(
            repository.clone(),
            generator,
            repository.clone(),
            PipelineSettings::default(),
        );

        let err = pipeline.request_summary(request("Dune")).await.unwrap_err();
        assert!(matches!(err, PipelineError::ResponseParseFailed(_)));

        let stored = repository
            .fetch_by_user(&UserId::new("reader-1").unwrap())
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn load_failure_is_not_an_empty_list() {
        let store = Arc::new(FakeStore {
            fail_fetch: true,
            ..FakeStore::default()
        });
        let pipeline = pipeline(Arc::default(), Arc::new(FakeGenerator::answering("")), store);

        let err = pipeline
            .load_summaries(&UserId::new("reader-1").unwrap(), SortMode::ById)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FetchFailed(_)));
    }

    #[tokio::test]
    async fn slow_allocation_times_out_before_generation() {
        let allocator = Arc::new(FakeAllocator {
            delay: Some(Duration::from_secs(5)),
            ..FakeAllocator::default()
        });
        let generator = Arc::new(FakeGenerator::answering("text"));
        let settings = PipelineSettings {
            store_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(allocator, generator.clone(), Arc::new(FakeStore::default()), settings);

        let err = pipeline.request_summary(request("Dune")).await.unwrap_err();

        assert_eq!(
            err,
            PipelineError::TimedOut {
                stage: PipelineStage::AllocatingId
            }
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let store = Arc::new(FakeStore::default());
        let settings = PipelineSettings {
            store_timeout: Duration::ZERO,
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(
            Arc::new(FakeAllocator::default()),
            Arc::new(FakeGenerator::answering("text")),
            Arc::new(SlowFetchStore(store)),
            settings,
        );

        let err = pipeline
            .load_summaries(&UserId::new("reader-1").unwrap(), SortMode::ById)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::TimedOut {
                stage: PipelineStage::Fetching
            }
        );
    }

    struct SlowFetchStore(Arc<FakeStore>);

    #[async_trait]
    impl SummaryStore for SlowFetchStore {
        async fn save(&self, record: &SummaryRecord) -> Result<(), PipelineError> {
            self.0.save(record).await
        }

        async fn fetch_by_user(&self, user_id: &UserId) -> Result<Vec<SummaryRecord>, PipelineError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.0.fetch_by_user(user_id).await
        }
    }

    #[tokio::test]
    async fn shutdown_interrupts_generation_in_flight() {
        let generator = Arc::new(FakeGenerator {
            delay: Some(Duration::from_secs(5)),
            ..FakeGenerator::answering("late")
        });
        let store = Arc::new(FakeStore::default());
        let pipeline = pipeline(Arc::default(), generator.clone(), store.clone());
        let (progress, stage) = watch::channel(PipelineStage::Idle);

        let (result, _) = tokio::join!(
            pipeline.request_summary_observed(request("Dune"), &progress),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                pipeline.shutdown();
            }
        );

        assert_eq!(result.unwrap_err(), PipelineError::Cancelled);
        assert_eq!(generator.calls(), 1);
        assert!(store.saved().is_empty());
        assert_eq!(*stage.borrow(), PipelineStage::Failed);
    }

    #[tokio::test]
    async fn slow_save_acknowledgement_still_returns_the_stored_record() {
        let store = Arc::new(FakeStore {
            save_ack_delay: Some(Duration::from_millis(200)),
            ..FakeStore::default()
        });
        let settings = PipelineSettings {
            store_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(
            Arc::new(FakeAllocator::default()),
            Arc::new(FakeGenerator::answering("text")),
            store.clone(),
            settings,
        );

        let record = pipeline.request_summary(request("Dune")).await.unwrap();

        assert_eq!(store.saved(), vec![record]);
    }

    #[tokio::test]
    async fn shutdown_during_save_keeps_the_stored_record() {
        let store = Arc::new(FakeStore {
            save_ack_delay: Some(Duration::from_millis(200)),
            ..FakeStore::default()
        });
        let pipeline = pipeline(
            Arc::default(),
            Arc::new(FakeGenerator::answering("text")),
            store.clone(),
        );
        let (progress, mut stage) = watch::channel(PipelineStage::Idle);

        let (result, _) = tokio::join!(
            pipeline.request_summary_observed(request("Dune"), &progress),
            async {
                stage
                    .wait_for(|s| *s == PipelineStage::Persisting)
                    .await
                    .unwrap();
                pipeline.shutdown();
            }
        );

        assert_eq!(store.saved(), vec![result.unwrap()]);
    }

    #[tokio::test]
    async fn persisting_a_row_slower_than_the_store_timeout_succeeds() {
        use crate::db::Repository;

        struct SlowAckRepository(Arc<Repository>);

        #[async_trait]
        impl SummaryStore for SlowAckRepository {
            async fn save(&self, record: &SummaryRecord) -> Result<(), PipelineError> {
                self.0.save(record).await?;
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }

            async fn fetch_by_user(&self, user_id: &UserId) -> Result<Vec<SummaryRecord>, PipelineError> {
                self.0.fetch_by_user(user_id).await
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("summaries.db");
        let repository = Arc::new(Repository::new(db_path.to_str().unwrap()).await.unwrap());
        let settings = PipelineSettings {
            store_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(
            repository.clone(),
            Arc::new(FakeGenerator::answering("A desert planet.")),
            Arc::new(SlowAckRepository(repository.clone())),
            settings,
        );

        let record = tokio_test::assert_ok!(pipeline.request_summary(request("Dune")).await);

        let stored = repository
            .fetch_by_user(&UserId::new("reader-1").unwrap())
            .await
            .unwrap();
        assert_eq!(stored, vec![record]);
    }
}
