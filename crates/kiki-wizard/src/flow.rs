//! Query-then-source wizard.
//!
//! One [`WizardFlow`] runs one flow instance. The stage machine only moves
//! when input passes validation; a rejected input publishes
//! [`DomainEvent::ValidationFailed`] and leaves everything as it was. The
//! flow never renders anything itself: every change is published on the
//! event bus for whoever draws the UI.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kiki_client::{Backend, ClientError};
use kiki_core::config::KikiConfig;
use kiki_core::error::{KikiError, Result, ValidationError};
use kiki_core::events::{DomainEvent, EventBus};
use kiki_core::markup::{render_answer, SanitizePolicy};
use kiki_core::status::with_rotating_status;
use kiki_core::types::{Activity, FlowKind, RequestOutcome, StageMarker, Timestamp, WizardStage};
use tracing::{debug, info, warn};

use crate::source::SourceStrategy;
use crate::state::StageMachine;

/// Shown in place of the answer when the server could not be reached.
pub const CONNECTION_FAILURE_TEXT: &str =
    "Failed to connect to the server. Please make sure the backend is running.";

/// What the result stage ended up showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardResult {
    /// Answer converted to an HTML fragment.
    Answer { question: String, html: String },
    /// Error text shown instead of an answer.
    Failed { message: String },
}

impl WizardResult {
    pub fn is_answer(&self) -> bool {
        matches!(self, WizardResult::Answer { .. })
    }
}

#[derive(Debug)]
struct Inner<T> {
    query: Option<String>,
    source: Option<T>,
    result: Option<WizardResult>,
    pending: bool,
    /// Bumped by `reset` so a submission finishing afterwards is discarded.
    generation: u64,
}

impl<T> Default for Inner<T> {
    fn default() -> Self {
        Self {
            query: None,
            source: None,
            result: None,
            pending: false,
            generation: 0,
        }
    }
}

/// Frees the pending slot even if the submitting future is dropped.
struct PendingGuard<'a, T> {
    inner: &'a Mutex<Inner<T>>,
    generation: u64,
}

impl<T> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.generation == self.generation {
            inner.pending = false;
        }
    }
}

/// A three-stage wizard parametrised by how its source is collected.
pub struct WizardFlow<S: SourceStrategy> {
    strategy: S,
    backend: Arc<dyn Backend>,
    events: EventBus,
    machine: StageMachine,
    status_interval: Duration,
    sanitize: SanitizePolicy,
    inner: Mutex<Inner<S::Source>>,
}

impl<S: SourceStrategy> std::fmt::Debug for WizardFlow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardFlow")
            .field("kind", &self.strategy.kind())
            .field("stage", &self.machine.current())
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S: SourceStrategy> WizardFlow<S> {
    pub fn new(
        strategy: S,
        backend: Arc<dyn Backend>,
        events: EventBus,
        config: &KikiConfig,
    ) -> Self {
        Self {
            strategy,
            backend,
            events,
            machine: StageMachine::new(),
            status_interval: Duration::from_millis(config.wizard.status_interval_ms),
            sanitize: config.render.sanitize,
            inner: Mutex::new(Inner::default()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind(&self) -> FlowKind {
        self.strategy.kind()
    }

    pub fn stage(&self) -> WizardStage {
        self.machine.current()
    }

    pub fn progress(&self) -> [StageMarker; 3] {
        self.machine.progress()
    }

    pub fn query(&self) -> Option<String> {
        self.lock().query.clone()
    }

    pub fn source(&self) -> Option<S::Source> {
        self.lock().source.clone()
    }

    pub fn result(&self) -> Option<WizardResult> {
        self.lock().result.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Whether the submit control should be enabled.
    pub fn can_submit(&self) -> bool {
        let inner = self.lock();
        !inner.pending && inner.source.is_some() && self.stage() == WizardStage::AwaitingSource
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Accept the question and move on to source collection.
    pub fn advance(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Err(self.reject(ValidationError::EmptyQuery));
        }

        let from = {
            let mut inner = self.lock();
            let from = self.machine.transition(WizardStage::AwaitingSource)?;
            inner.query = Some(query.to_string());
            from
        };
        info!(flow = %self.kind(), "Query accepted");
        self.publish_stage(from, WizardStage::AwaitingSource);
        Ok(())
    }

    /// Step back to query entry. The stored query and source are kept.
    pub fn retreat(&self) -> Result<()> {
        let from = {
            let inner = self.lock();
            if inner.pending {
                return Err(KikiError::Busy("wizard"));
            }
            self.machine.transition(WizardStage::AwaitingQuery)?
        };
        self.publish_stage(from, WizardStage::AwaitingQuery);
        Ok(())
    }

    /// Validate and store a source. A rejected source leaves the previous
    /// one (if any) in place.
    pub fn select_source(&self, source: S::Source) -> Result<()> {
        self.require_stage(WizardStage::AwaitingSource)?;
        let source = self.strategy.validate(source).map_err(|e| self.reject(e))?;
        let description = self.strategy.describe(&source);
        self.lock().source = Some(source);

        debug!(flow = %self.kind(), source = %description, "Source selected");
        self.publish(DomainEvent::WizardSourceSelected {
            flow: self.kind(),
            description,
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Discard the stored source.
    pub fn remove_source(&self) -> Result<()> {
        self.require_stage(WizardStage::AwaitingSource)?;
        self.lock().source = None;
        self.publish(DomainEvent::WizardSourceRemoved {
            flow: self.kind(),
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Store `source` and submit in one step.
    pub async fn submit_source(&self, source: S::Source) -> Result<WizardResult> {
        self.select_source(source)?;
        self.submit().await
    }

    /// Fetch the answer for the stored query and source.
    ///
    /// Backend failures are not errors here: they end in
    /// [`WizardResult::Failed`] on the result stage. `Err` means nothing was
    /// sent (validation, wrong stage, or a submission already pending).
    pub async fn submit(&self) -> Result<WizardResult> {
        let (question, source, generation) = {
            let mut inner = self.lock();
            if inner.pending {
                return Err(KikiError::Busy("wizard"));
            }
            self.require_stage(WizardStage::AwaitingSource)?;

            let question = inner.query.clone().filter(|q| !q.trim().is_empty());
            let (question, source) = match (question, inner.source.clone()) {
                (Some(q), Some(s)) => (q, s),
                _ => {
                    drop(inner);
                    return Err(self.reject(ValidationError::MissingSource {
                        what: self.strategy.noun(),
                    }));
                }
            };

            self.machine.transition(WizardStage::ShowingResult)?;
            inner.pending = true;
            inner.result = None;
            (question, source, inner.generation)
        };

        let flow = self.kind();
        let activity = Activity::Wizard { flow };
        self.publish_stage(WizardStage::AwaitingSource, WizardStage::ShowingResult);
        self.publish(DomainEvent::RequestStarted {
            activity,
            timestamp: Timestamp::now(),
        });

        let _guard = PendingGuard {
            inner: &self.inner,
            generation,
        };
        let status = [self.strategy.analyzing_text().to_string()];
        let outcome = with_rotating_status(
            self.strategy
                .fetch_answer(self.backend.as_ref(), &question, &source),
            &status,
            self.status_interval,
            |text| {
                self.publish(DomainEvent::StatusText {
                    activity,
                    text: text.to_string(),
                    timestamp: Timestamp::now(),
                })
            },
        )
        .await;

        let (result, request_outcome) = match outcome {
            Ok(answer) => (
                WizardResult::Answer {
                    question: question.clone(),
                    html: render_answer(&answer, self.sanitize),
                },
                RequestOutcome::Success,
            ),
            Err(ClientError::Reported(error)) => {
                info!(%flow, %error, "Backend reported failure");
                (
                    WizardResult::Failed {
                        message: format!("Error: {}", error),
                    },
                    RequestOutcome::ReportedError,
                )
            }
            Err(ClientError::Transport(error)) => {
                warn!(%flow, %error, "Backend unreachable");
                (
                    WizardResult::Failed {
                        message: format!("Error: {}", CONNECTION_FAILURE_TEXT),
                    },
                    RequestOutcome::TransportError,
                )
            }
        };

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!(%flow, "Discarding result of a submission made before reset");
                return Ok(result);
            }
            inner.pending = false;
            inner.result = Some(result.clone());
        }

        let timestamp = Timestamp::now();
        match &result {
            WizardResult::Answer { question, html } => {
                self.publish(DomainEvent::WizardAnswerRendered {
                    flow,
                    question: question.clone(),
                    html: html.clone(),
                    timestamp,
                })
            }
            WizardResult::Failed { message } => self.publish(DomainEvent::WizardFailed {
                flow,
                message: message.clone(),
                timestamp,
            }),
        }
        self.publish(DomainEvent::RequestFinished {
            activity,
            outcome: request_outcome,
            timestamp,
        });
        Ok(result)
    }

    /// Start over: first stage, no markers, no stored query, source or result.
    pub fn reset(&self) {
        let from = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.pending = false;
            inner.query = None;
            inner.source = None;
            inner.result = None;
            self.machine.reset()
        };
        info!(flow = %self.kind(), "Wizard reset");
        self.publish(DomainEvent::WizardReset {
            flow: self.kind(),
            timestamp: Timestamp::now(),
        });
        self.publish_stage(from, WizardStage::AwaitingQuery);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner<S::Source>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_stage(&self, expected: WizardStage) -> Result<()> {
        let current = self.machine.current();
        if current == expected {
            Ok(())
        } else {
            Err(KikiError::InvalidTransition {
                from: current.to_string(),
                to: expected.to_string(),
            })
        }
    }

    fn reject(&self, err: ValidationError) -> KikiError {
        debug!(flow = %self.kind(), reason = %err, "Input rejected");
        self.publish(DomainEvent::ValidationFailed {
            scope: self.kind().to_string(),
            message: err.to_string(),
            timestamp: Timestamp::now(),
        });
        KikiError::Validation(err)
    }

    fn publish_stage(&self, from: WizardStage, to: WizardStage) {
        self.publish(DomainEvent::WizardStageChanged {
            flow: self.kind(),
            from,
            to,
            progress: to.progress(),
            timestamp: Timestamp::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        self.events.publish(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileSource, UrlSource};
    use kiki_client::mock::MockBackend;
    use kiki_core::types::UploadFile;

    fn file_flow(backend: Arc<MockBackend>) -> WizardFlow<FileSource> {
        WizardFlow::new(FileSource, backend, EventBus::default(), &KikiConfig::default())
    }

    fn url_flow(backend: Arc<MockBackend>) -> WizardFlow<UrlSource> {
        WizardFlow::new(UrlSource, backend, EventBus::default(), &KikiConfig::default())
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_empty_query_stays_put() {
        let backend = Arc::new(MockBackend::new());
        let flow = file_flow(backend.clone());
        let mut rx = flow.subscribe();

        let err = flow.advance("   ").unwrap_err();
        assert!(matches!(err, KikiError::Validation(ValidationError::EmptyQuery)));
        assert_eq!(flow.stage(), WizardStage::AwaitingQuery);
        assert!(flow.query().is_none());
        assert!(backend.calls().is_empty());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::ValidationFailed { message, .. } => {
                assert_eq!(message, "Please enter a question first")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_advance_updates_progress() {
        let flow = file_flow(Arc::new(MockBackend::new()));
        let mut rx = flow.subscribe();

        flow.advance("  Who wrote it? ").unwrap();
        assert_eq!(flow.stage(), WizardStage::AwaitingSource);
        assert_eq!(flow.query().as_deref(), Some("Who wrote it?"));
        assert_eq!(
            flow.progress(),
            [StageMarker::Completed, StageMarker::Active, StageMarker::Inactive]
        );

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            DomainEvent::WizardStageChanged {
                from: WizardStage::AwaitingQuery,
                to: WizardStage::AwaitingSource,
                ..
            }
        ));
    }

    #[test]
    fn test_retreat_keeps_query_for_editing() {
        let flow = file_flow(Arc::new(MockBackend::new()));
        flow.advance("first").unwrap();
        flow.retreat().unwrap();

        assert_eq!(flow.stage(), WizardStage::AwaitingQuery);
        assert_eq!(flow.query().as_deref(), Some("first"));
        assert_eq!(flow.progress()[0], StageMarker::Active);

        // Retreating again is one step too far.
        assert!(flow.retreat().is_err());
    }

    #[test]
    fn test_rejected_file_keeps_previous_source() {
        let flow = file_flow(Arc::new(MockBackend::new()));
        flow.advance("q").unwrap();
        flow.select_source(UploadFile::new("report.PDF", vec![1])).unwrap();

        let err = flow
            .select_source(UploadFile::new("report.exe", vec![1]))
            .unwrap_err();
        assert!(matches!(
            err,
            KikiError::Validation(ValidationError::UnsupportedFileType { .. })
        ));
        assert_eq!(flow.source().unwrap().name, "report.PDF");
    }

    #[test]
    fn test_source_only_in_second_stage() {
        let flow = file_flow(Arc::new(MockBackend::new()));
        let err = flow
            .select_source(UploadFile::new("a.pdf", vec![]))
            .unwrap_err();
        assert!(matches!(err, KikiError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_submit_without_source_is_rejected() {
        let backend = Arc::new(MockBackend::new());
        let flow = file_flow(backend.clone());
        flow.advance("q").unwrap();
        flow.select_source(UploadFile::new("a.pdf", vec![])).unwrap();
        flow.remove_source().unwrap();
        assert!(!flow.can_submit());

        let err = flow.submit().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Please provide both a question and a file"
        );
        assert_eq!(flow.stage(), WizardStage::AwaitingSource);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_from_query_stage_is_refused() {
        let backend = Arc::new(MockBackend::new());
        let flow = file_flow(backend.clone());
        assert!(matches!(
            flow.submit().await,
            Err(KikiError::InvalidTransition { .. })
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_file_submit_renders_answer() {
        let backend =
            Arc::new(MockBackend::new().with_rag_file(Ok("**Ama** wrote it\nin *2020*".into())));
        let flow = file_flow(backend.clone());
        let mut rx = flow.subscribe();

        flow.advance("Who wrote it?").unwrap();
        let result = flow
            .submit_source(UploadFile::new("report.pdf", vec![1]))
            .await
            .unwrap();

        assert_eq!(
            result,
            WizardResult::Answer {
                question: "Who wrote it?".into(),
                html: "<strong>Ama</strong> wrote it<br>in <em>2020</em>".into(),
            }
        );
        assert_eq!(flow.stage(), WizardStage::ShowingResult);
        assert!(!flow.is_pending());
        assert_eq!(backend.calls_to("rag_file"), 1);

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.event_name()).collect();
        assert!(names.contains(&"request_started"));
        assert!(names.contains(&"wizard_answer_rendered"));
        assert_eq!(names.last(), Some(&"request_finished"));
    }

    #[tokio::test]
    async fn test_answer_is_escaped_by_default() {
        let backend = Arc::new(MockBackend::new().with_rag_file(Ok("<img src=x> **hi**".into())));
        let flow = file_flow(backend);
        flow.advance("q").unwrap();
        let result = flow
            .submit_source(UploadFile::new("a.pdf", vec![]))
            .await
            .unwrap();
        match result {
            WizardResult::Answer { html, .. } => {
                assert_eq!(html, "&lt;img src=x&gt; <strong>hi</strong>")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reported_error_shown_as_result() {
        let backend = Arc::new(
            MockBackend::new().with_rag_file(Err(ClientError::Reported("No file selected".into()))),
        );
        let flow = file_flow(backend);
        flow.advance("q").unwrap();
        let result = flow
            .submit_source(UploadFile::new("a.pdf", vec![]))
            .await
            .unwrap();

        assert_eq!(
            result,
            WizardResult::Failed {
                message: "Error: No file selected".into()
            }
        );
        assert_eq!(flow.stage(), WizardStage::ShowingResult);
    }

    #[tokio::test]
    async fn test_transport_error_shows_connection_text() {
        let backend = Arc::new(
            MockBackend::new().with_query(Err(ClientError::Transport("refused".into()))),
        );
        let flow = url_flow(backend);
        flow.advance("q").unwrap();
        let result = flow
            .submit_source("https://example.com".into())
            .await
            .unwrap();
        assert_eq!(
            result,
            WizardResult::Failed {
                message: format!("Error: {}", CONNECTION_FAILURE_TEXT)
            }
        );
    }

    #[tokio::test]
    async fn test_url_empty_query_never_scrapes() {
        let backend = Arc::new(MockBackend::new());
        let flow = url_flow(backend.clone());

        let err = flow.advance("  \t ").unwrap_err();
        assert!(matches!(err, KikiError::Validation(ValidationError::EmptyQuery)));
        assert_eq!(flow.stage(), WizardStage::AwaitingQuery);
        assert!(flow.query().is_none());

        // The URL form is not reachable until a question is given.
        assert!(flow
            .submit_source("https://example.com".into())
            .await
            .is_err());
        assert_eq!(flow.stage(), WizardStage::AwaitingQuery);
        assert_eq!(backend.calls_to("scrape_url_rag"), 0);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ftp_url_never_scrapes() {
        let backend = Arc::new(MockBackend::new());
        let flow = url_flow(backend.clone());
        flow.advance("What is on the page?").unwrap();

        let err = flow
            .submit_source("ftp://example.com".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KikiError::Validation(ValidationError::MalformedUrl(_))
        ));
        assert_eq!(flow.stage(), WizardStage::AwaitingSource);
        assert_eq!(backend.calls_to("scrape_url_rag"), 0);
    }

    #[tokio::test]
    async fn test_failed_scrape_never_queries() {
        let backend = Arc::new(
            MockBackend::new().with_scrape(Err(ClientError::Reported("Page not found".into()))),
        );
        let flow = url_flow(backend.clone());
        flow.advance("q").unwrap();
        let result = flow
            .submit_source("https://example.com/missing".into())
            .await
            .unwrap();

        assert_eq!(
            result,
            WizardResult::Failed {
                message: "Error: Page not found".into()
            }
        );
        assert_eq!(backend.calls_to("scrape_url_rag"), 1);
        assert_eq!(backend.calls_to("query_document"), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let flow = url_flow(Arc::new(MockBackend::new()));
        flow.advance("q").unwrap();
        flow.submit_source("https://example.com".into()).await.unwrap();

        flow.reset();
        assert_eq!(flow.stage(), WizardStage::AwaitingQuery);
        assert!(flow.query().is_none());
        assert!(flow.source().is_none());
        assert!(flow.result().is_none());
        assert_eq!(
            flow.progress(),
            [StageMarker::Active, StageMarker::Inactive, StageMarker::Inactive]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_pending_is_busy() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(5)));
        let flow = Arc::new(file_flow(backend.clone()));
        flow.advance("q").unwrap();
        flow.select_source(UploadFile::new("a.pdf", vec![])).unwrap();

        let running = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.submit().await })
        };
        tokio::task::yield_now().await;
        assert!(flow.is_pending());
        assert!(flow.submit().await.is_err());

        running.await.unwrap().unwrap();
        assert!(!flow.is_pending());
        assert_eq!(backend.calls_to("rag_file"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_rotates_while_pending() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_millis(4_500)));
        let flow = file_flow(backend);
        let mut rx = flow.subscribe();
        flow.advance("q").unwrap();
        flow.submit_source(UploadFile::new("a.pdf", vec![]))
            .await
            .unwrap();

        let statuses: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::StatusText { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.len(), 3);
        assert!(statuses
            .iter()
            .all(|s| s == "Kiki is analyzing your document..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_submit_discards_stale_result() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(3)));
        let flow = Arc::new(file_flow(backend));
        flow.advance("q").unwrap();
        flow.select_source(UploadFile::new("a.pdf", vec![])).unwrap();

        let running = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.submit().await })
        };
        tokio::task::yield_now().await;
        flow.reset();

        running.await.unwrap().unwrap();
        assert_eq!(flow.stage(), WizardStage::AwaitingQuery);
        assert!(flow.result().is_none());
        assert!(!flow.is_pending());
    }
}
