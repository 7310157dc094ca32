use std::sync::{atomic::{AtomicU64, Ordering}, Arc};

use parking_lot::RwLock;
use tracing::{info, warn, error, debug};

use crate::{
    error::PipelineError,
    history::HistoryStore,
    models::{HistoryEntry, HistoryPage, PromptRequest},
    replicate::ImageGenerator,
    state::{reduce, Event, OverlapPolicy, SubmissionId, ViewState},
};

/// Drives submit → generate → persist → reconcile and owns the session's view state.
pub struct Orchestrator {
    generator: Arc<dyn ImageGenerator>,
    history: Arc<dyn HistoryStore>,
    state: RwLock<ViewState>,
    next_submission: AtomicU64,
    page_size: usize,
}

/// Dispatches `Finished` on every exit path of a submission.
struct InFlight<'a> {
    orchestrator: &'a Orchestrator,
    submission: SubmissionId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.orchestrator.dispatch(Event::Finished { submission: self.submission });
    }
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        history: Arc<dyn HistoryStore>,
        policy: OverlapPolicy,
        page_size: usize,
    ) -> Self {
        Self {
            generator,
            history,
            state: RwLock::new(ViewState::new(policy)),
            next_submission: AtomicU64::new(1),
            page_size: page_size.max(1),
        }
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.read().clone()
    }

    fn dispatch(&self, event: Event) {
        debug!(?event, "dispatching");
        let mut guard = self.state.write();
        let current = std::mem::take(&mut *guard);
        *guard = reduce(current, event);
    }

    /// Runs one full submission cycle. Only a blank prompt is returned as an error;
    /// every later failure is logged and recorded in the view state.
    pub async fn submit_prompt(&self, prompt: &str) -> Result<SubmissionId, PipelineError> {
        let prompt = PromptRequest::new(prompt).inspect_err(|_| warn!("⚠️ Rejecting empty prompt"))?;

        let submission = self.next_submission.fetch_add(1, Ordering::SeqCst);
        self.dispatch(Event::Submitted { submission, prompt: prompt.as_str().to_string() });
        let _in_flight = InFlight { orchestrator: self, submission };
        info!("🚀 Submission {} started", submission);

        let image_url = match self.generator.generate(&prompt).await {
            Ok(url) => url,
            Err(error) => {
                error!("❌ Submission {} generation failed: {}", submission, error);
                self.dispatch(Event::GenerationFailed { submission, error });
                return Ok(submission);
            }
        };
        self.dispatch(Event::GenerationSucceeded { submission, image_url: image_url.clone() });

        let entry = HistoryEntry::new(prompt.into_inner(), image_url);
        if let Err(error) = self.history.append_history(&entry).await {
            error!("❌ Submission {} could not be saved: {}", submission, error);
            self.dispatch(Event::SaveFailed { submission, error });
            return Ok(submission);
        }
        self.dispatch(Event::SaveSucceeded { submission });

        match self.history.fetch_history(HistoryPage::latest()).await {
            Ok(page) => {
                let entry = page.into_iter().next();
                if entry.is_none() {
                    warn!("⚠️ Submission {} saved but the latest history page was empty", submission);
                }
                self.dispatch(Event::Reconciled { submission, entry });
                info!("✅ Submission {} reconciled", submission);
            }
            Err(error) => {
                error!("❌ Submission {} saved but reconciliation failed: {}", submission, error);
                self.dispatch(Event::ReconcileFailed { submission, error });
            }
        }
        Ok(submission)
    }

    pub fn select_history_entry(&self, entry: HistoryEntry) {
        self.dispatch(Event::EntrySelected(entry));
    }

    pub async fn load_initial_history(&self) {
        match self.history.fetch_history(HistoryPage::new(0, self.page_size)).await {
            Ok(entries) => {
                info!("📚 Loaded {} history entries", entries.len());
                self.dispatch(Event::HistoryLoaded(entries));
            }
            Err(error) => {
                error!("❌ Initial history load failed: {}", error);
                self.dispatch(Event::HistoryLoadFailed(error));
            }
        }
    }

    /// Appends the next page of older entries after the ones already loaded.
    pub async fn load_more_history(&self) {
        let skip = self.state.read().history.len();
        match self.history.fetch_history(HistoryPage::new(skip, self.page_size)).await {
            Ok(entries) => {
                info!("📚 Loaded {} more history entries after {}", entries.len(), skip);
                self.dispatch(Event::HistoryPageLoaded(entries));
            }
            Err(error) => {
                error!("❌ Loading more history failed: {}", error);
                self.dispatch(Event::HistoryPageFailed(error));
            }
        }
    }
}
