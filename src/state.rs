use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, models::HistoryEntry};

pub type SubmissionId = u64;

/// Where the latest submission sits in its generate → persist → reconcile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Generating,
    Persisting,
    Reconciling,
}

/// How completions of overlapping submissions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Every completion applies, in completion order.
    #[default]
    Interleave,
    /// Image, phase and error updates only apply for the most recent submission.
    LatestOnly,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interleave" => Ok(OverlapPolicy::Interleave),
            "latest" | "latest_only" => Ok(OverlapPolicy::LatestOnly),
            other => Err(format!("unknown submission policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted { submission: SubmissionId, prompt: String },
    GenerationSucceeded { submission: SubmissionId, image_url: String },
    GenerationFailed { submission: SubmissionId, error: PipelineError },
    SaveSucceeded { submission: SubmissionId },
    SaveFailed { submission: SubmissionId, error: PipelineError },
    /// Canonical record read back after a save; `None` when the page came back empty.
    Reconciled { submission: SubmissionId, entry: Option<HistoryEntry> },
    ReconcileFailed { submission: SubmissionId, error: PipelineError },
    Finished { submission: SubmissionId },
    HistoryLoaded(Vec<HistoryEntry>),
    HistoryLoadFailed(PipelineError),
    HistoryPageLoaded(Vec<HistoryEntry>),
    HistoryPageFailed(PipelineError),
    EntrySelected(HistoryEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub prompt: String,
    pub current_image: Option<String>,
    pub loading: bool,
    /// Newest first.
    pub history: Vec<HistoryEntry>,
    pub phase: Phase,
    pub last_error: Option<PipelineError>,
    policy: OverlapPolicy,
    in_flight: usize,
    latest_submission: SubmissionId,
}

impl ViewState {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    pub fn in_flight(&self) -> usize { self.in_flight }

    fn applies(&self, submission: SubmissionId) -> bool {
        match self.policy {
            OverlapPolicy::Interleave => true,
            OverlapPolicy::LatestOnly => submission == self.latest_submission,
        }
    }

    /// Whether a submission reaching its end may put the view back to `Idle`.
    /// Under `Interleave` another submission still in flight keeps its phase.
    fn settles(&self, submission: SubmissionId) -> bool {
        match self.policy {
            OverlapPolicy::Interleave => self.in_flight <= 1,
            OverlapPolicy::LatestOnly => self.applies(submission),
        }
    }
}

pub fn reduce(mut state: ViewState, event: Event) -> ViewState {
    match event {
        Event::Submitted { submission, prompt } => {
            state.prompt = prompt;
            state.in_flight += 1;
            state.loading = true;
            state.latest_submission = state.latest_submission.max(submission);
            state.phase = Phase::Generating;
            state.last_error = None;
        }
        Event::GenerationSucceeded { submission, image_url } => {
            if state.applies(submission) {
                state.current_image = Some(image_url);
                state.phase = Phase::Persisting;
            }
        }
        Event::SaveSucceeded { submission } => {
            if state.applies(submission) {
                state.phase = Phase::Reconciling;
            }
        }
        Event::Reconciled { submission, entry } => {
            // persisted records exist server-side whatever the policy
            if let Some(entry) = entry {
                state.history.insert(0, entry);
            }
            if state.settles(submission) {
                state.phase = Phase::Idle;
            }
        }
        Event::GenerationFailed { submission, error }
        | Event::SaveFailed { submission, error }
        | Event::ReconcileFailed { submission, error } => {
            if state.applies(submission) {
                state.last_error = Some(error);
            }
            if state.settles(submission) {
                state.phase = Phase::Idle;
            }
        }
        Event::Finished { submission } => {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.loading = state.in_flight > 0;
            if state.in_flight == 0 || (state.policy == OverlapPolicy::LatestOnly && state.settles(submission)) {
                state.phase = Phase::Idle;
            }
        }
        Event::HistoryLoaded(entries) => {
            state.history = entries;
        }
        Event::HistoryPageLoaded(entries) => {
            state.history.extend(entries);
        }
        Event::HistoryLoadFailed(error) | Event::HistoryPageFailed(error) => {
            state.last_error = Some(error);
        }
        Event::EntrySelected(entry) => {
            state.prompt = entry.prompt;
            state.current_image = Some(entry.image_url);
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(prompt: &str, url: &str) -> HistoryEntry {
        HistoryEntry::new(prompt, url)
    }

    fn run(state: ViewState, events: Vec<Event>) -> ViewState {
        events.into_iter().fold(state, reduce)
    }

    #[test]
    fn successful_cycle_prepends_canonical_entry() {
        let start = reduce(ViewState::default(), Event::HistoryLoaded(vec![entry("old", "u0"), entry("older", "u-1")]));
        let state = run(start, vec![
            Event::Submitted { submission: 1, prompt: "a red fox".into() },
            Event::GenerationSucceeded { submission: 1, image_url: "https://img/1.png".into() },
            Event::SaveSucceeded { submission: 1 },
            Event::Reconciled { submission: 1, entry: Some(entry("a red fox", "https://img/1.png")) },
            Event::Finished { submission: 1 },
        ]);

        assert_eq!(state.current_image.as_deref(), Some("https://img/1.png"));
        assert_eq!(state.prompt, "a red fox");
        assert_eq!(state.history, vec![entry("a red fox", "https://img/1.png"), entry("old", "u0"), entry("older", "u-1")]);
        assert!(!state.loading);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn phases_follow_the_cycle() {
        let s = reduce(ViewState::default(), Event::Submitted { submission: 1, prompt: "p".into() });
        assert_eq!((s.phase, s.loading), (Phase::Generating, true));
        let s = reduce(s, Event::GenerationSucceeded { submission: 1, image_url: "u".into() });
        assert_eq!(s.phase, Phase::Persisting);
        let s = reduce(s, Event::SaveSucceeded { submission: 1 });
        assert_eq!(s.phase, Phase::Reconciling);
    }

    #[test]
    fn generation_failure_keeps_previous_image_and_history() {
        let mut start = ViewState::default();
        start.current_image = Some("previous".into());
        start.history = vec![entry("cat", "u2")];

        let state = run(start, vec![
            Event::Submitted { submission: 1, prompt: "dog".into() },
            Event::GenerationFailed { submission: 1, error: PipelineError::EmptyOutput },
            Event::Finished { submission: 1 },
        ]);

        assert_eq!(state.current_image.as_deref(), Some("previous"));
        assert_eq!(state.history, vec![entry("cat", "u2")]);
        assert_eq!(state.last_error, Some(PipelineError::EmptyOutput));
        assert!(!state.loading);
    }

    #[test]
    fn save_failure_keeps_generated_image() {
        let state = run(ViewState::default(), vec![
            Event::Submitted { submission: 1, prompt: "dog".into() },
            Event::GenerationSucceeded { submission: 1, image_url: "u9".into() },
            Event::SaveFailed { submission: 1, error: PipelineError::HistorySaveFailed("503".into()) },
            Event::Finished { submission: 1 },
        ]);

        assert_eq!(state.current_image.as_deref(), Some("u9"));
        assert!(state.history.is_empty());
        assert!(matches!(state.last_error, Some(PipelineError::HistorySaveFailed(_))));
    }

    #[test]
    fn empty_reconciliation_page_prepends_nothing() {
        let start = ViewState { history: vec![entry("a", "1")], ..ViewState::default() };
        let state = run(start, vec![
            Event::Submitted { submission: 1, prompt: "b".into() },
            Event::GenerationSucceeded { submission: 1, image_url: "2".into() },
            Event::SaveSucceeded { submission: 1 },
            Event::Reconciled { submission: 1, entry: None },
            Event::Finished { submission: 1 },
        ]);
        assert_eq!(state.history, vec![entry("a", "1")]);
    }

    #[test]
    fn duplicates_are_kept() {
        let start = ViewState { history: vec![entry("fox", "1")], ..ViewState::default() };
        let state = reduce(start, Event::Reconciled { submission: 1, entry: Some(entry("fox", "1")) });
        assert_eq!(state.history, vec![entry("fox", "1"), entry("fox", "1")]);
    }

    #[test]
    fn next_page_is_appended_after_existing_entries() {
        let start = ViewState { history: vec![entry("new", "1")], ..ViewState::default() };
        let state = reduce(start, Event::HistoryPageLoaded(vec![entry("older", "0")]));
        assert_eq!(state.history, vec![entry("new", "1"), entry("older", "0")]);
    }

    #[test]
    fn failed_initial_load_leaves_history_empty() {
        let state = reduce(ViewState::default(), Event::HistoryLoadFailed(PipelineError::HistoryFetchFailed("down".into())));
        assert!(state.history.is_empty());
        assert!(state.last_error.is_some());
    }

    #[test]
    fn selecting_an_entry_sets_prompt_and_image() {
        let state = reduce(ViewState::default(), Event::EntrySelected(entry("cat", "u2")));
        assert_eq!(state.prompt, "cat");
        assert_eq!(state.current_image.as_deref(), Some("u2"));
    }

    #[test]
    fn interleaved_submissions_apply_in_completion_order() {
        let state = run(ViewState::new(OverlapPolicy::Interleave), vec![
            Event::Submitted { submission: 1, prompt: "first".into() },
            Event::Submitted { submission: 2, prompt: "second".into() },
            Event::GenerationSucceeded { submission: 2, image_url: "u2".into() },
            Event::Finished { submission: 2 },
            Event::GenerationSucceeded { submission: 1, image_url: "u1".into() },
        ]);
        assert_eq!(state.current_image.as_deref(), Some("u1"));
        assert!(state.loading, "submission 1 is still in flight");

        let state = reduce(state, Event::Finished { submission: 1 });
        assert!(!state.loading);
    }

    #[test]
    fn latest_only_ignores_stale_image_but_keeps_persisted_entry() {
        let state = run(ViewState::new(OverlapPolicy::LatestOnly), vec![
            Event::Submitted { submission: 1, prompt: "first".into() },
            Event::Submitted { submission: 2, prompt: "second".into() },
            Event::GenerationSucceeded { submission: 2, image_url: "u2".into() },
            Event::GenerationSucceeded { submission: 1, image_url: "u1".into() },
            Event::GenerationFailed { submission: 1, error: PipelineError::EmptyOutput },
            Event::Reconciled { submission: 1, entry: Some(entry("first", "u1")) },
        ]);
        assert_eq!(state.current_image.as_deref(), Some("u2"));
        assert_eq!(state.prompt, "second");
        assert_eq!(state.last_error, None);
        assert_eq!(state.history, vec![entry("first", "u1")]);
    }

    #[test]
    fn older_failure_does_not_idle_a_running_submission() {
        let state = run(ViewState::new(OverlapPolicy::Interleave), vec![
            Event::Submitted { submission: 1, prompt: "first".into() },
            Event::Submitted { submission: 2, prompt: "second".into() },
            Event::GenerationFailed { submission: 1, error: PipelineError::EmptyOutput },
        ]);
        assert_eq!(state.phase, Phase::Generating);
        assert!(state.loading);
        assert_eq!(state.last_error, Some(PipelineError::EmptyOutput));

        let state = reduce(state, Event::Finished { submission: 1 });
        assert_eq!((state.phase, state.in_flight()), (Phase::Generating, 1));

        let state = run(state, vec![
            Event::GenerationSucceeded { submission: 2, image_url: "u2".into() },
            Event::SaveSucceeded { submission: 2 },
            Event::Reconciled { submission: 2, entry: Some(entry("second", "u2")) },
        ]);
        assert_eq!(state.phase, Phase::Idle);
    }

    #[test]
    fn older_reconcile_does_not_idle_a_running_submission() {
        let state = run(ViewState::new(OverlapPolicy::Interleave), vec![
            Event::Submitted { submission: 1, prompt: "first".into() },
            Event::GenerationSucceeded { submission: 1, image_url: "u1".into() },
            Event::SaveSucceeded { submission: 1 },
            Event::Submitted { submission: 2, prompt: "second".into() },
            Event::Reconciled { submission: 1, entry: Some(entry("first", "u1")) },
        ]);
        assert_eq!(state.phase, Phase::Generating);
        assert_eq!(state.history, vec![entry("first", "u1")]);
    }

    #[test]
    fn superseded_submission_finishing_keeps_latest_phase() {
        let state = run(ViewState::new(OverlapPolicy::LatestOnly), vec![
            Event::Submitted { submission: 1, prompt: "first".into() },
            Event::Submitted { submission: 2, prompt: "second".into() },
            Event::GenerationSucceeded { submission: 2, image_url: "u2".into() },
            Event::Finished { submission: 1 },
        ]);
        assert_eq!(state.phase, Phase::Persisting);
        assert!(state.loading);
        assert_eq!(state.in_flight(), 1);

        let state = reduce(state, Event::Finished { submission: 2 });
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.loading);
    }

    #[test]
    fn latest_finishing_first_idles_while_stale_one_runs() {
        let state = run(ViewState::new(OverlapPolicy::LatestOnly), vec![
            Event::Submitted { submission: 1, prompt: "first".into() },
            Event::Submitted { submission: 2, prompt: "second".into() },
            Event::Finished { submission: 2 },
        ]);
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.loading, "submission 1 is still in flight");
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("interleave".parse::<OverlapPolicy>(), Ok(OverlapPolicy::Interleave));
        assert_eq!("LATEST".parse::<OverlapPolicy>(), Ok(OverlapPolicy::LatestOnly));
        assert!("fifo".parse::<OverlapPolicy>().is_err());
    }
}
