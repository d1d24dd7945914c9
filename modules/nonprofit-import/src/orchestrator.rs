//! Import orchestrator.
//!
//! Drives a single sequential run: paginate the directory search, and for
//! every item dedup → fetch detail → sanitize → persist, pausing between
//! items and pages to stay under upstream rate limits.
//!
//! A run is cancelled cooperatively through the `CancellationToken` handed in
//! with the [`RunRequest`]. The token is checked at the top of the page loop
//! and the top of the item loop; a search, detail fetch or upsert already in
//! flight always completes. Delays end early on cancellation.
//!
//! Error policy: a failed page fetch ends the run (`Failed`), because the
//! pagination position can no longer be trusted. Item-level failures are
//! counted, logged and skipped; the identifier stays out of the dedup set so
//! a later run picks it up again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::config::RunSettings;
use crate::document::sanitize;
use crate::error::{ImportError, Result};
use crate::progress::{ImportLogEntry, ProgressObserver, ProgressReporter, ProgressSnapshot};
use crate::traits::{DetailFetcher, PersistenceGateway, SearchClient};
use crate::types::{ImportStats, RunState, SearchCriteria, SearchSummaryRecord};

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// Everything a run needs from its caller.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub criteria: SearchCriteria,
    /// Zero-based page to begin at; used to resume from a checkpoint.
    pub start_page: u32,
    /// Identifiers already handled by earlier runs or already persisted.
    pub dedup_seed: HashSet<String>,
    pub cancel: CancellationToken,
}

impl RunRequest {
    pub fn new(criteria: SearchCriteria) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    pub fn start_page(mut self, page: u32) -> Self {
        self.start_page = page;
        self
    }

    pub fn dedup_seed(mut self, seed: HashSet<String>) -> Self {
        self.dedup_seed = seed;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub stats: ImportStats,
    /// The seed plus every identifier imported during the run.
    pub dedup: HashSet<String>,
    /// Where a follow-up run should start: the first page not fully processed,
    /// or 0 once the whole listing has been walked.
    pub next_page: u32,
    pub log: Vec<ImportLogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Imported,
    Skipped,
    Failed,
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Caller's view of a run in progress.
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    progress: watch::Receiver<ProgressSnapshot>,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest published progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.clone()
    }

    pub async fn wait(self) -> Result<RunOutcome> {
        self.task
            .await
            .map_err(|e| ImportError::Aborted(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ImportOrchestrator
// ---------------------------------------------------------------------------

pub struct ImportOrchestrator {
    search: Arc<dyn SearchClient>,
    details: Arc<dyn DetailFetcher>,
    store: Arc<dyn PersistenceGateway>,
    settings: RunSettings,
    state: Arc<Mutex<RunState>>,
}

impl ImportOrchestrator {
    pub fn new(
        search: Arc<dyn SearchClient>,
        details: Arc<dyn DetailFetcher>,
        store: Arc<dyn PersistenceGateway>,
        settings: RunSettings,
    ) -> Self {
        Self {
            search,
            details,
            store,
            settings,
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    /// `Running` while a run is active, otherwise the last terminal state.
    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Start a run on the current tokio runtime. Only one run may be active
    /// per orchestrator.
    pub fn start_run<O>(&self, request: RunRequest, observer: O) -> Result<RunHandle>
    where
        O: ProgressObserver + 'static,
    {
        {
            let mut state = lock(&self.state);
            if *state == RunState::Running {
                return Err(ImportError::RunInProgress);
            }
            *state = RunState::Running;
        }

        let run_id = Uuid::new_v4();
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());
        let cancel = request.cancel.clone();

        let run = ImportRun {
            search: self.search.clone(),
            details: self.details.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
            cancel: request.cancel,
            progress: progress_tx,
            observer: Box::new(observer),
        };
        let guard = StateGuard(self.state.clone());
        let span = tracing::info_span!("import_run", %run_id);

        let task = tokio::spawn(
            async move {
                let outcome = run
                    .execute(request.criteria, request.start_page, request.dedup_seed)
                    .await;
                guard.finish(outcome.state);
                outcome
            }
            .instrument(span),
        );

        Ok(RunHandle {
            run_id,
            cancel,
            progress: progress_rx,
            task,
        })
    }

    pub fn cancel(&self, handle: &RunHandle) {
        handle.cancel();
    }

    /// Import one organization outside of a run (the single "claim" action).
    pub async fn import_single(&self, external_id: &str) -> Result<Uuid> {
        import_one(self.details.as_ref(), self.store.as_ref(), external_id).await
    }
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Moves the orchestrator out of `Running` when a run ends, including when
/// the run task is dropped or panics.
struct StateGuard(Arc<Mutex<RunState>>);

impl StateGuard {
    fn finish(self, state: RunState) {
        *lock(&self.0) = state;
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.0);
        if *state == RunState::Running {
            *state = RunState::Failed;
        }
    }
}

/// fetch → validate → sanitize → upsert.
async fn import_one(
    details: &dyn DetailFetcher,
    store: &dyn PersistenceGateway,
    external_id: &str,
) -> Result<Uuid> {
    let detail = details.fetch_detail(external_id).await?;
    detail.validate(external_id)?;
    let clean = sanitize(detail.to_document())?;
    store.upsert(external_id, clean).await
}

// ---------------------------------------------------------------------------
// ImportRun: state owned by one active run
// ---------------------------------------------------------------------------

struct ImportRun {
    search: Arc<dyn SearchClient>,
    details: Arc<dyn DetailFetcher>,
    store: Arc<dyn PersistenceGateway>,
    settings: RunSettings,
    cancel: CancellationToken,
    progress: watch::Sender<ProgressSnapshot>,
    observer: Box<dyn ProgressObserver>,
}

impl ImportRun {
    async fn execute(
        self,
        criteria: SearchCriteria,
        start_page: u32,
        dedup_seed: HashSet<String>,
    ) -> RunOutcome {
        let mut reporter = ProgressReporter::new(self.settings.log_capacity);
        let mut dedup = dedup_seed;
        let mut page = start_page;
        let mut next_page = start_page;
        let mut has_more = true;
        let mut state = RunState::Completed;

        reporter.info(format!(
            "Starting import at page {start_page} ({} identifiers already known)",
            dedup.len()
        ));
        self.publish(&reporter);

        while has_more {
            if self.cancel.is_cancelled() {
                state = RunState::Cancelled;
                break;
            }

            reporter.info(format!("Fetching page {page}..."));
            self.publish(&reporter);

            let result = match self.search.search(&criteria, page).await {
                Ok(result) => result,
                Err(e) => {
                    reporter.error(format!("Error fetching page {page}: {e}"));
                    self.publish(&reporter);
                    state = RunState::Failed;
                    break;
                }
            };
            debug!(
                page,
                items = result.items.len(),
                total_pages = result.total_pages,
                has_more = result.has_more,
                "Fetched search page"
            );

            let before = reporter.stats();
            let mut interrupted = false;
            for item in &result.items {
                if self.cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }

                let outcome = self.process_item(item, &mut dedup, &mut reporter).await;
                self.publish(&reporter);

                if outcome != ItemOutcome::Skipped {
                    self.pause(self.settings.item_delay).await;
                }
            }

            reporter.record_page();
            let after = reporter.stats();
            let finished = page;
            page = page.saturating_add(1);
            has_more = result.has_more && finished < page && page < result.total_pages;
            // A page cut short by cancellation is resumed from itself.
            next_page = if interrupted { finished } else { page };

            reporter.info(format!(
                "Completed page {finished}: {} imported, {} skipped, {} failed",
                after.imported - before.imported,
                after.skipped - before.skipped,
                after.failed - before.failed,
            ));
            self.publish(&reporter);

            if interrupted {
                state = RunState::Cancelled;
                break;
            }
            if has_more && !self.cancel.is_cancelled() {
                self.pause(self.settings.page_delay).await;
            }
        }

        // Nothing left to resume; the next run rescans from the first page.
        if state == RunState::Completed {
            next_page = 0;
        }

        let stats = reporter.stats();
        match state {
            RunState::Cancelled => reporter.info(format!(
                "Import stopped by user. Imported: {}, Skipped: {}, Failed: {}. Resume at page {next_page}",
                stats.imported, stats.skipped, stats.failed
            )),
            RunState::Failed => reporter.warn(format!(
                "Import aborted. Imported: {}, Skipped: {}, Failed: {}. Resume at page {next_page}",
                stats.imported, stats.skipped, stats.failed
            )),
            _ => reporter.info(format!(
                "Import complete! Imported: {}, Skipped: {}, Failed: {}",
                stats.imported, stats.skipped, stats.failed
            )),
        }
        self.publish(&reporter);
        info!(state = ?state, pages = stats.pages_processed, next_page, "Import run finished");

        RunOutcome {
            state,
            stats,
            dedup,
            next_page,
            log: reporter.snapshot().log,
        }
    }

    async fn process_item(
        &self,
        item: &SearchSummaryRecord,
        dedup: &mut HashSet<String>,
        reporter: &mut ProgressReporter,
    ) -> ItemOutcome {
        let ein = item.external_id.as_str();

        if dedup.contains(ein) {
            reporter.record_skipped();
            reporter.info(format!("Skipped {} ({ein}): already imported", item.name));
            return ItemOutcome::Skipped;
        }

        match import_one(self.details.as_ref(), self.store.as_ref(), ein).await {
            Ok(stored_id) => {
                // Only after a successful persist; failures stay eligible for the next run.
                dedup.insert(ein.to_string());
                reporter.record_imported();
                reporter.info(format!("Imported {} ({ein})", item.name));
                debug!(ein, %stored_id, "Persisted organization");
                ItemOutcome::Imported
            }
            Err(e) => {
                reporter.record_failed();
                reporter.warn(format!("Failed to import {} ({ein}): {e}", item.name));
                ItemOutcome::Failed
            }
        }
    }

    fn publish(&self, reporter: &ProgressReporter) {
        let snapshot = reporter.snapshot();
        self.observer.on_progress(&snapshot);
        self.progress.send_replace(snapshot);
    }

    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}
