//! Deploy-time prerender orchestration.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use edge_cache::CacheWriter;
use edge_core::{
    CancelPolicy, LifecycleObserver, PrerenderSettings, RenderedResponse, RunId, RunPhase,
    TimingContext,
};
use edge_data::{FetchError, FetchExecutor};

use crate::error::PrerenderResult;
use crate::plan::{PrerenderPlan, PrerenderTarget};
use crate::progress::{OutcomeTransition, ProgressReporter, RunSummary};
use crate::quota::{AdmitError, QuotaGate, QuotaPermit};
use crate::run::{DeploymentRun, FailureKind, RequestOutcome};

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Full outcome ledger.
    pub run: DeploymentRun,
    /// Aggregate summary.
    pub summary: RunSummary,
    /// Highest number of fetches in flight at once.
    pub peak_in_flight: usize,
}

impl RunReport {
    /// Check if every request succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.run.counters().failed == 0
    }
}

/// Drives a prerender plan through enumeration, admission, fetch and cache.
///
/// The reporter is shared; run one plan at a time per orchestrator.
pub struct Orchestrator {
    settings: PrerenderSettings,
    executor: FetchExecutor,
    writer: CacheWriter,
    reporter: Arc<ProgressReporter>,
}

impl Orchestrator {
    /// Create an orchestrator with its own progress reporter.
    pub fn new(settings: PrerenderSettings, executor: FetchExecutor, writer: CacheWriter) -> Self {
        Self {
            settings,
            executor,
            writer,
            reporter: Arc::new(ProgressReporter::new()),
        }
    }

    /// Use an existing reporter (e.g. one the console already subscribed to).
    pub fn with_reporter(mut self, reporter: Arc<ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &PrerenderSettings {
        &self.settings
    }

    pub fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }

    /// Run a plan without external cancellation.
    pub async fn run_to_completion(&self, plan: &PrerenderPlan) -> PrerenderResult<RunReport> {
        self.run(plan, CancellationToken::new()).await
    }

    /// Run a plan.
    ///
    /// Only enumeration failures are errors. Every enumerated request ends
    /// with a terminal outcome in the returned report, including when `cancel`
    /// fires mid-run.
    pub async fn run(
        &self,
        plan: &PrerenderPlan,
        cancel: CancellationToken,
    ) -> PrerenderResult<RunReport> {
        let run_id = RunId::generate();
        let timing = TimingContext::new();
        let mut ledger = DeploymentRun::new(run_id.clone());

        self.reporter.begin_run(run_id.clone());
        self.reporter.on_phase(RunPhase::Enumerating, timing.elapsed());
        tracing::info!(
            run_id = %run_id,
            tier = %self.settings.tier,
            concurrency = self.settings.limits.concurrency,
            total_request_cap = self.settings.limits.total_request_cap,
            routes = plan.routes().len(),
            "starting prerender run"
        );

        let targets = match plan.resolve().await {
            Ok(targets) => targets,
            Err(err) => {
                tracing::error!(
                    run_id = %run_id,
                    route = %err.route,
                    error = %err.source,
                    "path enumeration failed, aborting run"
                );
                ledger.abort()?;
                self.reporter.on_phase(RunPhase::Aborted, timing.elapsed());
                return Err(err.into());
            }
        };

        ledger.begin(
            targets
                .iter()
                .map(|t| (t.route.clone(), t.request.clone())),
        )?;
        self.reporter.set_total(targets.len());
        self.reporter.on_phase(RunPhase::Running, timing.elapsed());
        tracing::info!(run_id = %run_id, total = targets.len(), "enumerated prerender paths");

        let shared = Shared {
            ledger: Arc::new(Mutex::new(ledger)),
            reporter: self.reporter.clone(),
            run_id: run_id.clone(),
        };
        let gate = QuotaGate::new(self.settings.limits);
        let mut workers = JoinSet::new();
        let mut dispatched = HashSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let admitted = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                admitted = gate.admit() => admitted,
            };

            match admitted {
                Ok(permit) => {
                    dispatched.insert(index);
                    self.reporter.dispatched(target.request.path());
                    let worker = Worker {
                        executor: self.executor.clone(),
                        writer: self.writer.clone(),
                        shared: shared.clone(),
                    };
                    workers.spawn(worker.process(index, target, permit));
                }
                Err(AdmitError::Exceeded(err)) => {
                    tracing::debug!(
                        run_id = %run_id,
                        path = target.request.path(),
                        "request rejected by quota"
                    );
                    shared.settle(
                        index,
                        RequestOutcome::failed(FailureKind::QuotaExceeded, err.to_string()),
                        false,
                        None,
                    );
                }
                Err(AdmitError::Closed) => break,
            }
        }

        self.join_workers(&mut workers, &cancel).await;
        gate.close();

        // Anything still pending was never dispatched, or was abandoned.
        let leftovers = shared.lock().pending_indices();
        if !leftovers.is_empty() {
            let (kind, message) = if cancel.is_cancelled() {
                (FailureKind::Cancelled, "run cancelled")
            } else {
                (FailureKind::Fetch, "worker ended without an outcome")
            };
            tracing::info!(
                run_id = %run_id,
                count = leftovers.len(),
                kind = %kind,
                "settling unfinished requests"
            );
            for index in leftovers {
                shared.settle(
                    index,
                    RequestOutcome::failed(kind, message),
                    dispatched.contains(&index),
                    None,
                );
            }
        }

        let mut run = shared.into_run();
        run.complete()?;
        self.reporter.on_phase(RunPhase::Completed, timing.elapsed());

        let summary = self.reporter.summary();
        tracing::info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            total = summary.total,
            duration_ms = summary.duration_ms,
            cancelled = cancel.is_cancelled(),
            "prerender run completed"
        );

        Ok(RunReport {
            run,
            summary,
            peak_in_flight: gate.peak_in_flight(),
        })
    }

    async fn join_workers(&self, workers: &mut JoinSet<()>, cancel: &CancellationToken) {
        let abandon = self.settings.cancel_policy == CancelPolicy::Abandon;
        let mut aborted = false;

        loop {
            let abort = tokio::select! {
                biased;
                _ = cancel.cancelled(), if abandon && !aborted => true,
                joined = workers.join_next() => {
                    match joined {
                        None => break,
                        Some(Err(err)) if err.is_panic() => {
                            tracing::error!(error = %err, "prerender worker panicked");
                        }
                        Some(_) => {}
                    }
                    false
                }
            };

            if abort {
                tracing::info!(in_flight = workers.len(), "abandoning in-flight fetches");
                workers.abort_all();
                aborted = true;
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// State shared between the dispatch loop and workers.
#[derive(Clone)]
struct Shared {
    ledger: Arc<Mutex<DeploymentRun>>,
    reporter: Arc<ProgressReporter>,
    run_id: RunId,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DeploymentRun> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Finalize one outcome and notify the reporter.
    fn settle(
        &self,
        index: usize,
        outcome: RequestOutcome,
        dispatched: bool,
        fetch: Option<(Duration, usize)>,
    ) {
        let transition = {
            let mut run = self.lock();
            match run.finalize(index, outcome) {
                Ok(entry) => OutcomeTransition {
                    path: entry.request.path().to_string(),
                    outcome: entry.outcome.clone(),
                    dispatched,
                    fetch,
                },
                Err(err) => {
                    tracing::warn!(run_id = %self.run_id, error = %err, "dropping outcome");
                    return;
                }
            }
        };
        self.reporter.observe(&transition);
    }

    fn into_run(self) -> DeploymentRun {
        match Arc::try_unwrap(self.ledger) {
            Ok(ledger) => ledger.into_inner().unwrap_or_else(|e| e.into_inner()),
            Err(ledger) => ledger.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }
}

struct Worker {
    executor: FetchExecutor,
    writer: CacheWriter,
    shared: Shared,
}

impl Worker {
    async fn process(self, index: usize, target: PrerenderTarget, permit: QuotaPermit) {
        let path = target.request.path();
        let started = tokio::time::Instant::now();

        let (outcome, fetch) = match self.executor.execute(&target.request).await {
            Ok(response) => {
                let fetch = Some((started.elapsed(), response.body.len()));
                (self.classify(&target, &response).await, fetch)
            }
            Err(err) => {
                let kind = if err.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Fetch
                };
                tracing::warn!(
                    run_id = %self.shared.run_id,
                    path,
                    error = %err,
                    "prerender fetch failed"
                );
                (RequestOutcome::failed(kind, err.to_string()), None)
            }
        };

        self.shared.settle(index, outcome, true, fetch);
        drop(permit);
    }

    async fn classify(&self, target: &PrerenderTarget, response: &RenderedResponse) -> RequestOutcome {
        let path = target.request.path();
        let status = response.status;

        if !target.cache.accepts_status(status) {
            let err = FetchError::Http {
                status,
                path: path.to_string(),
            };
            tracing::warn!(run_id = %self.shared.run_id, path, status, "non-cacheable status");
            return RequestOutcome::failed(FailureKind::Fetch, err.to_string());
        }

        if !target.cache.should_cache(status) {
            return RequestOutcome::Succeeded {
                status,
                cache_key: None,
                cache_warning: None,
            };
        }

        match self.writer.store(&target.request, response, &target.cache).await {
            Ok(key) => RequestOutcome::Succeeded {
                status,
                cache_key: Some(key),
                cache_warning: None,
            },
            Err(err) => {
                tracing::warn!(
                    run_id = %self.shared.run_id,
                    path,
                    error = %err,
                    "cache write failed, keeping render result"
                );
                RequestOutcome::Succeeded {
                    status,
                    cache_key: None,
                    cache_warning: Some(err.to_string()),
                }
            }
        }
    }
}
