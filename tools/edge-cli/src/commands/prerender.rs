//! Prerender configured routes against a running origin.

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use edge_cache::{CacheWriter, FileBackend};
use edge_data::{FetchExecutor, HttpPipeline};
use edge_prerender::{
    EventStatus, Orchestrator, ProgressEvent, ProgressReporter, RequestOutcome, RunReport,
};

use super::PrerenderArgs;
use crate::context::Context;
use crate::output::{format_duration_ms, status_badge, Output};

/// Most failures listed after a run.
const MAX_LISTED_FAILURES: usize = 20;

/// Run the prerender command.
pub async fn run(args: PrerenderArgs, ctx: &Context) -> Result<()> {
    let mut prerender = ctx.config.prerender.clone();
    if let Some(tier) = args.tier {
        prerender.tier = tier;
    }
    if args.concurrency.is_some() {
        prerender.concurrency = args.concurrency;
    }
    if let Some(timeout) = args.timeout {
        prerender.timeout_secs = timeout;
    }
    if let Some(policy) = args.cancel_policy {
        prerender.cancel_policy = policy;
    }
    if args.cache_dir.is_some() {
        prerender.cache_dir = args.cache_dir.clone();
    }

    let origin = args
        .origin
        .or_else(|| prerender.origin.clone())
        .context("No origin configured. Pass --origin or set prerender.origin in edge.toml")?;

    // Environment paths are read exactly once, here.
    let env_paths = match prerender.paths_env.as_deref() {
        Some(name) => match std::env::var(name) {
            Ok(value) => Some(value),
            Err(_) => {
                ctx.output.debug(&format!("{} is not set", name));
                None
            }
        },
        None => None,
    };

    let plan = ctx.config.plan(env_paths)?;
    if plan.is_empty() {
        bail!("Nothing to prerender. Add [[routes]] to edge.toml or set prerender.paths_env.");
    }

    let settings = prerender.settings();
    ctx.output.header("Prerendering");
    ctx.output.kv("Origin", &origin);
    ctx.output.kv("Tier", &settings.tier.to_string());
    ctx.output.kv("Concurrency", &settings.limits.concurrency.to_string());
    ctx.output
        .kv("Request cap", &settings.limits.total_request_cap.to_string());
    ctx.output.kv("Timeout", &format!("{}s", prerender.timeout_secs));
    ctx.output.kv("On cancel", &settings.cancel_policy.to_string());

    let cache_dir = ctx.cache_dir(prerender.cache_dir.as_deref());
    ctx.output.kv("Cache", &cache_dir.display().to_string());

    let pipeline = HttpPipeline::new(&origin, prerender.timeouts())
        .with_context(|| format!("Invalid origin: {}", origin))?;
    let executor = FetchExecutor::new(Arc::new(pipeline)).with_policy(prerender.fetch_policy());
    let backend = Arc::new(
        FileBackend::open(&cache_dir)
            .await
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?,
    );
    let reporter = Arc::new(ProgressReporter::new());
    let orchestrator = Orchestrator::new(settings, executor, CacheWriter::new(backend.clone()))
        .with_reporter(reporter.clone());

    let cancel = CancellationToken::new();
    let ctrl_c = watch_ctrl_c(cancel.clone(), ctx.output.clone());
    let done = CancellationToken::new();
    let progress = show_progress(
        ctx.output.clone(),
        reporter.clone(),
        reporter.subscribe(),
        done.clone(),
    );

    let result = orchestrator.run(&plan, cancel.clone()).await;
    ctrl_c.abort();
    done.cancel();
    log_task_panic("progress display", progress.await);

    let report = result.context("Prerender run aborted")?;

    let summary_path = match &args.summary_out {
        Some(path) => ctx.resolve_path(path),
        None => ctx
            .prerender_dir()?
            .join(format!("{}.json", report.run.id())),
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&summary_path, json)
        .with_context(|| format!("Failed to write summary: {}", summary_path.display()))?;
    tracing::info!(path = %summary_path.display(), "wrote run summary");

    let cached = backend
        .len()
        .await
        .with_context(|| format!("Failed to read cache at {}", cache_dir.display()))?;
    print_report(&ctx.output, &report, cached);
    ctx.output.kv("Summary", &summary_path.display().to_string());

    if cancel.is_cancelled() {
        ctx.output.warn("Run was cancelled; unfinished paths are marked cancelled");
    }

    let failed = report.run.counters().failed;
    if failed == 0 {
        ctx.output.success(&format!("Prerendered {} paths", report.run.total()));
    } else if args.strict {
        bail!("{} of {} paths failed", failed, report.run.total());
    } else {
        ctx.output.warn(&format!("{} of {} paths failed", failed, report.run.total()));
    }

    Ok(())
}

/// Log a panic from a finished helper task. Returns whether it panicked.
fn log_task_panic(task: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Err(err) if err.is_panic() => {
            tracing::warn!(task, error = %err, "task panicked");
            true
        }
        _ => false,
    }
}

fn watch_ctrl_c(cancel: CancellationToken, output: Output) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output.warn("Cancelling prerender run...");
            cancel.cancel();
        }
    })
}

fn show_progress(
    output: Output,
    reporter: Arc<ProgressReporter>,
    mut events: broadcast::Receiver<ProgressEvent>,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pb = output.progress(0, "enumerating");

        loop {
            let event = tokio::select! {
                _ = done.cancelled() => break,
                event = events.recv() => event,
            };

            let event = match event {
                Ok(event) => Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => None,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let snapshot = reporter.snapshot();
            pb.set_length(snapshot.total as u64);
            pb.set_position((snapshot.succeeded + snapshot.failed) as u64);

            if let Some(event) = event {
                pb.set_message(event.path.clone());
                if event.status == EventStatus::Failed {
                    pb.println(format!(
                        "  {} {} {}",
                        status_badge("failed"),
                        event.path,
                        event.error.unwrap_or_default()
                    ));
                }
            }
        }

        pb.finish_and_clear();
    })
}

fn print_report(output: &Output, report: &RunReport, cached: usize) {
    if output.is_json() {
        output.json(&report.summary);
        return;
    }

    let summary = &report.summary;
    output.header("Results");
    output.kv("Run", report.run.id().as_str());
    output.kv("Status", &status_badge(&summary.phase.to_string()));
    output.kv("Succeeded", &summary.succeeded.to_string());
    output.kv("Failed", &summary.failed.to_string());
    output.kv("Total", &summary.total.to_string());
    output.kv("Duration", &format_duration_ms(summary.duration_ms));
    output.kv("Fetches", &summary.timings.to_summary());
    output.kv("Cache entries", &cached.to_string());

    let warnings = report
        .run
        .entries()
        .iter()
        .filter(|e| {
            matches!(
                &e.outcome,
                RequestOutcome::Succeeded {
                    cache_warning: Some(_),
                    ..
                }
            )
        })
        .count();
    if warnings > 0 {
        output.warn(&format!("{} responses rendered but not cached", warnings));
    }

    let failures: Vec<_> = report.run.failures().collect();
    if failures.is_empty() {
        return;
    }

    output.info("");
    output.info("Failed paths:");
    for entry in failures.iter().take(MAX_LISTED_FAILURES) {
        let kind = entry
            .outcome
            .failure_kind()
            .map(|k| k.to_string())
            .unwrap_or_default();
        output.list_item(&format!(
            "{} [{}] {}",
            entry.request.path(),
            status_badge(&kind),
            entry.outcome.error_message().unwrap_or_default()
        ));
    }
    if failures.len() > MAX_LISTED_FAILURES {
        output.list_item(&format!(
            "... and {} more",
            failures.len() - MAX_LISTED_FAILURES
        ));
    }
}
