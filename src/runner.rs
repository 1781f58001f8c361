//! Single-run and stress-sweep entry points used by the CLI.

use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::coordinator::{self, PipelineConfig};
use crate::error::PipelineError;
use crate::metrics::{self, CSV_HEADER, RunSummary};
use crate::storage;

const DEFAULT_STRESS_WORKERS: [usize; 4] = [1, 2, 4, 8];
const DEFAULT_STRESS_TASKS: [usize; 3] = [10, 50, 200];
const DEFAULT_STRESS_WORK_MS: u64 = 5;
// Slack added on top of the ideal schedule before a stress run gives up.
const STRESS_WAIT_SLACK_MS: u64 = 2000;

fn measure(
    config: &PipelineConfig,
) -> Result<(coordinator::RunOutcome, RunSummary), PipelineError> {
    let cpu_start = metrics::cpu_times_seconds();
    let start = Instant::now();
    let outcome = coordinator::run(config)?;
    let summary = RunSummary::new(
        config.workers,
        &outcome,
        start.elapsed(),
        cpu_start,
        metrics::cpu_times_seconds(),
    );
    Ok((outcome, summary))
}

/// Run once, persist the results, and print a summary.
///
/// A failed write is reported but does not fail the run.
pub fn run_once(config: &PipelineConfig) -> Result<RunSummary, PipelineError> {
    info!(
        workers = config.workers,
        tasks = config.tasks,
        work_ms = config.work.as_millis() as u64,
        "starting run"
    );
    let (outcome, summary) = measure(config)?;
    for report in &outcome.reports {
        info!(
            worker = %report.name,
            processed = report.processed,
            failed = report.failed,
            exit = ?report.exit,
            "worker report"
        );
    }

    match storage::write_results(&config.output, &outcome.results) {
        Ok(()) => info!(
            path = %config.output.display(),
            lines = outcome.results.len(),
            "results written"
        ),
        Err(err) => {
            error!(error = %err, "persisting results failed");
            eprintln!("File error: {err}");
        }
    }

    println!("{}", summary.render());
    println!("output={}", config.output.display());
    Ok(summary)
}

/// Time budget for one stress configuration, saturating at `Duration::MAX`.
fn stress_wait(workers: usize, tasks: usize, work: Duration) -> Duration {
    let rounds = u32::try_from(tasks.div_ceil(workers.max(1))).unwrap_or(u32::MAX);
    work.saturating_mul(rounds)
        .saturating_mul(2)
        .saturating_add(Duration::from_millis(STRESS_WAIT_SLACK_MS))
}

/// Sweep worker and task counts and print one CSV row per run.
pub fn run_stress(
    worker_sets: Option<Vec<usize>>,
    task_sets: Option<Vec<usize>>,
    work_ms: Option<u64>,
) -> Result<(), PipelineError> {
    let worker_sets = worker_sets.unwrap_or_else(|| DEFAULT_STRESS_WORKERS.to_vec());
    let task_sets = task_sets.unwrap_or_else(|| DEFAULT_STRESS_TASKS.to_vec());
    let work = Duration::from_millis(work_ms.unwrap_or(DEFAULT_STRESS_WORK_MS));
    if worker_sets.iter().any(|&workers| workers == 0) {
        eprintln!("stress error: worker_sets must be > 0");
        return Ok(());
    }

    println!("{CSV_HEADER}");
    for workers in worker_sets {
        for tasks in task_sets.iter().copied() {
            let config = PipelineConfig {
                workers,
                tasks,
                work,
                max_wait: stress_wait(workers, tasks, work),
                ..PipelineConfig::default()
            };
            let (_, summary) = measure(&config)?;
            println!("{}", summary.csv_row());
            if summary.leftover > 0 {
                eprintln!("# warning,leftover_tasks,{}", summary.leftover);
            }
            if summary.duplicate_results {
                eprintln!("# violation,duplicate_results");
            }
            if summary.missing() > 0 {
                eprintln!("# violation,missing_results,{}", summary.missing());
            }
        }
    }
    Ok(())
}
