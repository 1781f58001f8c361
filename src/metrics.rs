//! Per-run accounting: counts, timing, CPU usage, and result validation.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use crate::coordinator::RunOutcome;
use crate::types::TaskId;

pub const CSV_HEADER: &str = "workers,tasks,results,failed,leftover,elapsed_ms,throughput_tasks_per_s,cpu_user_s,cpu_sys_s,completed,duplicate_results";

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
pub fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    // SAFETY: rusage is plain old data; an all-zero value is valid.
    let mut usage: rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
pub fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Aggregated metrics from a single pipeline run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub workers: usize,
    pub tasks: usize,
    pub results: usize,
    pub failed: usize,
    pub leftover: usize,
    pub elapsed_ms: f64,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
    pub completed: bool,
    pub duplicate_results: bool,
}

impl RunSummary {
    pub fn new(
        workers: usize,
        outcome: &RunOutcome,
        elapsed: Duration,
        cpu_start: Option<(f64, f64)>,
        cpu_end: Option<(f64, f64)>,
    ) -> Self {
        let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_end) {
            (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
                (Some(user_end - user_start), Some(sys_end - sys_start))
            }
            _ => (None, None),
        };
        let distinct: HashSet<TaskId> = outcome.results.iter().map(|r| r.task_id).collect();

        Self {
            workers,
            tasks: outcome.submitted,
            results: outcome.results.len(),
            failed: outcome.failed(),
            leftover: outcome.leftover,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            cpu_user_s,
            cpu_sys_s,
            completed: outcome.completed,
            duplicate_results: distinct.len() != outcome.results.len(),
        }
    }

    pub fn throughput(&self) -> f64 {
        if self.elapsed_ms > 0.0 {
            self.results as f64 / (self.elapsed_ms / 1000.0)
        } else {
            0.0
        }
    }

    /// Tasks that neither produced a result, failed, nor stayed queued.
    pub fn missing(&self) -> usize {
        self.tasks
            .saturating_sub(self.results + self.failed + self.leftover)
    }

    fn cpu_field(value: Option<f64>) -> String {
        value
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "NA".to_string())
    }

    /// Human-oriented block printed after a single run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "RUN SUMMARY");
        let _ = writeln!(out, "workers={} tasks={}", self.workers, self.tasks);
        let _ = writeln!(out, "results={}", self.results);
        let _ = writeln!(out, "failed={}", self.failed);
        let _ = writeln!(out, "leftover={}", self.leftover);
        let _ = writeln!(out, "completed={}", self.completed);
        let _ = writeln!(out, "duplicate_results={}", self.duplicate_results);
        let _ = writeln!(out, "elapsed_ms={:.2}", self.elapsed_ms);
        let _ = writeln!(out, "cpu_user_s={}", Self::cpu_field(self.cpu_user_s));
        let _ = write!(out, "cpu_sys_s={}", Self::cpu_field(self.cpu_sys_s));
        out
    }

    /// One row matching [`CSV_HEADER`].
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{:.2},{:.2},{},{},{},{}",
            self.workers,
            self.tasks,
            self.results,
            self.failed,
            self.leftover,
            self.elapsed_ms,
            self.throughput(),
            Self::cpu_field(self.cpu_user_s),
            Self::cpu_field(self.cpu_sys_s),
            self.completed,
            self.duplicate_results
        )
    }
}
