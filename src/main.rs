mod coordinator;
mod error;
mod logging;
mod metrics;
mod result_sink;
mod runner;
mod shutdown;
mod storage;
mod task_queue;
mod types;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use coordinator::PipelineConfig;

fn parse_usize_list(arg: &str) -> Option<Vec<usize>> {
    if arg == "-" {
        return None;
    }
    let mut values = Vec::new();
    for part in arg.split(',') {
        if part.trim().is_empty() {
            return None;
        }
        let value = part.trim().parse::<usize>().ok()?;
        values.push(value);
    }
    Some(values)
}

fn print_usage(program: &str) {
    println!("Task Pipeline CLI");
    println!("Usage:");
    println!("  {program} [workers] [tasks] [work_ms] [max_wait_ms] [output]");
    println!("  {program} stress [worker_sets] [task_sets] [work_ms]");
    println!("  {program} --help");
    println!();
    println!("Use \"-\" to keep the default for a positional value.");
    println!("Sets are comma-separated lists (e.g., 1,2,4).");
    println!("Defaults:");
    println!("  run    workers=4 tasks=10 work_ms=200 max_wait_ms=2000 output=results.txt");
    println!("  stress workers=1,2,4,8 tasks=10,50,200 work_ms=5");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

/// Parse an optional positional number; `-` keeps the default.
fn parse_number<T: std::str::FromStr>(program: &str, name: &str, arg: Option<String>) -> Option<T> {
    match arg.as_deref() {
        None | Some("-") => None,
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => exit_with_usage(program, &format!("invalid {name} value: {value}")),
        },
    }
}

fn run_config(program: &str, args: Vec<String>) -> PipelineConfig {
    if args.len() > 5 {
        exit_with_usage(program, &format!("unexpected argument: {}", args[5]));
    }
    let mut args = args.into_iter();
    let mut config = PipelineConfig::default();
    if let Some(workers) = parse_number(program, "workers", args.next()) {
        config.workers = workers;
    }
    if let Some(tasks) = parse_number(program, "tasks", args.next()) {
        config.tasks = tasks;
    }
    if let Some(work_ms) = parse_number::<u64>(program, "work_ms", args.next()) {
        config.work = Duration::from_millis(work_ms);
    }
    if let Some(max_wait_ms) = parse_number::<u64>(program, "max_wait_ms", args.next()) {
        config.max_wait = Duration::from_millis(max_wait_ms);
    }
    if let Some(output) = args.next().filter(|arg| arg != "-") {
        config.output = PathBuf::from(output);
    }
    config
}

fn main() {
    logging::init();

    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "task_pipeline".to_string());
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = args.first().cloned();
    let outcome = match command.as_deref() {
        Some("--help") | Some("-h") | Some("help") => {
            print_usage(&program);
            return;
        }
        Some("stress") => {
            let mut rest = args.into_iter().skip(1);
            let mut list = |name: &str| {
                rest.next().and_then(|arg| {
                    if arg == "-" {
                        return None;
                    }
                    match parse_usize_list(&arg) {
                        Some(values) => Some(values),
                        None => exit_with_usage(
                            &program,
                            &format!("stress: invalid {name} value: {arg}"),
                        ),
                    }
                })
            };
            let worker_sets = list("worker_sets");
            let task_sets = list("task_sets");
            let work_ms = parse_number::<u64>(&program, "work_ms", rest.next());
            if let Some(extra) = rest.next() {
                exit_with_usage(&program, &format!("stress: unexpected argument: {extra}"));
            }
            runner::run_stress(worker_sets, task_sets, work_ms)
        }
        _ => {
            let config = run_config(&program, args);
            runner::run_once(&config).map(|_| ())
        }
    };

    if let Err(err) = outcome {
        tracing::error!(error = %err, "run failed");
        eprintln!("run failed: {err}");
        std::process::exit(1);
    }
}
