use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use neardup::config::{DEFAULT_DISTANCE_LIMIT, DEFAULT_PROJECTIONS, DEFAULT_SEED};
use neardup::core::{
    DuplicateFinder, ExtractOutcome, LshIndex, RecordStore, SearchReport, SrgbPreprocessor,
};
use neardup::{SearchConfig, SearchStrategy, scanner};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "neardup",
    version,
    about = "Find near-duplicate photos by perceptual fingerprint"
)]
struct Cli {
    /// Image files or directories; read one path per line from stdin if empty
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Largest Hamming distance (of 192 bits) reported as a duplicate
    #[arg(long, value_name = "BITS", default_value_t = DEFAULT_DISTANCE_LIMIT)]
    limit: u32,

    /// Number of random projections in the index
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PROJECTIONS)]
    projections: usize,

    /// Candidate window half-width (default: limit / 2)
    #[arg(long, value_name = "R")]
    radius: Option<f32>,

    /// Seed for the projection weights
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Compare every pair instead of querying the index
    #[arg(long)]
    exact: bool,

    /// Stop the duplicate search after this many seconds (partial result)
    #[arg(long, value_name = "SECS", value_parser = parse_deadline)]
    deadline: Option<Duration>,

    /// Worker threads (default: one per core)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Print pairs as JSON lines
    #[arg(long)]
    json: bool,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn search_config(&self) -> SearchConfig {
        SearchConfig {
            projections: self.projections,
            distance_limit: self.limit,
            radius: self.radius,
            seed: self.seed,
            strategy: if self.exact {
                SearchStrategy::Exhaustive
            } else {
                SearchStrategy::Projections
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.search_config();
    config.validate().context("Invalid search parameters")?;

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    let show_progress = !cli.quiet;
    let paths = if cli.paths.is_empty() {
        scanner::read_path_list(io::stdin().lock()).context("Failed to read paths from stdin")?
    } else {
        scanner::collect_inputs(&cli.paths, show_progress)?
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    // Inputs named on the command line are numbered; a stdin stream is not.
    let numbered = !cli.paths.is_empty();
    let store = benchmark("fingerprinting", || {
        fingerprint_all(&paths, show_progress, numbered, &mut out)
    })?;
    log::info!("{} of {} images fingerprinted", store.len(), paths.len());

    let mut finder = DuplicateFinder::from_config(&config);
    let report = match config.strategy {
        SearchStrategy::Projections => {
            let index = benchmark("building index", || LshIndex::build(&store, &config));
            if let Some(deadline) = deadline_from(cli.deadline) {
                finder = finder.with_deadline(deadline);
            }
            benchmark("searching", || finder.search(&store, &index))
        }
        SearchStrategy::Exhaustive => {
            if let Some(deadline) = deadline_from(cli.deadline) {
                finder = finder.with_deadline(deadline);
            }
            benchmark("exhaustive search", || finder.search_exhaustive(&store))
        }
    };

    write_report(&mut out, &store, &report, cli.json)?;
    out.flush().context("Failed to write output")?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Fingerprint every input, printing one status line per input in input
/// order.
fn fingerprint_all<W: Write>(
    paths: &[PathBuf],
    show_progress: bool,
    numbered: bool,
    out: &mut W,
) -> Result<RecordStore> {
    let progress = if show_progress {
        ProgressBar::new(paths.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    progress.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )?);
    progress.set_message("fingerprinting");

    let mut store = RecordStore::new();
    let outcomes = store.extract_all(paths, &SrgbPreprocessor::new(), |_| progress.inc(1));
    progress.finish_and_clear();

    let total = outcomes.len();
    for (i, outcome) in outcomes.iter().enumerate() {
        let counter = numbered.then_some((i + 1, total));
        writeln!(out, "{}", status_line(outcome, counter))?;
    }
    Ok(store)
}

/// `Processing <path> (<w>x<h>)`, or the skip notice for a failed input,
/// prefixed with `(i/n) ` when a counter is given.
fn status_line(outcome: &ExtractOutcome, counter: Option<(usize, usize)>) -> String {
    let prefix = match counter {
        Some((i, n)) => format!("({i}/{n}) "),
        None => String::new(),
    };
    match &outcome.result {
        Ok(extracted) => format!(
            "{prefix}Processing {} ({}x{})",
            outcome.path.display(),
            extracted.width,
            extracted.height
        ),
        Err(e) => format!(
            "{prefix}Processing {} -- cannot open ({}), ignoring",
            outcome.path.display(),
            e
        ),
    }
}

fn write_report<W: Write>(
    out: &mut W,
    store: &RecordStore,
    report: &SearchReport,
    json: bool,
) -> Result<()> {
    for pair in &report.pairs {
        let line = pair.describe(store);
        if json {
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        } else {
            writeln!(out, "{line}")?;
        }
    }

    let stats = &report.stats;
    log::info!(
        "{} pairs from {} queries, mean window {:.1}, {} distance checks",
        report.pairs.len(),
        stats.queries,
        stats.mean_window(),
        stats.verified
    );
    if !stats.is_complete() {
        log::warn!(
            "Deadline reached: {} of {} records were not searched; results are partial",
            stats.skipped,
            stats.queries + stats.skipped
        );
    }
    Ok(())
}

/// Seconds as a finite, non-negative number; anything else is a usage error.
fn parse_deadline(arg: &str) -> Result<Duration, String> {
    let seconds: f64 = arg
        .parse()
        .map_err(|_| format!("`{arg}` is not a number of seconds"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("`{arg}` must be a finite, non-negative number of seconds"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("`{arg}`: {e}"))
}

fn deadline_from(budget: Option<Duration>) -> Option<Instant> {
    Instant::now().checked_add(budget?)
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use neardup::core::{Extracted, PreprocessError};

    #[test]
    fn test_deadline_accepts_non_negative_seconds() {
        let cli = Cli::try_parse_from(["neardup", "--deadline", "2.5", "a.jpg"]).unwrap();
        assert_eq!(cli.deadline, Some(Duration::from_millis(2500)));

        let cli = Cli::try_parse_from(["neardup", "--deadline", "0", "a.jpg"]).unwrap();
        assert_eq!(cli.deadline, Some(Duration::ZERO));
    }

    #[test]
    fn test_deadline_rejects_negative_and_non_finite_values() {
        for bad in ["-1", "NaN", "inf", "soon"] {
            let arg = format!("--deadline={bad}");
            assert!(
                Cli::try_parse_from(["neardup", arg.as_str(), "a.jpg"]).is_err(),
                "{bad} was accepted"
            );
        }
    }

    #[test]
    fn test_status_lines_are_numbered_for_arguments() {
        let ok = ExtractOutcome {
            path: PathBuf::from("a.jpg"),
            result: Ok(Extracted {
                record_id: 0,
                width: 640,
                height: 480,
            }),
        };
        let failed = ExtractOutcome {
            path: PathBuf::from("b.jpg"),
            result: Err(PreprocessError::Empty {
                path: "b.jpg".to_string(),
            }),
        };

        assert_eq!(
            status_line(&ok, Some((1, 2))),
            "(1/2) Processing a.jpg (640x480)"
        );
        assert_eq!(status_line(&ok, None), "Processing a.jpg (640x480)");
        assert_eq!(
            status_line(&failed, Some((2, 2))),
            "(2/2) Processing b.jpg -- cannot open (Image has no pixels: b.jpg), ignoring"
        );
    }
}
