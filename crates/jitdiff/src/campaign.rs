//! Campaign driver.
//!
//! Distributes independent generate-execute-compare iterations across N
//! worker threads over bounded crossbeam channels for backpressure.  Each
//! worker owns a scratch directory for staged artifacts and a
//! current-thread tokio runtime that drives the per-execution process
//! spawning and timeout watchdog.  Results are collected on the calling
//! thread, which owns the `Campaign` state exclusively.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use colored::Colorize;
use crossbeam_channel::bounded;
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{error, info};

use jitdiff_gen::{GeneratedProgram, Generator, GeneratorConfig};

use crate::backend::Backend;
use crate::compare::{EqualityRules, Verdict, compare};
use crate::error::{HarnessError, Result};
use crate::report::{CampaignSummary, DivergenceCase, ProfileStats};

/// Shared configuration for one campaign.
///
/// Wrapped in `Arc` so workers can reference it without cloning every field.
pub struct CampaignConfig {
    /// Iterations requested
    pub iterations: u64,
    /// First seed; iteration `i` uses `seed_start + i`
    pub seed_start: u64,
    /// Worker thread count
    pub jobs: usize,
    /// Hard wall-clock deadline per backend execution
    pub timeout: Duration,
    /// Optional wall-clock budget for the whole campaign
    pub time_budget: Option<Duration>,
    /// Stop issuing new iterations after the first recorded divergence
    pub stop_on_divergence: bool,
    /// Output equality rules for the comparator
    pub rules: EqualityRules,
    /// Output directory (divergence cases go to `<out_dir>/cases`)
    pub out_dir: PathBuf,
    /// Optional path for the JSONL iteration log
    pub log_path: Option<PathBuf>,
    /// Append to the log file instead of truncating at run start
    pub log_append: bool,
    /// Suppress non-JSON output when true
    pub json_mode: bool,
    /// Verbosity level (mirrors the CLI `-v` count)
    pub verbose: u8,
    /// Generation profiles, cycled round-robin by iteration index
    pub profiles: Vec<GeneratorConfig>,
}

/// Accumulated campaign state.
///
/// Owned by the collector for the duration of the run and finalized (no
/// further mutation) when the campaign ends.
#[derive(Debug)]
pub struct Campaign {
    /// Iterations requested
    pub requested: u64,
    /// Iterations completed (including skipped ones)
    pub completed: u64,
    /// Agreeing iterations
    pub agreed: u64,
    /// Diverging iterations
    pub diverged: u64,
    /// Inconclusive iterations
    pub inconclusive: u64,
    /// Iterations skipped due to generation errors
    pub skipped: u64,
    /// Recorded divergences
    pub divergences: Vec<DivergenceCase>,
    /// Per-profile counters
    pub by_profile: std::collections::HashMap<String, ProfileStats>,
    /// Harness-infrastructure failure that aborted the campaign, if any
    pub fatal: Option<String>,
    /// Campaign start time
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl Campaign {
    fn new(requested: u64) -> Self {
        Self {
            requested,
            completed: 0,
            agreed: 0,
            diverged: 0,
            inconclusive: 0,
            skipped: 0,
            divergences: Vec::new(),
            by_profile: std::collections::HashMap::new(),
            fatal: None,
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Build the final summary.
    pub fn summary(&self) -> CampaignSummary {
        CampaignSummary {
            requested: self.requested,
            completed: self.completed,
            agreed: self.agreed,
            diverged: self.diverged,
            inconclusive: self.inconclusive,
            skipped: self.skipped,
            duration_ms: self.duration.as_millis() as u64,
            started_at: self.started_at,
            by_profile: self.by_profile.clone(),
            fatal: self.fatal.clone(),
        }
    }

    /// Process exit code reflecting the overall verdict.
    pub fn exit_code(&self) -> i32 {
        if self.fatal.is_some() {
            2
        } else if self.diverged > 0 {
            1
        } else {
            0
        }
    }
}

/// One iteration's outcome, sent from a worker to the collector.
enum IterationOutcome {
    Compared {
        seed: u64,
        profile: String,
        config: GeneratorConfig,
        class_name: String,
        artifact: Vec<u8>,
        verdict: Verdict,
        results: Vec<crate::backend::ExecutionResult>,
    },
    Skipped {
        seed: u64,
        profile: String,
        error: String,
    },
    Fatal {
        seed: u64,
        error: String,
    },
}

#[derive(Serialize)]
struct IterationRecord<'a> {
    seed: u64,
    profile: &'a str,
    verdict: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Run a campaign to completion.
///
/// Blocks until every in-flight iteration has finished.  `cancel` may be
/// set from outside to ask the driver to stop; queued but unstarted seeds
/// are then discarded and no new iterations begin.
pub fn run_campaign(
    config: Arc<CampaignConfig>,
    generator: Arc<Generator>,
    backends: Arc<Vec<Backend>>,
    pb: Option<ProgressBar>,
    cancel: Arc<AtomicBool>,
) -> Result<Campaign> {
    if config.profiles.is_empty() {
        return Err(HarnessError::Config("no generation profiles enabled".into()));
    }
    if backends.is_empty() {
        return Err(HarnessError::Config("no execution backends configured".into()));
    }
    let cases_dir = config.out_dir.join("cases");
    std::fs::create_dir_all(&cases_dir)?;

    info!(
        iterations = config.iterations,
        jobs = config.jobs,
        backends = backends.len(),
        "starting campaign"
    );

    let (job_tx, job_rx) = bounded::<u64>(config.jobs * 4);
    let (result_tx, result_rx) = bounded::<IterationOutcome>(config.jobs * 8);

    let mut handles = Vec::with_capacity(config.jobs);
    for i in 0..config.jobs {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let cfg = Arc::clone(&config);
        let generator = Arc::clone(&generator);
        let backends = Arc::clone(&backends);
        let cancel = Arc::clone(&cancel);

        let handle = std::thread::Builder::new()
            .name(format!("jitdiff-worker-{i}"))
            .spawn(move || worker_main(job_rx, result_tx, cfg, generator, backends, cancel))
            .map_err(|e| HarnessError::DriverFatal(format!("failed to spawn worker {i}: {e}")))?;
        handles.push(handle);
    }

    // The channel closes when all workers finish and drop their own copies.
    drop(result_tx);

    // Feeder thread: derives fresh seeds from the monotonically increasing
    // iteration counter and stops at the configured bounds.
    let feeder = {
        let cfg = Arc::clone(&config);
        let cancel = Arc::clone(&cancel);
        let deadline = config.time_budget.map(|b| Instant::now() + b);
        std::thread::spawn(move || {
            for i in 0..cfg.iterations {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    cancel.store(true, Ordering::Relaxed);
                    break;
                }
                if job_tx.send(cfg.seed_start + i).is_err() {
                    break; // collector disconnected
                }
            }
            // Drop job_tx so workers exit their loops.
        })
    };

    let mut log_writer: Option<BufWriter<std::fs::File>> =
        config.log_path.as_ref().and_then(|p| {
            if let Some(parent) = p.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(!config.log_append)
                .append(config.log_append)
                .open(p)
                .ok()
                .map(BufWriter::new)
        });

    let start = Instant::now();
    let mut campaign = Campaign::new(config.iterations);

    for outcome in &result_rx {
        record_outcome(
            &mut campaign,
            outcome,
            &config,
            &cases_dir,
            &cancel,
            log_writer.as_mut(),
        );

        if let Some(ref pb) = pb {
            pb.inc(1);
            pb.set_message(format!(
                "agree {} / diverge {} / inconclusive {} / skipped {}",
                campaign.agreed, campaign.diverged, campaign.inconclusive, campaign.skipped
            ));
        }
    }

    if let Some(ref mut writer) = log_writer {
        let _ = writer.flush();
    }
    if config.verbose == 1 && !config.json_mode {
        eprintln!();
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let _ = feeder.join();
    for handle in handles {
        if let Err(e) = handle.join() {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = e.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown".to_string()
            };
            error!(panic = %msg, "worker thread panicked");
        }
    }

    campaign.duration = start.elapsed();
    Ok(campaign)
}

fn record_outcome(
    campaign: &mut Campaign,
    outcome: IterationOutcome,
    config: &CampaignConfig,
    cases_dir: &Path,
    cancel: &AtomicBool,
    log_writer: Option<&mut BufWriter<std::fs::File>>,
) {
    campaign.completed += 1;

    let (seed, profile, verdict_str, error_msg) = match &outcome {
        IterationOutcome::Compared { seed, profile, verdict, .. } => {
            let s = match verdict {
                Verdict::Agree => "agree",
                Verdict::Diverge => "diverge",
                Verdict::Inconclusive => "inconclusive",
            };
            (*seed, profile.clone(), s, None)
        }
        IterationOutcome::Skipped { seed, profile, error } => {
            (*seed, profile.clone(), "skipped", Some(error.clone()))
        }
        IterationOutcome::Fatal { seed, error } => (*seed, String::new(), "fatal", Some(error.clone())),
    };

    if let Some(writer) = log_writer {
        let record = IterationRecord {
            seed,
            profile: &profile,
            verdict: verdict_str,
            error: error_msg.as_deref(),
        };
        if let Ok(line) = serde_json::to_string(&record) {
            let _ = writeln!(writer, "{line}");
        }
    }

    if !config.json_mode && config.verbose >= 1 {
        print_progress(campaign, verdict_str, seed, &profile, error_msg.as_deref(), config.verbose);
    }

    if !profile.is_empty() {
        campaign.by_profile.entry(profile.clone()).or_default().total += 1;
    }
    let bump = |by_profile: &mut std::collections::HashMap<String, ProfileStats>,
                apply: fn(&mut ProfileStats)| {
        if let Some(stats) = by_profile.get_mut(&profile) {
            apply(stats);
        }
    };

    match outcome {
        IterationOutcome::Compared {
            seed,
            config: gen_config,
            class_name,
            artifact,
            verdict,
            results,
            ..
        } => match verdict {
            Verdict::Agree => {
                campaign.agreed += 1;
                bump(&mut campaign.by_profile, |s| s.agreed += 1);
            }
            Verdict::Inconclusive => {
                campaign.inconclusive += 1;
                bump(&mut campaign.by_profile, |s| s.inconclusive += 1);
            }
            Verdict::Diverge => {
                campaign.diverged += 1;
                bump(&mut campaign.by_profile, |s| s.diverged += 1);
                let case = DivergenceCase::new(seed, gen_config, class_name, &artifact, results);
                match case.persist(cases_dir, &artifact) {
                    Ok(path) => info!(seed, path = %path.display(), "divergence recorded"),
                    Err(e) => error!(seed, error = %e, "failed to persist divergence case"),
                }
                campaign.divergences.push(case);
                if config.stop_on_divergence {
                    cancel.store(true, Ordering::Relaxed);
                }
            }
        },
        IterationOutcome::Skipped { .. } => {
            campaign.skipped += 1;
            bump(&mut campaign.by_profile, |s| s.skipped += 1);
        }
        IterationOutcome::Fatal { error, .. } => {
            // Counted as completed but aborts the run; the summary still
            // finalizes so partial results are never lost.
            campaign.fatal = Some(error);
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

fn print_progress(
    campaign: &Campaign,
    verdict: &str,
    seed: u64,
    profile: &str,
    error: Option<&str>,
    verbose: u8,
) {
    if verbose == 1 {
        let ch = match verdict {
            "agree" => ".".green().to_string(),
            "diverge" => "D".red().bold().to_string(),
            "inconclusive" => "I".yellow().to_string(),
            "skipped" => "S".dimmed().to_string(),
            _ => "!".red().bold().to_string(),
        };
        eprint!("{ch}");
        if campaign.completed % 80 == 79 {
            eprintln!();
        }
    } else {
        let status = match verdict {
            "agree" => "AGREE".green().to_string(),
            "diverge" => "DIVERGE".red().bold().to_string(),
            "inconclusive" => "INCONCLUSIVE".yellow().to_string(),
            "skipped" => "SKIP".dimmed().to_string(),
            _ => "FATAL".red().bold().to_string(),
        };
        match error {
            Some(e) => eprintln!("[{status}] seed {seed} ({profile}) {e}"),
            None => eprintln!("[{status}] seed {seed} ({profile})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-worker logic
// ---------------------------------------------------------------------------

fn worker_main(
    job_rx: crossbeam_channel::Receiver<u64>,
    result_tx: crossbeam_channel::Sender<IterationOutcome>,
    config: Arc<CampaignConfig>,
    generator: Arc<Generator>,
    backends: Arc<Vec<Backend>>,
    cancel: Arc<AtomicBool>,
) {
    // Worker-confined runtime; process waits and the timeout watchdog are
    // the only suspension points, so a current-thread runtime suffices.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            cancel.store(true, Ordering::Relaxed);
            let _ = result_tx.send(IterationOutcome::Fatal {
                seed: 0,
                error: format!("cannot build worker runtime: {e}"),
            });
            return;
        }
    };

    let scratch = match tempfile::Builder::new().prefix("jitdiff-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            cancel.store(true, Ordering::Relaxed);
            let _ = result_tx.send(IterationOutcome::Fatal {
                seed: 0,
                error: format!("cannot create scratch directory: {e}"),
            });
            return;
        }
    };

    for seed in &job_rx {
        if cancel.load(Ordering::Relaxed) {
            // Discard queued seeds; in-flight iterations elsewhere finish
            // on their own.
            continue;
        }
        let outcome = run_iteration(&rt, scratch.path(), seed, &config, &generator, &backends);
        if matches!(outcome, IterationOutcome::Fatal { .. }) {
            cancel.store(true, Ordering::Relaxed);
        }
        if result_tx.send(outcome).is_err() {
            break; // collector disconnected
        }
    }
}

fn run_iteration(
    rt: &tokio::runtime::Runtime,
    scratch: &Path,
    seed: u64,
    config: &CampaignConfig,
    generator: &Generator,
    backends: &[Backend],
) -> IterationOutcome {
    let index = ((seed - config.seed_start) % config.profiles.len() as u64) as usize;
    let gen_config = &config.profiles[index];

    let program: GeneratedProgram = match generator.generate(seed, gen_config) {
        Ok(p) => p,
        Err(e) => {
            return IterationOutcome::Skipped {
                seed,
                profile: gen_config.profile.clone(),
                error: e.to_string(),
            };
        }
    };

    let class_path = scratch.join(format!("{}.class", program.class_name));
    if let Err(e) = std::fs::write(&class_path, &program.bytes) {
        return IterationOutcome::Fatal {
            seed,
            error: format!("cannot stage artifact: {e}"),
        };
    }

    let mut results = Vec::with_capacity(backends.len());
    for backend in backends {
        match rt.block_on(backend.execute(&program, scratch, config.timeout)) {
            Ok(result) => results.push(result),
            Err(e) => {
                let _ = std::fs::remove_file(&class_path);
                return IterationOutcome::Fatal { seed, error: e.to_string() };
            }
        }
    }
    let _ = std::fs::remove_file(&class_path);

    let verdict = compare(&results, &config.rules);
    IterationOutcome::Compared {
        seed,
        profile: program.config.profile.clone(),
        config: program.config,
        class_name: program.class_name,
        artifact: program.bytes,
        verdict: verdict.verdict,
        results,
    }
}
