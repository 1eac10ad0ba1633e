use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::filter::EnvFilter;

use jitdiff::campaign::{CampaignConfig, run_campaign};
use jitdiff::compare::{Verdict, compare};
use jitdiff::config::HarnessConfig;
use jitdiff::report::DivergenceCase;
use jitdiff_gen::{GeneratedProgram, profile};

#[derive(Parser, Debug)]
#[command(name = "jitdiff")]
#[command(about = "Differential testing harness for JVM JIT compilers")]
struct Cli {
    /// Path to the harness config file (default: jitdiff.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v per-iteration markers, -vv full lines)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fuzzing campaign
    Run(RunArgs),
    /// Replay a persisted divergence case
    Replay(ReplayArgs),
    /// List the built-in generation profiles
    Profiles,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Number of iterations
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Worker thread count
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-execution timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// First seed of the campaign
    #[arg(long)]
    seed_start: Option<u64>,

    /// Stop after the first recorded divergence
    #[arg(long)]
    stop_on_divergence: bool,

    /// Wall-clock budget in seconds for the whole campaign
    #[arg(long)]
    time_budget: Option<u64>,

    /// Output directory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Emit the summary as JSON and suppress decoration
    #[arg(long)]
    json: bool,

    /// Path for the JSONL iteration log
    #[arg(long)]
    log: Option<PathBuf>,

    /// Use the synthetic backend pair instead of JVMs (harness self-test)
    #[arg(long)]
    synthetic: bool,

    /// Extra argument forwarded verbatim to every JVM invocation
    /// (repeatable)
    #[arg(long = "jvm-arg", value_name = "ARG")]
    jvm_args: Vec<String>,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Path to a persisted case.json
    case: PathBuf,

    /// Per-execution timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Use the synthetic backend pair instead of JVMs
    #[arg(long)]
    synthetic: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = HarnessConfig::load_or_default(cli.config.as_deref());

    let code = match cli.command {
        Command::Run(args) => run(config, args, cli.verbose),
        Command::Replay(args) => replay(config, args),
        Command::Profiles => profiles(),
    };
    std::process::exit(code);
}

fn run(mut config: HarnessConfig, args: RunArgs, verbose: u8) -> i32 {
    if let Some(n) = args.iterations {
        config.iterations = n;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = Some(jobs);
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    if let Some(seed) = args.seed_start {
        config.seed_start = seed;
    }
    if args.stop_on_divergence {
        config.stop_on_divergence = true;
    }
    if let Some(budget) = args.time_budget {
        config.time_budget_secs = Some(budget);
    }
    if let Some(out) = args.out {
        config.out_dir = out;
    }
    if let Some(log) = args.log {
        config.log_path = Some(log);
    }
    config.jvm_args.extend(args.jvm_args);

    let jobs = config.jobs.unwrap_or_else(num_cpus::get);

    if !args.json {
        println!("{}", "jitdiff campaign".bold().cyan());
        println!(
            "Iterations: {}  Jobs: {}  Backends: {}",
            config.iterations,
            jobs,
            if args.synthetic {
                "synthetic".to_string()
            } else {
                config.backends.join(", ")
            }
        );
        println!("Output: {}", config.out_dir.display());
    }

    if let Err(e) = std::fs::create_dir_all(&config.out_dir) {
        eprintln!("{} cannot create output directory: {e}", "error:".red().bold());
        return 2;
    }

    let gen_work = config.out_dir.join("gen-work");
    if let Err(e) = std::fs::create_dir_all(&gen_work) {
        eprintln!("{} cannot create generator work directory: {e}", "error:".red().bold());
        return 2;
    }

    let (generator, backends, profiles) = match (
        config.build_generator(&gen_work),
        config.build_backends(args.synthetic),
        config.resolve_profiles(),
    ) {
        (Ok(g), Ok(b), Ok(p)) => (g, b, p),
        (g, b, p) => {
            for e in [g.err(), b.err(), p.err()].into_iter().flatten() {
                eprintln!("{} {e}", "error:".red().bold());
            }
            return 2;
        }
    };

    let pb = if !args.json && verbose == 0 {
        let pb = ProgressBar::new(config.iterations);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        ) {
            pb.set_style(style.progress_chars("##-"));
        }
        Some(pb)
    } else {
        None
    };

    let campaign_config = CampaignConfig {
        iterations: config.iterations,
        seed_start: config.seed_start,
        jobs,
        timeout: Duration::from_secs(config.timeout_secs),
        time_budget: config.time_budget_secs.map(Duration::from_secs),
        stop_on_divergence: config.stop_on_divergence,
        rules: config.rules.clone(),
        out_dir: config.out_dir.clone(),
        log_path: config.log_path.clone(),
        log_append: config.log_append,
        json_mode: args.json,
        verbose,
        profiles,
    };

    let campaign = match run_campaign(
        Arc::new(campaign_config),
        Arc::new(generator),
        Arc::new(backends),
        pb,
        Arc::new(AtomicBool::new(false)),
    ) {
        Ok(campaign) => campaign,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return 2;
        }
    };

    let summary = campaign.summary();
    match summary.to_json() {
        Ok(json) => {
            if args.json {
                println!("{json}");
            }
            if let Err(e) = std::fs::write(config.out_dir.join("summary.json"), json) {
                eprintln!("Warning: failed to write summary.json: {e}");
            }
        }
        Err(e) => eprintln!("Warning: failed to serialize summary: {e}"),
    }
    if !args.json {
        summary.print();
        if campaign.diverged > 0 {
            println!(
                "\n{} {} divergence case(s) under {}",
                "Recorded".red().bold(),
                campaign.diverged,
                config.out_dir.join("cases").display()
            );
        }
    }

    campaign.exit_code()
}

fn replay(mut config: HarnessConfig, args: ReplayArgs) -> i32 {
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }

    let case = match DivergenceCase::load(&args.case) {
        Ok(case) => case,
        Err(e) => {
            eprintln!("{} cannot load case '{}': {e}", "error:".red().bold(), args.case.display());
            return 2;
        }
    };

    println!(
        "{} seed {} class {} ({} recorded results)",
        "Replaying".bold().cyan(),
        case.seed,
        case.class_name,
        case.results.len()
    );

    let scratch = match tempfile::Builder::new().prefix("jitdiff-replay-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{} cannot create scratch directory: {e}", "error:".red().bold());
            return 2;
        }
    };

    let generator = match config.build_generator(scratch.path()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return 2;
        }
    };

    // Regenerate from the persisted seed/config; fall back to the stored
    // artifact when the generator no longer reproduces the digest.
    let program = match generator.generate(case.seed, &case.config) {
        Ok(program) if format!("{:016x}", program.digest()) == case.artifact_digest => {
            println!("Artifact regenerated, digest {} verified", case.artifact_digest);
            program
        }
        other => {
            if let Ok(program) = other {
                eprintln!(
                    "Warning: regenerated digest {:016x} differs from recorded {}; using stored artifact",
                    program.digest(),
                    case.artifact_digest
                );
            } else if let Err(e) = other {
                eprintln!("Warning: regeneration failed ({e}); using stored artifact");
            }
            match case.load_artifact(&args.case) {
                Ok(bytes) => GeneratedProgram {
                    seed: case.seed,
                    config: case.config.clone(),
                    class_name: case.class_name.clone(),
                    bytes,
                },
                Err(e) => {
                    eprintln!("{} cannot read stored artifact: {e}", "error:".red().bold());
                    return 2;
                }
            }
        }
    };

    let backends = match config.build_backends(args.synthetic) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return 2;
        }
    };

    let class_path = scratch.path().join(format!("{}.class", program.class_name));
    if let Err(e) = std::fs::write(&class_path, &program.bytes) {
        eprintln!("{} cannot stage artifact: {e}", "error:".red().bold());
        return 2;
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} cannot build runtime: {e}", "error:".red().bold());
            return 2;
        }
    };

    let timeout = Duration::from_secs(config.timeout_secs);
    let mut results = Vec::with_capacity(backends.len());
    for backend in &backends {
        match rt.block_on(backend.execute(&program, scratch.path(), timeout)) {
            Ok(result) => {
                print_result(&result);
                results.push(result);
            }
            Err(e) => {
                eprintln!("{} {e}", "error:".red().bold());
                return 2;
            }
        }
    }

    let verdict = compare(&results, &config.rules);
    match verdict.verdict {
        Verdict::Agree => {
            println!("\n{}", "AGREE: divergence did not reproduce".green().bold());
            0
        }
        Verdict::Diverge => {
            println!(
                "\n{} (backends: {})",
                "DIVERGE: reproduced".red().bold(),
                verdict.disagreeing.join(", ")
            );
            1
        }
        Verdict::Inconclusive => {
            println!("\n{}", "INCONCLUSIVE".yellow().bold());
            0
        }
    }
}

fn print_result(result: &jitdiff::backend::ExecutionResult) {
    match &result.failure {
        None => println!(
            "  [{}] {} -> {:?} ({}ms)",
            result.backend.bold(),
            "ok".green(),
            result.stdout.trim_end(),
            result.duration_ms
        ),
        Some(failure) => println!(
            "  [{}] {} {:?}: {} ({}ms)",
            result.backend.bold(),
            "failed".red(),
            failure.kind,
            failure.detail,
            result.duration_ms
        ),
    }
}

fn profiles() -> i32 {
    println!("{}", "Built-in generation profiles".bold().cyan());
    for p in profile::PROFILES {
        println!(
            "  {:24} class {}<seed>  ops {:>4}  control value {:>3}",
            p.name, p.class_stem, p.op_count, p.control_value
        );
    }
    0
}
