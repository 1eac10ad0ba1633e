//! Execution backends.
//!
//! A backend loads a generated class into an isolated execution context and
//! runs it to completion or to a deadline.  Isolation is a fresh process per
//! execution: generated bytecode is untrusted and cannot be assumed to leave
//! a shared runtime in a usable state, so a crash or runaway loop in one
//! invocation can never corrupt or hang sibling invocations.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use jitdiff_gen::GeneratedProgram;

use crate::error::{HarnessError, Result};

/// Flag that disables the alternate JVMCI class loader so the compiler
/// under test and the generated code share one class loader.
pub const DISABLE_JVMCI_CLASSLOADER: &str = "-XX:-UseJVMCIClassLoader";

/// Classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The program terminated with an observable application-level exception
    RuntimeException,
    /// The process died without an observable exception (non-zero exit,
    /// signal, or a JVM fatal error)
    Crash,
    /// The hard wall-clock deadline expired and the process was killed
    Timeout,
    /// Environment-level fault of the execution harness itself, unrelated
    /// to program semantics (e.g. the JVM could not initialize)
    Harness,
}

/// A classified execution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Classification
    pub kind: FailureKind,
    /// Human-readable detail (exception line, exit code, ...)
    pub detail: String,
}

/// Result of running one generated program under one backend.
///
/// Created once per `(program, backend)` pair and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Backend identifier
    pub backend: String,
    /// Process exit code (`None` when killed by a signal or timed out)
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error (diagnostic only; not compared by default)
    pub stderr: String,
    /// Classified failure, if any
    pub failure: Option<Failure>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Whether this result carries a failure of the given kind.
    pub fn failed_with(&self, kind: FailureKind) -> bool {
        self.failure.as_ref().is_some_and(|f| f.kind == kind)
    }
}

/// JVM compilation/execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JvmMode {
    /// Interpreter only (`-Xint`)
    Interp,
    /// Baseline JIT only (tiered compilation stopped at level 1)
    Baseline,
    /// Full optimizing JIT (tiered compilation off)
    Opt,
}

impl JvmMode {
    /// Stable identifier, also used in configs and persisted records.
    pub fn id(self) -> &'static str {
        match self {
            Self::Interp => "interp",
            Self::Baseline => "baseline",
            Self::Opt => "opt",
        }
    }

    /// JVM flags selecting this mode.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Interp => &["-Xint"],
            Self::Baseline => &["-XX:TieredStopAtLevel=1"],
            Self::Opt => &["-XX:-TieredCompilation"],
        }
    }

    /// Parse a config-facing mode name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "interp" => Some(Self::Interp),
            "baseline" => Some(Self::Baseline),
            "opt" => Some(Self::Opt),
            _ => None,
        }
    }
}

/// Backend that spawns a fresh JVM process per execution.
#[derive(Debug, Clone)]
pub struct JvmBackend {
    /// Path to the `java` launcher
    pub java: PathBuf,
    /// Compilation mode
    pub mode: JvmMode,
    /// Pass-through JVM arguments appended to every invocation
    pub shared_args: Vec<String>,
}

/// Deterministic stand-in backend for harness self-tests and smoke runs.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    /// Backend identifier
    pub id: String,
    /// Scripted behavior
    pub behavior: SyntheticBehavior,
}

/// What a synthetic backend reports.
#[derive(Debug, Clone)]
pub enum SyntheticBehavior {
    /// Print the FNV digest of the artifact; a faithful "correct" backend
    Digest,
    /// Like `Digest`, but perturb the value when `seed % every == 0`,
    /// simulating a seeded compiler bug (`every == 0` never perturbs)
    DigestFlip {
        /// Divergence period
        every: u64,
    },
    /// Always report a timeout
    AlwaysTimeout,
    /// Always report an environment fault
    HarnessFault,
}

/// One execution strategy, selected by configuration.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Process-isolated JVM invocation
    Jvm(JvmBackend),
    /// Scripted deterministic backend
    Synthetic(SyntheticBackend),
}

impl Backend {
    /// Stable backend identifier.
    pub fn id(&self) -> &str {
        match self {
            Self::Jvm(b) => b.mode.id(),
            Self::Synthetic(b) => &b.id,
        }
    }

    /// Run `program` to completion or to `timeout`.
    ///
    /// The artifact must already be staged at
    /// `<class_dir>/<ClassName>.class`.  A spawn failure is a harness
    /// infrastructure error, not a classified result.
    pub async fn execute(
        &self,
        program: &GeneratedProgram,
        class_dir: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        match self {
            Self::Jvm(b) => b.execute(program, class_dir, timeout).await,
            Self::Synthetic(b) => Ok(b.execute(program, timeout)),
        }
    }
}

impl JvmBackend {
    async fn execute(
        &self,
        program: &GeneratedProgram,
        class_dir: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let id = self.mode.id();
        debug!(backend = id, class = %program.class_name, "spawning JVM");

        let start = Instant::now();
        let mut cmd = tokio::process::Command::new(&self.java);
        cmd.args(self.mode.flags())
            .arg(DISABLE_JVMCI_CLASSLOADER)
            .args(&self.shared_args)
            .arg("-cp")
            .arg(class_dir)
            .arg(&program.class_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            HarnessError::DriverFatal(format!(
                "cannot spawn '{}' for backend {id}: {e}",
                self.java.display()
            ))
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let exit_code = output.status.code();
                let failure = classify(exit_code, &stderr);
                Ok(ExecutionResult {
                    backend: id.to_string(),
                    exit_code,
                    stdout,
                    stderr,
                    failure,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => Err(HarnessError::DriverFatal(format!(
                "I/O failure while waiting for backend {id}: {e}"
            ))),
            // Dropping the future kills the child via kill_on_drop.
            Err(_elapsed) => Ok(ExecutionResult {
                backend: id.to_string(),
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                failure: Some(Failure {
                    kind: FailureKind::Timeout,
                    detail: format!("exceeded deadline of {}ms", timeout.as_millis()),
                }),
                duration_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

impl SyntheticBackend {
    fn execute(&self, program: &GeneratedProgram, timeout: Duration) -> ExecutionResult {
        let mut result = ExecutionResult {
            backend: self.id.clone(),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            failure: None,
            duration_ms: 0,
        };
        match self.behavior {
            SyntheticBehavior::Digest => {
                result.stdout = format!("{:016x}\n", program.digest());
            }
            SyntheticBehavior::DigestFlip { every } => {
                let mut value = program.digest();
                if every != 0 && program.seed % every == 0 {
                    value ^= 1;
                }
                result.stdout = format!("{value:016x}\n");
            }
            SyntheticBehavior::AlwaysTimeout => {
                result.exit_code = None;
                result.failure = Some(Failure {
                    kind: FailureKind::Timeout,
                    detail: format!("exceeded deadline of {}ms", timeout.as_millis()),
                });
            }
            SyntheticBehavior::HarnessFault => {
                result.exit_code = Some(1);
                result.failure = Some(Failure {
                    kind: FailureKind::Harness,
                    detail: "scripted environment fault".into(),
                });
            }
        }
        result
    }
}

/// Markers distinguishing a JVM that failed to come up from a program that
/// misbehaved.  These are faults of the execution environment, so the
/// comparison is inconclusive rather than a divergence.
const VM_INIT_FAILURES: &[&str] = &[
    "Could not create the Java Virtual Machine",
    "Could not reserve enough space",
    "Error occurred during initialization of VM",
    "Unrecognized option",
    "Unrecognized VM option",
];

/// Classify a finished process.
fn classify(exit_code: Option<i32>, stderr: &str) -> Option<Failure> {
    match exit_code {
        Some(0) => None,
        code => {
            if let Some(marker) = VM_INIT_FAILURES.iter().find(|m| stderr.contains(*m)) {
                return Some(Failure {
                    kind: FailureKind::Harness,
                    detail: (*marker).to_string(),
                });
            }
            if stderr.contains("A fatal error has been detected") {
                return Some(Failure {
                    kind: FailureKind::Crash,
                    detail: "JVM fatal error".into(),
                });
            }
            if let Some(line) = stderr
                .lines()
                .find(|l| l.starts_with("Exception in thread"))
            {
                return Some(Failure {
                    kind: FailureKind::RuntimeException,
                    detail: line.to_string(),
                });
            }
            Some(Failure {
                kind: FailureKind::Crash,
                detail: match code {
                    Some(c) => format!("exit code {c}"),
                    None => "killed by signal".into(),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitdiff_gen::{BuiltinGenerator, GeneratorConfig};

    fn program(seed: u64) -> GeneratedProgram {
        BuiltinGenerator
            .generate(seed, &GeneratorConfig::default())
            .unwrap()
    }

    #[test]
    fn clean_exit_has_no_failure() {
        assert!(classify(Some(0), "").is_none());
    }

    #[test]
    fn exception_trace_classified_as_runtime_exception() {
        let stderr = "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n\
                      \tat Simple0.main(Simple0.java:1)\n";
        let failure = classify(Some(1), stderr).unwrap();
        assert_eq!(failure.kind, FailureKind::RuntimeException);
        assert!(failure.detail.contains("ArithmeticException"));
    }

    #[test]
    fn vm_init_failure_classified_as_harness_fault() {
        let failure = classify(Some(1), "Error occurred during initialization of VM\n").unwrap();
        assert_eq!(failure.kind, FailureKind::Harness);
    }

    #[test]
    fn signal_death_classified_as_crash() {
        let failure = classify(None, "").unwrap();
        assert_eq!(failure.kind, FailureKind::Crash);
    }

    #[test]
    fn hs_err_classified_as_crash() {
        let stderr = "#\n# A fatal error has been detected by the Java Runtime Environment:\n";
        let failure = classify(Some(134), stderr).unwrap();
        assert_eq!(failure.kind, FailureKind::Crash);
    }

    #[test]
    fn synthetic_digest_is_deterministic() {
        let backend = SyntheticBackend {
            id: "ref".into(),
            behavior: SyntheticBehavior::Digest,
        };
        let p = program(5);
        let a = backend.execute(&p, Duration::from_secs(1));
        let b = backend.execute(&p, Duration::from_secs(1));
        assert_eq!(a.stdout, b.stdout);
        assert!(a.failure.is_none());
    }

    #[test]
    fn digest_flip_perturbs_only_matching_seeds() {
        let faithful = SyntheticBackend {
            id: "ref".into(),
            behavior: SyntheticBehavior::Digest,
        };
        let buggy = SyntheticBackend {
            id: "mutant".into(),
            behavior: SyntheticBehavior::DigestFlip { every: 10 },
        };
        let hit = program(10);
        let miss = program(11);
        assert_ne!(
            faithful.execute(&hit, Duration::from_secs(1)).stdout,
            buggy.execute(&hit, Duration::from_secs(1)).stdout,
        );
        assert_eq!(
            faithful.execute(&miss, Duration::from_secs(1)).stdout,
            buggy.execute(&miss, Duration::from_secs(1)).stdout,
        );
    }

    #[test]
    fn jvm_mode_flags() {
        assert_eq!(JvmMode::Interp.flags(), &["-Xint"]);
        assert_eq!(JvmMode::parse("opt"), Some(JvmMode::Opt));
        assert_eq!(JvmMode::parse("jit9000"), None);
    }
}
