//! TOML configuration for the harness.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use jitdiff_gen::{BuiltinGenerator, ExternalGenerator, Generator, GeneratorConfig, profile};

use crate::backend::{Backend, JvmBackend, JvmMode, SyntheticBackend, SyntheticBehavior};
use crate::compare::EqualityRules;
use crate::error::{HarnessError, Result};

/// Which generator variant a campaign uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Self-contained deterministic emitter
    Builtin,
    /// Packaged external generator CLI
    External,
}

/// Harness configuration loaded from `jitdiff.toml`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path to the `java` launcher
    pub java: PathBuf,
    /// Backend modes to compare (`interp`, `baseline`, `opt`)
    pub backends: Vec<String>,
    /// Pass-through JVM arguments appended to every invocation
    pub jvm_args: Vec<String>,
    /// Per-execution timeout in seconds
    pub timeout_secs: u64,
    /// Worker threads (defaults to the CPU count)
    pub jobs: Option<usize>,
    /// Iterations to run
    pub iterations: u64,
    /// First seed
    pub seed_start: u64,
    /// Output directory for cases, logs and the summary
    pub out_dir: PathBuf,
    /// Generator selection
    pub generator: GeneratorKind,
    /// External generator command (required when `generator = "external"`)
    pub generator_command: Option<PathBuf>,
    /// Arguments placed before the generated ones (e.g. `-jar gen.jar`)
    pub generator_args: Vec<String>,
    /// Enabled profile names (empty means all built-in profiles)
    pub profiles: Vec<String>,
    /// Output equality rules
    pub rules: EqualityRules,
    /// Stop after the first recorded divergence
    pub stop_on_divergence: bool,
    /// Wall-clock budget in seconds for the whole campaign
    pub time_budget_secs: Option<u64>,
    /// Optional JSONL iteration log
    pub log_path: Option<PathBuf>,
    /// Append to the log instead of truncating
    pub log_append: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            backends: vec!["interp".into(), "opt".into()],
            jvm_args: Vec::new(),
            timeout_secs: 20,
            jobs: None,
            iterations: 100,
            seed_start: 0,
            out_dir: PathBuf::from("jitdiff-out"),
            generator: GeneratorKind::Builtin,
            generator_command: None,
            generator_args: Vec::new(),
            profiles: Vec::new(),
            rules: EqualityRules::default(),
            stop_on_divergence: false,
            time_budget_secs: None,
            log_path: None,
            log_append: false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            HarnessError::Config(format!("failed to parse config '{}': {e}", path.display()))
        })
    }

    /// Try to load from the given or default location, falling back to
    /// defaults when no file exists.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match Self::load(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: {e}");
                    Self::default()
                }
            }
        } else {
            let default_path = Path::new("jitdiff.toml");
            if default_path.exists() {
                match Self::load(default_path) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("Warning: {e}");
                        Self::default()
                    }
                }
            } else {
                Self::default()
            }
        }
    }

    /// Resolve the configured backend modes.
    ///
    /// With `synthetic` set, a faithful/mutant synthetic pair replaces the
    /// JVM backends, giving a smoke campaign that needs no JVM.
    pub fn build_backends(&self, synthetic: bool) -> Result<Vec<Backend>> {
        if synthetic {
            return Ok(vec![
                Backend::Synthetic(SyntheticBackend {
                    id: "synthetic-ref".into(),
                    behavior: SyntheticBehavior::Digest,
                }),
                Backend::Synthetic(SyntheticBackend {
                    id: "synthetic-mutant".into(),
                    behavior: SyntheticBehavior::DigestFlip { every: 10 },
                }),
            ]);
        }
        if self.backends.len() < 2 {
            return Err(HarnessError::Config(
                "at least two backends are required for comparison".into(),
            ));
        }
        self.backends
            .iter()
            .map(|name| {
                let mode = JvmMode::parse(name).ok_or_else(|| {
                    HarnessError::Config(format!("unknown backend mode '{name}'"))
                })?;
                Ok(Backend::Jvm(JvmBackend {
                    java: self.java.clone(),
                    mode,
                    shared_args: self.jvm_args.clone(),
                }))
            })
            .collect()
    }

    /// Build the configured generator.  The external variant stages its
    /// artifacts in `work_dir`.
    pub fn build_generator(&self, work_dir: &Path) -> Result<Generator> {
        match self.generator {
            GeneratorKind::Builtin => Ok(Generator::Builtin(BuiltinGenerator)),
            GeneratorKind::External => {
                let command = self.generator_command.as_ref().ok_or_else(|| {
                    HarnessError::Config(
                        "generator = \"external\" requires generator_command".into(),
                    )
                })?;
                Ok(Generator::External(
                    ExternalGenerator::new(command, work_dir)
                        .with_base_args(self.generator_args.clone()),
                ))
            }
        }
    }

    /// Resolve the enabled profiles into generator configurations.
    pub fn resolve_profiles(&self) -> Result<Vec<GeneratorConfig>> {
        if self.profiles.is_empty() {
            return Ok(profile::PROFILES.iter().map(|p| p.config()).collect());
        }
        self.profiles
            .iter()
            .map(|name| {
                profile::by_name(name)
                    .map(|p| p.config())
                    .ok_or_else(|| HarnessError::Config(format!("unknown profile '{name}'")))
            })
            .collect()
    }
}
