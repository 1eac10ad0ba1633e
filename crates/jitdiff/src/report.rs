//! Campaign reporting and divergence-case persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use jitdiff_gen::GeneratorConfig;

use crate::backend::ExecutionResult;
use crate::error::Result;

/// A persisted divergence case.
///
/// Self-contained: the seed and configuration reproduce the artifact byte
/// for byte, the artifact blob is written next to the JSON, and the full
/// per-backend results are embedded, so an engineer can replay the exact
/// failing case outside the campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceCase {
    /// Generation seed
    pub seed: u64,
    /// Generator configuration used
    pub config: GeneratorConfig,
    /// Generated class name
    pub class_name: String,
    /// File name of the artifact blob, relative to the case directory
    pub artifact_file: String,
    /// FNV-1a digest of the artifact, hex encoded
    pub artifact_digest: String,
    /// All execution results for this program
    pub results: Vec<ExecutionResult>,
    /// When the divergence was recorded
    pub recorded_at: DateTime<Utc>,
}

impl DivergenceCase {
    /// Assemble a case from one iteration's data.
    pub fn new(
        seed: u64,
        config: GeneratorConfig,
        class_name: String,
        artifact: &[u8],
        results: Vec<ExecutionResult>,
    ) -> Self {
        Self {
            artifact_file: format!("{class_name}.class"),
            artifact_digest: format!("{:016x}", jitdiff_gen::fnv1a64(artifact)),
            seed,
            config,
            class_name,
            results,
            recorded_at: Utc::now(),
        }
    }

    /// Write the case (JSON plus artifact blob) under
    /// `<cases_dir>/seed-<seed>/` and return the path of the JSON file.
    pub fn persist(&self, cases_dir: &Path, artifact: &[u8]) -> Result<PathBuf> {
        let dir = cases_dir.join(format!("seed-{}", self.seed));
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(&self.artifact_file), artifact)?;
        let json_path = dir.join("case.json");
        std::fs::write(&json_path, serde_json::to_string_pretty(self)?)?;
        Ok(json_path)
    }

    /// Load a persisted case from its JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read the artifact blob stored next to the given case JSON file.
    pub fn load_artifact(&self, case_json: &Path) -> Result<Vec<u8>> {
        let dir = case_json.parent().unwrap_or_else(|| Path::new("."));
        Ok(std::fs::read(dir.join(&self.artifact_file))?)
    }
}

/// Per-profile counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileStats {
    /// Iterations run for this profile
    pub total: u64,
    /// Agreeing iterations
    pub agreed: u64,
    /// Diverging iterations
    pub diverged: u64,
    /// Inconclusive iterations
    pub inconclusive: u64,
    /// Iterations skipped due to generation errors
    pub skipped: u64,
}

/// Final campaign summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    /// Iterations requested
    pub requested: u64,
    /// Iterations actually completed (including skipped ones)
    pub completed: u64,
    /// Agreeing iterations
    pub agreed: u64,
    /// Diverging iterations
    pub diverged: u64,
    /// Inconclusive iterations
    pub inconclusive: u64,
    /// Iterations skipped due to generation errors
    pub skipped: u64,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Campaign start time
    pub started_at: DateTime<Utc>,
    /// Breakdown per generation profile
    pub by_profile: HashMap<String, ProfileStats>,
    /// Harness-infrastructure failure that aborted the campaign, if any
    pub fatal: Option<String>,
}

impl CampaignSummary {
    /// Print a human-readable summary.
    pub fn print(&self) {
        println!("\n{}", "=== jitdiff campaign ===".bold().cyan());
        println!("Requested:    {}", self.requested);
        println!("Completed:    {}", self.completed);
        println!("Agree:        {}", self.agreed.to_string().green());
        let diverged = if self.diverged > 0 {
            self.diverged.to_string().red().bold().to_string()
        } else {
            self.diverged.to_string().green().to_string()
        };
        println!("Diverge:      {}", diverged);
        println!("Inconclusive: {}", self.inconclusive.to_string().yellow());
        println!("Skipped:      {}", self.skipped.to_string().dimmed());
        println!("Duration:     {:.1}s", self.duration_ms as f64 / 1000.0);

        if !self.by_profile.is_empty() {
            let mut names: Vec<&String> = self.by_profile.keys().collect();
            names.sort();
            println!("\n{}", "Per profile:".bold());
            for name in names {
                let s = &self.by_profile[name];
                println!(
                    "  {:24} total {:>6}  agree {:>6}  diverge {:>4}  inconclusive {:>4}  skipped {:>4}",
                    name, s.total, s.agreed, s.diverged, s.inconclusive, s.skipped
                );
            }
        }

        if let Some(ref fatal) = self.fatal {
            println!("\n{} {}", "FATAL:".red().bold(), fatal);
        }
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Failure, FailureKind};

    fn sample_case() -> (DivergenceCase, Vec<u8>) {
        let artifact = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00];
        let results = vec![
            ExecutionResult {
                backend: "interp".into(),
                exit_code: Some(0),
                stdout: "42\n".into(),
                stderr: String::new(),
                failure: None,
                duration_ms: 12,
            },
            ExecutionResult {
                backend: "opt".into(),
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "boom".into(),
                failure: Some(Failure {
                    kind: FailureKind::Crash,
                    detail: "exit code 1".into(),
                }),
                duration_ms: 34,
            },
        ];
        let case = DivergenceCase::new(
            7,
            GeneratorConfig::default(),
            "Simple7".into(),
            &artifact,
            results,
        );
        (case, artifact)
    }

    #[test]
    fn persist_and_reload_case() {
        let dir = tempfile::tempdir().unwrap();
        let (case, artifact) = sample_case();
        let json_path = case.persist(dir.path(), &artifact).unwrap();

        let loaded = DivergenceCase::load(&json_path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.class_name, "Simple7");
        assert_eq!(loaded.config, case.config);
        assert_eq!(loaded.results.len(), 2);

        let blob = loaded.load_artifact(&json_path).unwrap();
        assert_eq!(blob, artifact);
        assert_eq!(
            loaded.artifact_digest,
            format!("{:016x}", jitdiff_gen::fnv1a64(&blob))
        );
    }

    #[test]
    fn summary_json_round_trip() {
        let summary = CampaignSummary {
            requested: 100,
            completed: 100,
            agreed: 90,
            diverged: 10,
            inconclusive: 0,
            skipped: 0,
            duration_ms: 1234,
            started_at: Utc::now(),
            by_profile: HashMap::new(),
            fatal: None,
        };
        let json = summary.to_json().unwrap();
        let back: CampaignSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agreed, 90);
        assert_eq!(back.diverged, 10);
    }
}
