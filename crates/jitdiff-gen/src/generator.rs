//! Generator variants.
//!
//! The harness selects a variant by configuration; both satisfy the same
//! contract: `generate(seed, config)` is a pure function whose artifact
//! bytes depend only on its inputs.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::classfile;
use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::program::GeneratedProgram;

/// A program generator.
#[derive(Debug)]
pub enum Generator {
    /// Self-contained deterministic class-file emitter
    Builtin(BuiltinGenerator),
    /// Adapter around a packaged bytecode-generator CLI
    External(ExternalGenerator),
}

impl Generator {
    /// Produce the program for `(seed, config)`.
    pub fn generate(&self, seed: u64, config: &GeneratorConfig) -> Result<GeneratedProgram> {
        match self {
            Self::Builtin(g) => g.generate(seed, config),
            Self::External(g) => g.generate(seed, config),
        }
    }
}

/// The builtin emitter; stateless.
#[derive(Debug, Default)]
pub struct BuiltinGenerator;

impl BuiltinGenerator {
    /// Emit the class file for `(seed, config)`.
    pub fn generate(&self, seed: u64, config: &GeneratorConfig) -> Result<GeneratedProgram> {
        let class_name = config.class_name(seed);
        debug!(seed, class = %class_name, "generating class (builtin)");
        let bytes = classfile::emit_class(seed, config)?;
        Ok(GeneratedProgram {
            seed,
            config: config.clone(),
            class_name,
            bytes,
        })
    }
}

/// Black-box adapter for an external generator command.
///
/// The command is invoked as
/// `<command> [args...] -l <control> -filename <ClassName> -seed <seed> [profile extras...]`
/// with the work directory as its current directory, and is expected to
/// leave `<ClassName>.class` there.  Determinism for a given seed is the
/// collaborator's contract; the adapter only verifies that a non-empty
/// artifact was produced.
#[derive(Debug)]
pub struct ExternalGenerator {
    command: PathBuf,
    base_args: Vec<String>,
    work_dir: PathBuf,
    control_value: u32,
    extra_args: Vec<String>,
}

impl ExternalGenerator {
    /// Create an adapter for `command`, staging artifacts in `work_dir`.
    pub fn new(command: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            base_args: Vec::new(),
            work_dir: work_dir.into(),
            control_value: 20,
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the generated ones (e.g. `-jar generator.jar`).
    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    /// Control value forwarded as `-l`.
    pub fn with_control_value(mut self, value: u32) -> Self {
        self.control_value = value;
        self
    }

    /// Profile-specific arguments appended after the generated ones.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Invoke the external command and read back the artifact.
    pub fn generate(&self, seed: u64, config: &GeneratorConfig) -> Result<GeneratedProgram> {
        config.validate()?;
        let class_name = config.class_name(seed);
        debug!(seed, class = %class_name, command = %self.command.display(),
               "generating class (external)");

        let output = Command::new(&self.command)
            .args(&self.base_args)
            .arg("-l")
            .arg(self.control_value.to_string())
            .arg("-filename")
            .arg(&class_name)
            .arg("-seed")
            .arg(seed.to_string())
            .args(&self.extra_args)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|source| GenerationError::Spawn {
                command: self.command.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(GenerationError::GeneratorFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let artifact = self.work_dir.join(format!("{class_name}.class"));
        let bytes = read_artifact(&artifact)?;
        if bytes.len() > config.max_bytecode_size as usize {
            return Err(GenerationError::SizeBudget {
                needed: bytes.len(),
                budget: config.max_bytecode_size,
            });
        }

        Ok(GeneratedProgram {
            seed,
            config: config.clone(),
            class_name,
            bytes,
        })
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(GenerationError::MissingArtifact(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(GenerationError::EmptyArtifact(path.to_path_buf()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_deterministic() {
        let generator = BuiltinGenerator;
        let config = GeneratorConfig::default();
        let a = generator.generate(11, &config).unwrap();
        let b = generator.generate(11, &config).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn builtin_names_class_from_profile_and_seed() {
        let program = BuiltinGenerator
            .generate(42, &GeneratorConfig::default())
            .unwrap();
        assert_eq!(program.class_name, "Simple42");
    }

    #[test]
    fn external_spawn_failure_is_reported() {
        let generator =
            ExternalGenerator::new("/nonexistent/generator-binary", std::env::temp_dir());
        let err = generator
            .generate(0, &GeneratorConfig::default())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Spawn { .. }));
    }
}
