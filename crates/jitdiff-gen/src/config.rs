//! Generator configuration

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};

/// Relative weights for the instruction mix of a generated method body.
///
/// All operations work on `long` operands so that observable results are
/// fully deterministic across execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpWeights {
    /// Weight of `ladd`
    pub add: u32,
    /// Weight of `lsub`
    pub sub: u32,
    /// Weight of `lmul`
    pub mul: u32,
    /// Weight of `land`
    pub and: u32,
    /// Weight of `lor`
    pub or: u32,
    /// Weight of `lxor`
    pub xor: u32,
}

impl OpWeights {
    /// Sum of all weights.
    pub fn total(&self) -> u64 {
        u64::from(self.add)
            + u64::from(self.sub)
            + u64::from(self.mul)
            + u64::from(self.and)
            + u64::from(self.or)
            + u64::from(self.xor)
    }

    /// Balanced mix over every operation.
    pub fn balanced() -> Self {
        Self { add: 1, sub: 1, mul: 1, and: 1, or: 1, xor: 1 }
    }

    /// Arithmetic-heavy mix.
    pub fn arithmetic() -> Self {
        Self { add: 4, sub: 3, mul: 4, and: 1, or: 1, xor: 1 }
    }

    /// Bitwise-heavy mix.
    pub fn bitwise() -> Self {
        Self { add: 1, sub: 1, mul: 1, and: 3, or: 3, xor: 4 }
    }
}

impl Default for OpWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Full configuration for one generation request.
///
/// Together with a seed this fully determines the artifact bytes, so the
/// configuration is persisted verbatim inside every divergence case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Class-name stem; the seed is appended to form the class name
    /// (e.g. `LotsOfMath17`)
    pub profile: String,
    /// Number of chained operations in the generated method body
    pub op_count: u32,
    /// Instruction-mix weights
    pub weights: OpWeights,
    /// Upper bound on generated methods (the builtin emitter always emits
    /// exactly one; the external generator treats this as a control value)
    pub max_method_count: u32,
    /// Upper bound on the total artifact size in bytes
    pub max_bytecode_size: u32,
}

impl GeneratorConfig {
    /// Ensure the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.profile.is_empty() {
            return Err(GenerationError::InvalidConfig(
                "profile name must not be empty".into(),
            ));
        }
        if !self
            .profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(GenerationError::InvalidConfig(format!(
                "profile name '{}' is not a valid class-name stem",
                self.profile
            )));
        }
        if self.weights.total() == 0 {
            return Err(GenerationError::InvalidConfig(
                "instruction-mix weights sum to zero".into(),
            ));
        }
        if self.max_method_count == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_method_count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Class name for the given seed.
    pub fn class_name(&self, seed: u64) -> String {
        format!("{}{}", self.profile, seed)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            profile: "Simple".into(),
            op_count: 16,
            weights: OpWeights::balanced(),
            max_method_count: 1,
            max_bytecode_size: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GeneratorConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_weights_rejected() {
        let config = GeneratorConfig {
            weights: OpWeights { add: 0, sub: 0, mul: 0, and: 0, or: 0, xor: 0 },
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GenerationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bad_profile_name_rejected() {
        let config = GeneratorConfig {
            profile: "no spaces allowed".into(),
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn class_name_appends_seed() {
        let config = GeneratorConfig::default();
        assert_eq!(config.class_name(17), "Simple17");
    }
}
