//! Generation profiles.
//!
//! A profile is a named preset of generation parameters.  Campaigns cycle
//! through their enabled profiles round-robin by iteration index, so a long
//! run exercises every shape of program.  For the external generator the
//! profile also carries the control value and extra arguments forwarded to
//! the packaged generator CLI.

use crate::config::{GeneratorConfig, OpWeights};

/// A named generation preset.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    /// CLI-facing name (snake case)
    pub name: &'static str,
    /// Class-name stem (CamelCase, seed appended)
    pub class_stem: &'static str,
    /// Chained operations in the builtin emitter body
    pub op_count: u32,
    /// Instruction-mix weights for the builtin emitter
    pub weights: OpWeights,
    /// Control value (`-l`) forwarded to the external generator,
    /// indicating overall generation complexity
    pub control_value: u32,
    /// Extra arguments forwarded verbatim to the external generator
    pub extra_args: &'static [&'static str],
}

impl Profile {
    /// Build the generator configuration for this profile.
    pub fn config(&self) -> GeneratorConfig {
        GeneratorConfig {
            profile: self.class_stem.into(),
            op_count: self.op_count,
            weights: self.weights,
            max_method_count: 8,
            max_bytecode_size: 65536,
        }
    }
}

/// The built-in profile table.
pub const PROFILES: &[Profile] = &[
    Profile {
        name: "simple",
        class_stem: "Simple",
        op_count: 8,
        weights: OpWeights { add: 1, sub: 1, mul: 1, and: 1, or: 1, xor: 1 },
        control_value: 10,
        extra_args: &[],
    },
    Profile {
        name: "complex",
        class_stem: "Complex",
        op_count: 128,
        weights: OpWeights { add: 2, sub: 2, mul: 2, and: 1, or: 1, xor: 1 },
        control_value: 60,
        extra_args: &[],
    },
    Profile {
        name: "lots_of_math",
        class_stem: "LotsOfMath",
        op_count: 256,
        weights: OpWeights { add: 4, sub: 3, mul: 4, and: 1, or: 1, xor: 1 },
        control_value: 40,
        extra_args: &[],
    },
    Profile {
        name: "many_loops",
        class_stem: "ManyLoops",
        op_count: 64,
        weights: OpWeights { add: 3, sub: 1, mul: 1, and: 1, or: 1, xor: 1 },
        control_value: 50,
        extra_args: &[],
    },
    Profile {
        name: "block_exits",
        class_stem: "BlockExits",
        op_count: 48,
        weights: OpWeights { add: 1, sub: 2, mul: 1, and: 2, or: 1, xor: 2 },
        control_value: 30,
        extra_args: &[],
    },
    Profile {
        name: "many_overloads",
        class_stem: "ManyOverloads",
        op_count: 32,
        weights: OpWeights { add: 1, sub: 1, mul: 2, and: 1, or: 1, xor: 1 },
        control_value: 30,
        extra_args: &[],
    },
    Profile {
        name: "high_branching_factor",
        class_stem: "HighBranchingFactor",
        op_count: 96,
        weights: OpWeights { add: 1, sub: 1, mul: 1, and: 3, or: 3, xor: 4 },
        control_value: 40,
        extra_args: &[],
    },
];

/// Look up a profile by its CLI-facing name.
pub fn by_name(name: &str) -> Option<&'static Profile> {
    PROFILES.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_profiles_have_valid_configs() {
        for profile in PROFILES {
            profile
                .config()
                .validate()
                .unwrap_or_else(|e| panic!("profile {}: {e}", profile.name));
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(by_name("lots_of_math").unwrap().class_stem, "LotsOfMath");
        assert!(by_name("nonexistent").is_none());
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in PROFILES.iter().enumerate() {
            for b in &PROFILES[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.class_stem, b.class_stem);
            }
        }
    }
}
