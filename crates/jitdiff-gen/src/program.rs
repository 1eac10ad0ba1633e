//! Generated program value type

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;

/// An immutable generated program.
///
/// Holds everything needed to stage and execute the artifact, plus the
/// `(seed, config)` pair that reproduces it byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProgram {
    /// Seed the artifact was derived from
    pub seed: u64,
    /// Configuration the artifact was derived from
    pub config: GeneratorConfig,
    /// Name of the generated class (also the entry point)
    pub class_name: String,
    /// Raw class-file bytes
    pub bytes: Vec<u8>,
}

impl GeneratedProgram {
    /// FNV-1a digest of the artifact bytes, used to cross-check
    /// reproducibility when replaying a persisted case.
    pub fn digest(&self) -> u64 {
        fnv1a64(&self.bytes)
    }
}

/// 64-bit FNV-1a hash.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}
