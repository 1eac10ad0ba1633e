//! # jitdiff-gen
//!
//! Program generation for the jitdiff differential-testing harness.
//!
//! A generator is a pure function of a seed and a [`GeneratorConfig`]: the
//! same pair always yields a byte-identical class-file artifact, which is
//! what makes every recorded divergence replayable.
//!
//! Two generator variants are provided:
//!
//! - **Builtin**: a small self-contained emitter that produces genuinely
//!   valid Java class files with a seed-derived straight-line arithmetic
//!   body.  Used for harness self-tests and smoke campaigns.
//! - **External**: an adapter around a packaged bytecode-generator CLI,
//!   invoked as a black box.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod classfile;
pub mod config;
pub mod error;
pub mod generator;
pub mod profile;
pub mod program;
pub mod rng;

pub use config::{GeneratorConfig, OpWeights};
pub use error::GenerationError;
pub use generator::{BuiltinGenerator, ExternalGenerator, Generator};
pub use profile::{PROFILES, Profile};
pub use program::{GeneratedProgram, fnv1a64};
pub use rng::XorShift64;
