//! # jitdiff
//!
//! Differential-testing harness for JVM just-in-time compilers.
//!
//! A campaign repeatedly generates a random-but-reproducible class file,
//! runs it under two or more execution backends (fresh JVM process per
//! execution), and compares the observable behavior.  Backends disagreeing
//! on output or failure classification is the signal of a compiler bug;
//! every such divergence is persisted with enough metadata to replay it
//! deterministically.

#![warn(clippy::all)]

pub mod backend;
pub mod campaign;
pub mod compare;
pub mod config;
pub mod error;
pub mod report;

pub use backend::{Backend, ExecutionResult, Failure, FailureKind, JvmBackend, JvmMode};
pub use campaign::{Campaign, CampaignConfig, run_campaign};
pub use compare::{ComparisonVerdict, EqualityRules, Verdict, compare};
pub use config::HarnessConfig;
pub use error::HarnessError;
pub use report::{CampaignSummary, DivergenceCase};
