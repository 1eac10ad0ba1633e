//! Differential comparison of execution results.
//!
//! All results handed to [`compare`] must come from the same generated
//! program.  The verdict is invariant under permutation of the input.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::{ExecutionResult, FailureKind};

/// Outcome of comparing the results of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// All backends agree on observable behavior
    Agree,
    /// Backends disagree on output or failure classification: the signal
    /// of a compiler bug
    Diverge,
    /// At least one backend reported an environment-level fault (or timed
    /// out under the default rules); excluded from divergence accounting
    Inconclusive,
}

/// Equality rules for observable output.
///
/// Output equality is bit-exact on the normalized text; nothing is inferred
/// about floating-point renderings or identity-derived values beyond what
/// these declared rules state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualityRules {
    /// Treat timeouts as part of the failure classification instead of
    /// making the comparison inconclusive.  Off by default: an
    /// interpreter-only backend may simply be slower than its JIT sibling,
    /// and timing must not be mistaken for a compiler bug.
    pub strict_timeouts: bool,
    /// Compare process exit codes in addition to output
    pub compare_exit_codes: bool,
    /// Compare exception detail lines, not just the failure kind
    pub compare_exception_messages: bool,
    /// Strip trailing whitespace from each output line before comparing
    pub trim_trailing_whitespace: bool,
}

impl Default for EqualityRules {
    fn default() -> Self {
        Self {
            strict_timeouts: false,
            compare_exit_codes: false,
            compare_exception_messages: true,
            trim_trailing_whitespace: true,
        }
    }
}

/// Verdict plus the backends that disagreed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonVerdict {
    /// The verdict
    pub verdict: Verdict,
    /// On `Diverge`, every participating backend id; on `Inconclusive`,
    /// the backends that reported environment faults or timeouts; empty
    /// on `Agree`
    pub disagreeing: Vec<String>,
}

impl ComparisonVerdict {
    fn agree() -> Self {
        Self { verdict: Verdict::Agree, disagreeing: Vec::new() }
    }
}

/// What one result looks like to the comparator.
#[derive(Debug, PartialEq, Eq)]
enum Observation {
    Failed(FailureKind, Option<String>),
    Completed { lines: Vec<String>, exit_code: Option<i32> },
}

/// Compare the results of running one generated program under every
/// configured backend.
pub fn compare(results: &[ExecutionResult], rules: &EqualityRules) -> ComparisonVerdict {
    let faulted: Vec<String> = results
        .iter()
        .filter(|r| {
            r.failed_with(FailureKind::Harness)
                || (!rules.strict_timeouts && r.failed_with(FailureKind::Timeout))
        })
        .map(|r| r.backend.clone())
        .collect();
    if !faulted.is_empty() {
        warn!(backends = ?faulted, "environment fault, comparison inconclusive");
        return inconclusive(faulted);
    }

    if results.len() < 2 {
        // A single result cannot witness agreement or divergence.
        return inconclusive(results.iter().map(|r| r.backend.clone()).collect());
    }

    let observations: Vec<Observation> = results.iter().map(|r| observe(r, rules)).collect();
    let all_equal = observations.iter().all(|o| *o == observations[0]);
    if all_equal {
        ComparisonVerdict::agree()
    } else {
        let mut ids: Vec<String> = results.iter().map(|r| r.backend.clone()).collect();
        ids.sort();
        ComparisonVerdict { verdict: Verdict::Diverge, disagreeing: ids }
    }
}

fn inconclusive(mut ids: Vec<String>) -> ComparisonVerdict {
    ids.sort();
    ComparisonVerdict { verdict: Verdict::Inconclusive, disagreeing: ids }
}

fn observe(result: &ExecutionResult, rules: &EqualityRules) -> Observation {
    match &result.failure {
        Some(failure) => Observation::Failed(
            failure.kind,
            rules
                .compare_exception_messages
                .then(|| failure.detail.clone()),
        ),
        None => Observation::Completed {
            lines: normalize(&result.stdout, rules),
            exit_code: rules.compare_exit_codes.then_some(result.exit_code).flatten(),
        },
    }
}

/// Split output into lines with CR/LF normalized and trailing empty lines
/// dropped, optionally trimming trailing whitespace per line.
fn normalize(output: &str, rules: &EqualityRules) -> Vec<String> {
    let mut lines: Vec<String> = output
        .replace("\r\n", "\n")
        .split('\n')
        .map(|l| {
            if rules.trim_trailing_whitespace {
                l.trim_end().to_string()
            } else {
                l.to_string()
            }
        })
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Failure;

    fn result(backend: &str, stdout: &str, failure: Option<Failure>) -> ExecutionResult {
        ExecutionResult {
            backend: backend.into(),
            exit_code: Some(if failure.is_some() { 1 } else { 0 }),
            stdout: stdout.into(),
            stderr: String::new(),
            failure,
            duration_ms: 1,
        }
    }

    fn timeout(backend: &str) -> ExecutionResult {
        ExecutionResult {
            backend: backend.into(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            failure: Some(Failure {
                kind: FailureKind::Timeout,
                detail: "exceeded deadline of 100ms".into(),
            }),
            duration_ms: 100,
        }
    }

    #[test]
    fn equal_output_agrees() {
        let results = [result("interp", "42\n", None), result("opt", "42\n", None)];
        assert_eq!(compare(&results, &EqualityRules::default()).verdict, Verdict::Agree);
    }

    #[test]
    fn different_output_diverges_with_both_attached() {
        let results = [result("interp", "42\n", None), result("opt", "43\n", None)];
        let verdict = compare(&results, &EqualityRules::default());
        assert_eq!(verdict.verdict, Verdict::Diverge);
        assert_eq!(verdict.disagreeing, vec!["interp".to_string(), "opt".to_string()]);
    }

    #[test]
    fn verdict_invariant_under_permutation() {
        let a = result("interp", "1\n", None);
        let b = result("opt", "2\n", None);
        let c = result("baseline", "1\n", None);
        let rules = EqualityRules::default();
        let forward = compare(&[a.clone(), b.clone(), c.clone()], &rules);
        let reversed = compare(&[c, b, a], &rules);
        assert_eq!(forward.verdict, reversed.verdict);
        assert_eq!(forward.disagreeing, reversed.disagreeing);
    }

    #[test]
    fn matching_exceptions_agree() {
        let failure = || {
            Some(Failure {
                kind: FailureKind::RuntimeException,
                detail: "Exception in thread \"main\" java.lang.ArithmeticException".into(),
            })
        };
        let results = [result("interp", "", failure()), result("opt", "", failure())];
        assert_eq!(compare(&results, &EqualityRules::default()).verdict, Verdict::Agree);
    }

    #[test]
    fn exception_vs_clean_exit_diverges() {
        let results = [
            result("interp", "42\n", None),
            result(
                "opt",
                "",
                Some(Failure {
                    kind: FailureKind::RuntimeException,
                    detail: "Exception in thread \"main\" java.lang.NullPointerException".into(),
                }),
            ),
        ];
        assert_eq!(compare(&results, &EqualityRules::default()).verdict, Verdict::Diverge);
    }

    #[test]
    fn harness_fault_is_inconclusive() {
        let results = [
            result("interp", "42\n", None),
            result(
                "opt",
                "",
                Some(Failure { kind: FailureKind::Harness, detail: "VM init".into() }),
            ),
        ];
        let verdict = compare(&results, &EqualityRules::default());
        assert_eq!(verdict.verdict, Verdict::Inconclusive);
        assert_eq!(verdict.disagreeing, vec!["opt".to_string()]);
    }

    #[test]
    fn timeout_is_inconclusive_by_default() {
        let results = [result("interp", "42\n", None), timeout("opt")];
        assert_eq!(
            compare(&results, &EqualityRules::default()).verdict,
            Verdict::Inconclusive
        );
    }

    #[test]
    fn strict_timeouts_participate_in_classification() {
        let rules = EqualityRules { strict_timeouts: true, ..EqualityRules::default() };
        let diverging = [result("interp", "42\n", None), timeout("opt")];
        assert_eq!(compare(&diverging, &rules).verdict, Verdict::Diverge);
        let agreeing = [timeout("interp"), timeout("opt")];
        assert_eq!(compare(&agreeing, &rules).verdict, Verdict::Agree);
    }

    #[test]
    fn line_ending_normalization() {
        let results = [
            result("interp", "1\r\n2\r\n", None),
            result("opt", "1\n2\n", None),
        ];
        assert_eq!(compare(&results, &EqualityRules::default()).verdict, Verdict::Agree);
    }

    #[test]
    fn single_result_is_inconclusive() {
        let results = [result("interp", "42\n", None)];
        assert_eq!(
            compare(&results, &EqualityRules::default()).verdict,
            Verdict::Inconclusive
        );
    }
}
