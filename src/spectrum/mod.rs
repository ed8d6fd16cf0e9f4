//! Program spectrum collection.
//!
//! Turns the raw payload reported by the instrumented run into a normalized,
//! immutable [`Spectrum`]: test verdicts, per-element coverage, and the
//! element -> suspiciousness mapping.

use crate::element::ProgramElementKey;
use crate::payload::{ComponentKind, ExecutionPayload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Prefix used by JUnit 3 adapters for synthetic failures that are not
/// attributable to a concrete test case.
pub const DEFAULT_EXCLUDED_FAILURE_PREFIX: &str = "junit.framework";

/// Verdict of one test in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestVerdict {
    Passed,
    Failed,
}

impl std::fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How many failing and passing tests executed an element, out of how many
/// of each exist in the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageCounts {
    pub failed_covering: usize,
    pub passed_covering: usize,
    pub total_failed: usize,
    pub total_passed: usize,
}

/// Bookkeeping from one collection pass, mostly for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub tests_seen: usize,
    pub malformed_tests: usize,
    pub meta_failures_dropped: usize,
    pub duplicate_tests: usize,
    pub elements_seen: usize,
    pub malformed_elements: usize,
    pub non_statement_elements: usize,
    pub unscored_elements: usize,
    pub duplicate_elements: usize,
    pub malformed_coverage: usize,
}

/// Aggregate coverage and outcome data for one execution.
///
/// A test identifier lives in at most one of the passing/failing sets, and
/// each element key maps to exactly one score.
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    scores: HashMap<ProgramElementKey, f64>,
    verdicts: BTreeMap<String, TestVerdict>,
    passing: BTreeSet<String>,
    failing: BTreeSet<String>,
    coverage: HashMap<ProgramElementKey, BTreeSet<String>>,
    stats: CollectionStats,
}

impl Spectrum {
    /// An empty spectrum, meaning localization produced nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn scores(&self) -> &HashMap<ProgramElementKey, f64> {
        &self.scores
    }

    pub fn score(&self, key: &ProgramElementKey) -> Option<f64> {
        self.scores.get(key).copied()
    }

    pub fn passing_tests(&self) -> &BTreeSet<String> {
        &self.passing
    }

    pub fn failing_tests(&self) -> &BTreeSet<String> {
        &self.failing
    }

    pub fn verdict(&self, test: &str) -> Option<TestVerdict> {
        self.verdicts.get(test).copied()
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    /// Whether any test reported which elements it executed.
    pub fn has_coverage(&self) -> bool {
        !self.coverage.is_empty()
    }

    /// Elements executed by at least one classified test.
    pub fn covered_elements(&self) -> impl Iterator<Item = &ProgramElementKey> {
        self.coverage.keys()
    }

    pub fn covering_tests(&self, key: &ProgramElementKey) -> Option<&BTreeSet<String>> {
        self.coverage.get(key)
    }

    pub fn coverage_counts(&self, key: &ProgramElementKey) -> CoverageCounts {
        let mut counts = CoverageCounts {
            total_failed: self.failing.len(),
            total_passed: self.passing.len(),
            ..Default::default()
        };
        for test in self.coverage.get(key).into_iter().flatten() {
            match self.verdicts.get(test) {
                Some(TestVerdict::Failed) => counts.failed_covering += 1,
                Some(TestVerdict::Passed) => counts.passed_covering += 1,
                None => {}
            }
        }
        counts
    }

    /// No scored elements: callers treat this as "localization unavailable".
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Same tests and coverage, different scores.
    pub(crate) fn with_scores(&self, scores: HashMap<ProgramElementKey, f64>) -> Self {
        Self {
            scores,
            ..self.clone()
        }
    }
}

/// Builds a [`Spectrum`] from a raw payload. Pure: no I/O, deterministic.
#[derive(Debug, Clone)]
pub struct SpectrumCollector {
    excluded_failure_prefixes: Vec<String>,
}

impl Default for SpectrumCollector {
    fn default() -> Self {
        Self::new(vec![DEFAULT_EXCLUDED_FAILURE_PREFIX.to_string()])
    }
}

impl SpectrumCollector {
    pub fn new(excluded_failure_prefixes: Vec<String>) -> Self {
        Self {
            excluded_failure_prefixes,
        }
    }

    /// Failures reported by a meta test-framework adapter rather than a
    /// concrete test case.
    pub fn is_meta_failure(&self, test_name: &str) -> bool {
        self.excluded_failure_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && test_name.starts_with(prefix.as_str()))
    }

    pub fn build(&self, payload: &ExecutionPayload) -> Spectrum {
        let mut stats = CollectionStats::default();
        let mut verdicts: BTreeMap<String, TestVerdict> = BTreeMap::new();
        let mut coverage: HashMap<ProgramElementKey, BTreeSet<String>> = HashMap::new();

        for test in &payload.tests {
            stats.tests_seen += 1;

            if test.name.trim().is_empty() {
                stats.malformed_tests += 1;
                continue;
            }
            // Dropped without touching any verdict already recorded for the name.
            if !test.passed && self.is_meta_failure(&test.name) {
                stats.meta_failures_dropped += 1;
                tracing::debug!("Dropping meta-framework failure: {}", test.name);
                continue;
            }

            let verdict = if test.passed {
                TestVerdict::Passed
            } else {
                TestVerdict::Failed
            };
            // Last report wins so the passing and failing sets stay disjoint.
            if verdicts.insert(test.name.clone(), verdict).is_some() {
                stats.duplicate_tests += 1;
            }

            for key in &test.coverage {
                if !key.is_valid() {
                    stats.malformed_coverage += 1;
                    continue;
                }
                coverage
                    .entry(key.clone())
                    .or_default()
                    .insert(test.name.clone());
            }
        }

        let mut scores = HashMap::new();
        for record in &payload.elements {
            stats.elements_seen += 1;

            if record.kind != ComponentKind::Statement {
                stats.non_statement_elements += 1;
                continue;
            }
            let key = record.key();
            if !key.is_valid() {
                stats.malformed_elements += 1;
                tracing::debug!("Skipping malformed element record: {:?}", record);
                continue;
            }
            let Some(score) = record.suspiciousness else {
                stats.unscored_elements += 1;
                continue;
            };
            if !score.is_finite() {
                stats.malformed_elements += 1;
                tracing::debug!("Skipping non-finite score for {}", key);
                continue;
            }
            if scores.insert(key, score).is_some() {
                stats.duplicate_elements += 1;
            }
        }

        let mut passing = BTreeSet::new();
        let mut failing = BTreeSet::new();
        for (name, verdict) in &verdicts {
            match verdict {
                TestVerdict::Passed => passing.insert(name.clone()),
                TestVerdict::Failed => failing.insert(name.clone()),
            };
        }

        if stats.duplicate_elements > 0
            || stats.malformed_elements > 0
            || stats.malformed_tests > 0
        {
            tracing::warn!(
                "Spectrum built with {} duplicate and {} malformed element records, {} malformed test records",
                stats.duplicate_elements,
                stats.malformed_elements,
                stats.malformed_tests
            );
        }
        tracing::debug!(
            "Spectrum: {} elements, {} passing, {} failing ({} meta failures dropped)",
            scores.len(),
            passing.len(),
            failing.len(),
            stats.meta_failures_dropped
        );

        Spectrum {
            scores,
            verdicts,
            passing,
            failing,
            coverage,
            stats,
        }
    }
}
