//! Suspiciousness ranking over a collected spectrum.
//!
//! By default the scores computed by the instrumentation side are exposed as
//! they are. When tests report per-test coverage, a [`SuspiciousnessFormula`]
//! can be substituted to score every covered element locally.

pub mod formula;

pub use formula::{Formula, SuspiciousnessFormula};

use crate::element::ProgramElementKey;
use crate::spectrum::Spectrum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Where element scores come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Scores reported by the instrumented runtime.
    #[default]
    Precomputed,
    /// Scores computed here from per-test coverage.
    Formula,
}

/// Read-only query surface over one spectrum.
#[derive(Debug, Clone, Default)]
pub struct SuspiciousnessEngine {
    spectrum: Spectrum,
}

impl SuspiciousnessEngine {
    /// Expose the spectrum's own scores.
    pub fn new(spectrum: Spectrum) -> Self {
        Self { spectrum }
    }

    /// Rescore every element covered by at least one test with `formula`.
    ///
    /// A spectrum without per-test coverage keeps its reported scores.
    pub fn with_formula(spectrum: Spectrum, formula: &dyn SuspiciousnessFormula) -> Self {
        if !spectrum.has_coverage() {
            if !spectrum.is_empty() {
                tracing::warn!(
                    "No per-test coverage reported, keeping reported scores instead of {}",
                    formula.name()
                );
            }
            return Self::new(spectrum);
        }

        let scores: HashMap<ProgramElementKey, f64> = spectrum
            .covered_elements()
            .map(|key| (key.clone(), formula.score(&spectrum.coverage_counts(key))))
            .collect();

        tracing::debug!(
            "Scored {} covered elements with {}",
            scores.len(),
            formula.name()
        );

        Self::new(spectrum.with_scores(scores))
    }

    /// Every element whose score is at least `threshold`, unordered.
    ///
    /// Reported and built-in formula scores are never negative, so a
    /// threshold of `0.0` returns the whole spectrum.
    pub fn query(&self, threshold: f64) -> HashMap<ProgramElementKey, f64> {
        self.spectrum
            .scores()
            .iter()
            .filter(|(_, score)| **score >= threshold)
            .map(|(key, score)| (key.clone(), *score))
            .collect()
    }

    /// Like [`query`](Self::query), sorted by descending score with the
    /// element key as tie-breaker.
    pub fn ranked_above(&self, threshold: f64) -> Vec<(ProgramElementKey, f64)> {
        let mut ranked: Vec<_> = self.query(threshold).into_iter().collect();
        ranked.sort_by(|(a_key, a_score), (b_key, b_score)| {
            b_score.total_cmp(a_score).then_with(|| a_key.cmp(b_key))
        });
        ranked
    }

    pub fn passing_tests(&self) -> &BTreeSet<String> {
        self.spectrum.passing_tests()
    }

    pub fn failing_tests(&self) -> &BTreeSet<String> {
        self.spectrum.failing_tests()
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }
}
