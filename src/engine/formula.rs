//! Suspiciousness formulas.
//!
//! Standard spectrum formulas over the four coverage counts. Every formula
//! here is deterministic and returns a finite or `f64::MAX` score for any
//! input, including elements that no failing test touched.

use crate::spectrum::CoverageCounts;
use serde::{Deserialize, Serialize};

/// Scores an element from how failing and passing tests covered it.
///
/// Implementations should rise with `failed_covering` and fall with
/// `passed_covering`, and must return the same score for the same counts.
pub trait SuspiciousnessFormula: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, counts: &CoverageCounts) -> f64;
}

/// The built-in formulas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// Cosine similarity between the element's coverage and the failures.
    #[default]
    Ochiai,
    Tarantula,
    Jaccard,
    /// D* with exponent 2.
    Dstar2,
    /// D* with exponent 3.
    Dstar3,
}

impl Formula {
    pub const ALL: [Formula; 5] = [
        Formula::Ochiai,
        Formula::Tarantula,
        Formula::Jaccard,
        Formula::Dstar2,
        Formula::Dstar3,
    ];
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ochiai => write!(f, "ochiai"),
            Self::Tarantula => write!(f, "tarantula"),
            Self::Jaccard => write!(f, "jaccard"),
            Self::Dstar2 => write!(f, "dstar2"),
            Self::Dstar3 => write!(f, "dstar3"),
        }
    }
}

impl std::str::FromStr for Formula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::ALL
            .into_iter()
            .find(|formula| formula.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown formula '{}'", s))
    }
}

impl SuspiciousnessFormula for Formula {
    fn name(&self) -> &str {
        match self {
            Self::Ochiai => "ochiai",
            Self::Tarantula => "tarantula",
            Self::Jaccard => "jaccard",
            Self::Dstar2 => "dstar2",
            Self::Dstar3 => "dstar3",
        }
    }

    fn score(&self, counts: &CoverageCounts) -> f64 {
        let ef = counts.failed_covering as f64; // executed by failing tests
        let ep = counts.passed_covering as f64; // executed by passing tests
        let nf = counts.total_failed.saturating_sub(counts.failed_covering) as f64;

        match self {
            Self::Ochiai => {
                let denom = ((ef + nf) * (ef + ep)).sqrt();
                if denom > 0.0 {
                    ef / denom
                } else {
                    0.0
                }
            }
            Self::Tarantula => {
                let fail_ratio = if counts.total_failed > 0 {
                    ef / counts.total_failed as f64
                } else {
                    0.0
                };
                let pass_ratio = if counts.total_passed > 0 {
                    ep / counts.total_passed as f64
                } else {
                    0.0
                };
                if fail_ratio + pass_ratio > 0.0 {
                    fail_ratio / (fail_ratio + pass_ratio)
                } else {
                    0.0
                }
            }
            Self::Jaccard => {
                let denom = ef + nf + ep;
                if denom > 0.0 {
                    ef / denom
                } else {
                    0.0
                }
            }
            Self::Dstar2 => dstar(ef, ep, nf, 2),
            Self::Dstar3 => dstar(ef, ep, nf, 3),
        }
    }
}

fn dstar(ef: f64, ep: f64, nf: f64, exponent: i32) -> f64 {
    let denom = ep + nf;
    if denom > 0.0 {
        ef.powi(exponent) / denom
    } else if ef > 0.0 {
        f64::MAX
    } else {
        0.0
    }
}
