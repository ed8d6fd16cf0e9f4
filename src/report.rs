//! Printable summary of one localization run.

use crate::localizer::FaultLocalizer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousLocation {
    pub class_name: String,
    pub line: u32,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalizationReport {
    /// RFC 3339, UTC
    pub generated_at: String,
    pub available: bool,
    pub threshold: f64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_output: Option<String>,
    pub passing_tests: Vec<String>,
    pub failing_tests: Vec<String>,
    /// Most suspicious first
    pub suspicious: Vec<SuspiciousLocation>,
}

impl LocalizationReport {
    pub fn new(localizer: &FaultLocalizer, threshold: f64) -> Self {
        Self::at(localizer, threshold, Utc::now())
    }

    fn at(localizer: &FaultLocalizer, threshold: f64, generated_at: DateTime<Utc>) -> Self {
        let suspicious = localizer
            .ranked_above(threshold)
            .into_iter()
            .map(|(key, score)| SuspiciousLocation {
                class_name: key.class_name().to_string(),
                line: key.line(),
                score,
            })
            .collect();

        Self {
            generated_at: generated_at.to_rfc3339(),
            available: localizer.is_available(),
            threshold,
            duration_ms: localizer.duration().as_millis() as u64,
            failure: localizer.failure().map(|f| f.error.to_string()),
            captured_output: localizer
                .failure()
                .and_then(|f| f.captured_output.clone()),
            passing_tests: localizer.passing_tests().iter().cloned().collect(),
            failing_tests: localizer.failing_tests().iter().cloned().collect(),
            suspicious,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();

        if let Some(failure) = &self.failure {
            let _ = writeln!(out, "Test execution failed: {}", failure);
            if let Some(output) = &self.captured_output {
                let _ = writeln!(out, "{}", output.trim_end());
            }
        }

        if !self.available {
            let _ = writeln!(out, "no suspicious locations found");
            return out;
        }

        let _ = writeln!(
            out,
            "{} passing, {} failing tests",
            self.passing_tests.len(),
            self.failing_tests.len()
        );
        for test in &self.failing_tests {
            let _ = writeln!(out, "  FAILED {}", test);
        }

        if self.suspicious.is_empty() {
            let _ = writeln!(
                out,
                "no suspicious locations found at threshold {}",
                self.threshold
            );
            return out;
        }

        let width = self
            .suspicious
            .iter()
            .map(|s| s.class_name.len() + 1 + s.line.to_string().len())
            .max()
            .unwrap_or(0);
        let _ = writeln!(out, "{:>5}  {:<width$}  SCORE", "RANK", "LOCATION");
        for (rank, location) in self.suspicious.iter().enumerate() {
            let position = format!("{}:{}", location.class_name, location.line);
            let _ = writeln!(
                out,
                "{:>5}  {:<width$}  {:.4}",
                rank + 1,
                position,
                location.score
            );
        }

        out
    }
}
