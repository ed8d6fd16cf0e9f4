//! Messages exchanged with the instrumented test runtime.
//!
//! The request tells the child which classes to instrument and which tests to
//! run; the payload is what it reports back once the suite has finished.

use crate::element::ProgramElementKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Which classes the instrumentation agent should (and should not) probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassParameters {
    #[serde(default)]
    pub classes_to_instrument: Vec<String>,
    #[serde(default)]
    pub packages_to_instrument: Vec<String>,
    #[serde(default)]
    pub classes_not_to_instrument: Vec<String>,
    #[serde(default)]
    pub packages_not_to_instrument: Vec<String>,
}

/// Which tests the child should (and should not) execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestParameters {
    #[serde(default)]
    pub tests_to_execute: Vec<String>,
    #[serde(default)]
    pub test_packages_to_execute: Vec<String>,
    #[serde(default)]
    pub tests_not_to_execute: Vec<String>,
    #[serde(default)]
    pub test_packages_not_to_execute: Vec<String>,
}

/// Instructions fetched by the child over the rendezvous channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub classes: ClassParameters,
    #[serde(default)]
    pub tests: TestParameters,
}

/// Kind of component the instrumentation reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    #[default]
    Statement,
    Method,
    Class,
}

/// Outcome of one executed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    pub passed: bool,
    /// Elements this test executed. Empty when the runtime only reports
    /// aggregate scores.
    #[serde(default, deserialize_with = "lenient_coverage")]
    pub coverage: Vec<ProgramElementKey>,
}

impl TestRecord {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
            coverage: Vec::new(),
        }
    }

    /// Stand-in for an entry that could not be decoded; never classified.
    pub fn malformed() -> Self {
        Self::new(String::new(), false)
    }

    pub fn covering(mut self, keys: impl IntoIterator<Item = ProgramElementKey>) -> Self {
        self.coverage.extend(keys);
        self
    }
}

/// One monitored program element. Fields default so that a partially
/// written record still parses and can be skipped by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub suspiciousness: Option<f64>,
    #[serde(default)]
    pub kind: ComponentKind,
}

impl ElementRecord {
    pub fn statement(class_name: impl Into<String>, line: u32, suspiciousness: f64) -> Self {
        Self {
            class_name: class_name.into(),
            line,
            suspiciousness: Some(suspiciousness),
            kind: ComponentKind::Statement,
        }
    }

    /// Stand-in for an entry that could not be decoded; never scored.
    pub fn malformed() -> Self {
        Self {
            class_name: String::new(),
            line: 0,
            suspiciousness: None,
            kind: ComponentKind::Statement,
        }
    }

    pub fn key(&self) -> ProgramElementKey {
        ProgramElementKey::new(self.class_name.clone(), self.line)
    }
}

/// Everything the child reports for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    #[serde(default, deserialize_with = "lenient_tests")]
    pub tests: Vec<TestRecord>,
    #[serde(default, deserialize_with = "lenient_elements")]
    pub elements: Vec<ElementRecord>,
}

impl ExecutionPayload {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty() && self.elements.is_empty()
    }
}

// Entries that fail to decode (wrong types, negative lines) are replaced by
// a malformed stand-in so one bad record cannot reject the whole payload.
// The collector counts and skips the stand-ins.

fn lenient_tests<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<TestRecord>, D::Error> {
    lenient_vec(deserializer, TestRecord::malformed)
}

fn lenient_elements<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ElementRecord>, D::Error> {
    lenient_vec(deserializer, ElementRecord::malformed)
}

fn lenient_coverage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ProgramElementKey>, D::Error> {
    lenient_vec(deserializer, || ProgramElementKey::new(String::new(), 0))
}

fn lenient_vec<'de, D, T>(deserializer: D, malformed: fn() -> T) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::debug!("Undecodable payload entry: {}", e);
                malformed()
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_payload() {
        let json = r#"{
            "tests": [{"name": "t1", "passed": true}],
            "elements": [{"class_name": "Foo.java", "line": 10, "suspiciousness": 0.9}]
        }"#;
        let payload: ExecutionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.tests, vec![TestRecord::new("t1", true)]);
        assert_eq!(
            payload.elements,
            vec![ElementRecord::statement("Foo.java", 10, 0.9)]
        );
    }

    #[test]
    fn test_parse_partial_element_record() {
        let json = r#"{"elements": [{"line": 3}]}"#;
        let payload: ExecutionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.elements.len(), 1);
        assert!(payload.elements[0].class_name.is_empty());
        assert_eq!(payload.elements[0].suspiciousness, None);
        assert!(!payload.elements[0].key().is_valid());
    }

    #[test]
    fn test_parse_component_kind() {
        let json = r#"{"class_name": "Foo", "line": 1, "kind": "method"}"#;
        let record: ElementRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, ComponentKind::Method);
    }

    #[test]
    fn test_parse_test_coverage() {
        let json = r#"{"name": "t", "passed": false,
            "coverage": [{"class_name": "Foo", "line": 2}]}"#;
        let record: TestRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.coverage, vec![ProgramElementKey::new("Foo", 2)]);
    }

    #[test]
    fn test_undecodable_entries_become_malformed() {
        let json = r#"{
            "tests": [
                {"name": "t1", "passed": true, "coverage": [
                    {"class_name": "Foo", "line": 2},
                    {"class_name": "Foo", "line": "3"}
                ]},
                {"name": "t2", "passed": "yes"}
            ],
            "elements": [
                {"class_name": "Foo.java", "line": 10, "suspiciousness": 0.9},
                {"class_name": "Foo.java", "line": -1, "suspiciousness": 0.5},
                {"class_name": null, "line": 4},
                {"class_name": "Foo.java", "line": 5, "suspiciousness": "high"}
            ]
        }"#;
        let payload: ExecutionPayload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.tests.len(), 2);
        assert_eq!(payload.tests[0].name, "t1");
        assert_eq!(
            payload.tests[0].coverage,
            vec![ProgramElementKey::new("Foo", 2), ProgramElementKey::new("", 0)]
        );
        assert_eq!(payload.tests[1], TestRecord::malformed());

        assert_eq!(payload.elements.len(), 4);
        assert_eq!(payload.elements[0], ElementRecord::statement("Foo.java", 10, 0.9));
        for record in &payload.elements[1..] {
            assert_eq!(record, &ElementRecord::malformed());
        }
    }

    #[test]
    fn test_empty_request_round_trips_defaults() {
        let request: ExecutionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, ExecutionRequest::default());
    }
}
