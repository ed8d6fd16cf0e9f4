//! Public entry point for the repair engine.
//!
//! A [`FaultLocalizer`] runs the instrumented suite exactly once, builds the
//! spectrum, and from then on only answers queries. It never fails: when the
//! execution could not be completed it holds an empty spectrum together with
//! the reason, and [`FaultLocalizer::is_available`] reports `false`.

pub mod discover;

pub use discover::discover_classes;

use crate::config::LocalizationConfig;
use crate::element::ProgramElementKey;
use crate::engine::{ScoreSource, SuspiciousnessEngine, SuspiciousnessFormula};
use crate::error::LocalizationFailure;
use crate::payload::{ExecutionPayload, ExecutionRequest};
use crate::runner::{ExecutionJob, TestExecutor};
use crate::spectrum::{Spectrum, SpectrumCollector};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// The program under repair: what to instrument, which tests to run, and
/// where the compiled code lives.
#[derive(Debug, Clone, Default)]
pub struct LocalizationTarget {
    pub working_dir: PathBuf,
    pub source_classes_dir: PathBuf,
    pub test_classes_dir: PathBuf,
    pub dependencies: Vec<PathBuf>,
    pub request: ExecutionRequest,
}

impl LocalizationTarget {
    pub fn new(
        classes_to_instrument: impl IntoIterator<Item = String>,
        tests_to_execute: impl IntoIterator<Item = String>,
        source_classes_dir: impl Into<PathBuf>,
        test_classes_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut request = ExecutionRequest::default();
        request
            .classes
            .classes_to_instrument
            .extend(classes_to_instrument);
        request.tests.tests_to_execute.extend(tests_to_execute);
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            source_classes_dir: source_classes_dir.into(),
            test_classes_dir: test_classes_dir.into(),
            dependencies: Vec::new(),
            request,
        }
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = PathBuf>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn instrument_package(mut self, package: impl Into<String>) -> Self {
        self.request
            .classes
            .packages_to_instrument
            .push(package.into());
        self
    }

    pub fn skip_class(mut self, class_name: impl Into<String>) -> Self {
        self.request
            .classes
            .classes_not_to_instrument
            .push(class_name.into());
        self
    }

    pub fn skip_package(mut self, package: impl Into<String>) -> Self {
        self.request
            .classes
            .packages_not_to_instrument
            .push(package.into());
        self
    }

    pub fn execute_test_package(mut self, package: impl Into<String>) -> Self {
        self.request
            .tests
            .test_packages_to_execute
            .push(package.into());
        self
    }

    pub fn skip_test(mut self, test_class: impl Into<String>) -> Self {
        self.request
            .tests
            .tests_not_to_execute
            .push(test_class.into());
        self
    }

    pub fn skip_test_package(mut self, package: impl Into<String>) -> Self {
        self.request
            .tests
            .test_packages_not_to_execute
            .push(package.into());
        self
    }

    /// Compiled sources, compiled tests, then dependencies.
    pub fn job(&self) -> ExecutionJob {
        let mut classpath = vec![
            self.source_classes_dir.clone(),
            self.test_classes_dir.clone(),
        ];
        classpath.extend(self.dependencies.iter().cloned());
        ExecutionJob {
            working_dir: self.working_dir.clone(),
            classpath,
            request: self.request.clone(),
        }
    }
}

/// How scores are produced for the spectrum.
#[derive(Clone, Copy)]
pub enum Scoring<'a> {
    Precomputed,
    Formula(&'a dyn SuspiciousnessFormula),
}

/// Read-only view over one localization run.
#[derive(Debug)]
pub struct FaultLocalizer {
    engine: SuspiciousnessEngine,
    failure: Option<LocalizationFailure>,
    duration: Duration,
}

impl FaultLocalizer {
    /// Run the suite once with settings from the `[localization]` config.
    pub async fn run<E: TestExecutor>(
        target: &LocalizationTarget,
        executor: &E,
        config: &LocalizationConfig,
    ) -> Self {
        let collector = SpectrumCollector::new(config.excluded_failure_prefixes.clone());
        let scoring = match config.score_source {
            ScoreSource::Precomputed => Scoring::Precomputed,
            ScoreSource::Formula => Scoring::Formula(&config.formula),
        };
        Self::run_with(target, executor, &collector, scoring).await
    }

    pub async fn run_with<E: TestExecutor>(
        target: &LocalizationTarget,
        executor: &E,
        collector: &SpectrumCollector,
        scoring: Scoring<'_>,
    ) -> Self {
        let start = Instant::now();
        let job = target.job();

        let (payload, failure) = match executor.execute(&job).await {
            Ok(payload) => (payload, None),
            Err(failure) => {
                tracing::warn!("Fault localization unavailable: {}", failure);
                (ExecutionPayload::default(), Some(failure))
            }
        };

        let mut localizer = Self::from_payload(&payload, collector, scoring);
        localizer.failure = failure;
        localizer.duration = start.elapsed();

        tracing::info!(
            "Fault localization finished in {}ms: {} elements, {} passing, {} failing",
            localizer.duration.as_millis(),
            localizer.engine.spectrum().len(),
            localizer.passing_tests().len(),
            localizer.failing_tests().len()
        );

        localizer
    }

    /// Build directly from a payload that was obtained elsewhere.
    pub fn from_payload(
        payload: &ExecutionPayload,
        collector: &SpectrumCollector,
        scoring: Scoring<'_>,
    ) -> Self {
        let spectrum = collector.build(payload);
        let engine = match scoring {
            Scoring::Precomputed => SuspiciousnessEngine::new(spectrum),
            Scoring::Formula(formula) => SuspiciousnessEngine::with_formula(spectrum, formula),
        };
        Self {
            engine,
            failure: None,
            duration: Duration::ZERO,
        }
    }

    /// Locations scoring at least `threshold`, unordered.
    pub fn suspicious_above(&self, threshold: f64) -> HashMap<ProgramElementKey, f64> {
        self.engine.query(threshold)
    }

    /// Locations scoring at least `threshold`, most suspicious first.
    pub fn ranked_above(&self, threshold: f64) -> Vec<(ProgramElementKey, f64)> {
        self.engine.ranked_above(threshold)
    }

    pub fn passing_tests(&self) -> &BTreeSet<String> {
        self.engine.passing_tests()
    }

    pub fn failing_tests(&self) -> &BTreeSet<String> {
        self.engine.failing_tests()
    }

    pub fn spectrum(&self) -> &Spectrum {
        self.engine.spectrum()
    }

    /// False when no element could be scored; the caller should fall back.
    pub fn is_available(&self) -> bool {
        !self.engine.spectrum().is_empty()
    }

    /// Why the execution failed, if it did.
    pub fn failure(&self) -> Option<&LocalizationFailure> {
        self.failure.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl std::fmt::Debug for Scoring<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precomputed => write!(f, "Precomputed"),
            Self::Formula(formula) => write!(f, "Formula({})", formula.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Formula;
    use crate::error::LocalizationError;
    use crate::payload::{ElementRecord, TestRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns a canned payload and records what it was asked to run.
    struct CannedExecutor {
        payload: Option<ExecutionPayload>,
        calls: AtomicUsize,
        last_job: Mutex<Option<ExecutionJob>>,
    }

    impl CannedExecutor {
        fn returning(payload: ExecutionPayload) -> Self {
            Self {
                payload: Some(payload),
                calls: AtomicUsize::new(0),
                last_job: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                payload: None,
                calls: AtomicUsize::new(0),
                last_job: Mutex::new(None),
            }
        }
    }

    impl TestExecutor for CannedExecutor {
        async fn execute(
            &self,
            job: &ExecutionJob,
        ) -> Result<ExecutionPayload, LocalizationFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_job.lock().unwrap() = Some(job.clone());
            match &self.payload {
                Some(payload) => Ok(payload.clone()),
                None => Err(LocalizationFailure::with_output(
                    LocalizationError::Launch("java not found".to_string()),
                    "Error: could not find java".to_string(),
                )),
            }
        }
    }

    fn target() -> LocalizationTarget {
        LocalizationTarget::new(
            vec!["org.example.Foo".to_string()],
            vec!["org.example.FooTest".to_string()],
            "target/classes",
            "target/test-classes",
        )
        .with_working_dir("/work")
        .with_dependencies(vec![PathBuf::from("lib/junit.jar")])
    }

    fn scenario_a() -> ExecutionPayload {
        ExecutionPayload {
            tests: vec![TestRecord::new("t1", true), TestRecord::new("t2", false)],
            elements: vec![
                ElementRecord::statement("Foo.java", 10, 0.9),
                ElementRecord::statement("Foo.java", 20, 0.2),
            ],
        }
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    // =========================================================================
    // Target
    // =========================================================================

    #[test]
    fn test_target_job_classpath_order() {
        let job = target().job();
        assert_eq!(job.working_dir, PathBuf::from("/work"));
        assert_eq!(
            job.classpath,
            vec![
                PathBuf::from("target/classes"),
                PathBuf::from("target/test-classes"),
                PathBuf::from("lib/junit.jar"),
            ]
        );
        assert_eq!(
            job.request.classes.classes_to_instrument,
            vec!["org.example.Foo"]
        );
        assert_eq!(job.request.tests.tests_to_execute, vec!["org.example.FooTest"]);
    }

    #[test]
    fn test_target_parameter_builders() {
        let target = target()
            .instrument_package("org.example.util")
            .skip_class("org.example.Generated")
            .skip_package("org.example.gen")
            .execute_test_package("org.example.it")
            .skip_test("org.example.SlowTest")
            .skip_test_package("org.example.perf");

        let classes = &target.request.classes;
        assert_eq!(classes.packages_to_instrument, vec!["org.example.util"]);
        assert_eq!(classes.classes_not_to_instrument, vec!["org.example.Generated"]);
        assert_eq!(classes.packages_not_to_instrument, vec!["org.example.gen"]);
        let tests = &target.request.tests;
        assert_eq!(tests.test_packages_to_execute, vec!["org.example.it"]);
        assert_eq!(tests.tests_not_to_execute, vec!["org.example.SlowTest"]);
        assert_eq!(tests.test_packages_not_to_execute, vec!["org.example.perf"]);
    }

    // =========================================================================
    // Scenarios
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_basic_partition_and_threshold() {
        let executor = CannedExecutor::returning(scenario_a());
        let localizer =
            FaultLocalizer::run(&target(), &executor, &LocalizationConfig::default()).await;

        assert!(localizer.is_available());
        assert!(localizer.failure().is_none());
        assert_eq!(names(localizer.passing_tests()), vec!["t1"]);
        assert_eq!(names(localizer.failing_tests()), vec!["t2"]);

        let suspicious = localizer.suspicious_above(0.5);
        assert_eq!(suspicious.len(), 1);
        assert_eq!(
            suspicious.get(&ProgramElementKey::new("Foo.java", 10)),
            Some(&0.9)
        );
    }

    #[tokio::test]
    async fn test_scenario_meta_failure_dropped() {
        let payload = ExecutionPayload {
            tests: vec![
                TestRecord::new("junit.framework.TestSuite$1#warning", false),
                TestRecord::new("t1", true),
            ],
            elements: vec![ElementRecord::statement("Foo.java", 1, 0.1)],
        };
        let executor = CannedExecutor::returning(payload);
        let localizer =
            FaultLocalizer::run(&target(), &executor, &LocalizationConfig::default()).await;

        assert!(localizer.failing_tests().is_empty());
        assert_eq!(names(localizer.passing_tests()), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_scenario_duplicate_elements_last_wins() {
        let payload = ExecutionPayload {
            tests: vec![],
            elements: vec![
                ElementRecord::statement("Foo.java", 10, 0.1),
                ElementRecord::statement("Foo.java", 10, 0.6),
            ],
        };
        let executor = CannedExecutor::returning(payload);
        let localizer =
            FaultLocalizer::run(&target(), &executor, &LocalizationConfig::default()).await;

        let all = localizer.suspicious_above(0.0);
        assert_eq!(all.len(), 1);
        assert_eq!(all[&ProgramElementKey::new("Foo.java", 10)], 0.6);
    }

    #[tokio::test]
    async fn test_scenario_launch_failure_degrades() {
        let executor = CannedExecutor::failing();
        let localizer =
            FaultLocalizer::run(&target(), &executor, &LocalizationConfig::default()).await;

        assert!(!localizer.is_available());
        assert!(localizer.passing_tests().is_empty());
        assert!(localizer.failing_tests().is_empty());
        for threshold in [f64::NEG_INFINITY, 0.0, 0.5, 1.0] {
            assert!(localizer.suspicious_above(threshold).is_empty());
        }

        let failure = localizer.failure().unwrap();
        assert!(matches!(failure.error, LocalizationError::Launch(_)));
        assert_eq!(
            failure.captured_output.as_deref(),
            Some("Error: could not find java")
        );
    }

    // =========================================================================
    // Query layer properties
    // =========================================================================

    #[tokio::test]
    async fn test_construction_executes_exactly_once() {
        let executor = CannedExecutor::returning(scenario_a());
        let localizer =
            FaultLocalizer::run(&target(), &executor, &LocalizationConfig::default()).await;

        let first = localizer.suspicious_above(0.1);
        for _ in 0..5 {
            assert_eq!(localizer.suspicious_above(0.1), first);
            assert_eq!(names(localizer.passing_tests()), vec!["t1"]);
            assert_eq!(names(localizer.failing_tests()), vec!["t2"]);
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        let job = executor.last_job.lock().unwrap().clone().unwrap();
        assert_eq!(job, target().job());
    }

    #[tokio::test]
    async fn test_threshold_zero_and_monotonic() {
        let payload = ExecutionPayload {
            tests: vec![TestRecord::new("t", false)],
            elements: (1..=10)
                .map(|line| ElementRecord::statement("Bar.java", line, f64::from(line) / 10.0))
                .collect(),
        };
        let executor = CannedExecutor::returning(payload);
        let localizer =
            FaultLocalizer::run(&target(), &executor, &LocalizationConfig::default()).await;

        assert_eq!(localizer.suspicious_above(0.0).len(), 10);
        assert_eq!(localizer.suspicious_above(0.3).len(), 8);
        let mut previous = usize::MAX;
        for step in 0..=12 {
            let size = localizer.suspicious_above(f64::from(step) / 10.0).len();
            assert!(size <= previous);
            previous = size;
        }
    }

    #[tokio::test]
    async fn test_formula_scoring_from_config() {
        let faulty = ProgramElementKey::new("Foo", 3);
        let shared = ProgramElementKey::new("Foo", 4);
        let payload = ExecutionPayload {
            tests: vec![
                TestRecord::new("ok", true).covering([shared.clone()]),
                TestRecord::new("bad", false).covering([faulty.clone(), shared.clone()]),
            ],
            elements: vec![],
        };
        let config = LocalizationConfig {
            score_source: ScoreSource::Formula,
            formula: Formula::Ochiai,
            ..Default::default()
        };
        let executor = CannedExecutor::returning(payload);
        let localizer = FaultLocalizer::run(&target(), &executor, &config).await;

        let ranked = localizer.ranked_above(0.0);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, faulty);
        assert_eq!(ranked[0].1, 1.0);
    }

    #[test]
    fn test_from_payload_with_custom_prefixes() {
        let payload = ExecutionPayload {
            tests: vec![TestRecord::new("meta.Adapter#run", false)],
            elements: vec![],
        };
        let collector = SpectrumCollector::new(vec!["meta.".to_string()]);
        let localizer = FaultLocalizer::from_payload(&payload, &collector, Scoring::Precomputed);

        assert!(localizer.failing_tests().is_empty());
        assert!(!localizer.is_available());
        assert!(localizer.failure().is_none());
    }
}
