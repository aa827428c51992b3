//! Pull-based metric registry.
//!
//! Each [`MetricDefinition`] owns a [`Sampler`] that reads current external
//! state when the registry is collected. Nothing is stored between scrapes
//! except the summary window, which is reset at the start of every pass.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::error::{RegistryError, SamplingError};
use crate::exposition::{
    escape_help, format_labels, format_value, is_valid_label_name, is_valid_metric_name, quantile,
};

/// Quantiles rendered for every summary.
pub const SUMMARY_QUANTILES: [f64; 7] = [0.01, 0.05, 0.5, 0.9, 0.95, 0.99, 0.999];

/// Kind of a registered metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Summary,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
        }
    }
}

/// One value produced by a sampler.
///
/// For a gauge this is a series; for a summary it is an observation and
/// carries no labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    /// An unlabeled value.
    pub fn value(value: f64) -> Self {
        Self {
            labels: Vec::new(),
            value,
        }
    }

    /// A value with labels, in declaration order.
    pub fn labeled<K, V, I>(value: f64, labels: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
        }
    }
}

/// Reads the current value(s) of a metric.
///
/// Samplers must not mutate external state: two calls without an
/// intervening state change return the same samples.
pub trait Sampler: Send + Sync {
    fn sample(&self) -> Result<Vec<Sample>, SamplingError>;
}

impl<F> Sampler for F
where
    F: Fn() -> Result<Vec<Sample>, SamplingError> + Send + Sync,
{
    fn sample(&self) -> Result<Vec<Sample>, SamplingError> {
        self()
    }
}

/// A named metric with its sampler.
pub struct MetricDefinition {
    name: String,
    help: String,
    kind: MetricKind,
    labels: Vec<String>,
    sampler: Box<dyn Sampler>,
}

impl MetricDefinition {
    pub fn gauge<F>(name: impl Into<String>, help: impl Into<String>, sampler: F) -> Self
    where
        F: Fn() -> Result<Vec<Sample>, SamplingError> + Send + Sync + 'static,
    {
        Self::new(name, help, MetricKind::Gauge, sampler)
    }

    pub fn summary<F>(name: impl Into<String>, help: impl Into<String>, sampler: F) -> Self
    where
        F: Fn() -> Result<Vec<Sample>, SamplingError> + Send + Sync + 'static,
    {
        Self::new(name, help, MetricKind::Summary, sampler)
    }

    /// Create a definition from any [`Sampler`] implementation.
    pub fn new<S: Sampler + 'static>(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        sampler: S,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            labels: Vec::new(),
            sampler: Box::new(sampler),
        }
    }

    /// Declare the ordered label names of every series.
    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if !is_valid_metric_name(&self.name) {
            return Err(RegistryError::InvalidName(self.name.clone()));
        }
        if self.kind == MetricKind::Summary && !self.labels.is_empty() {
            return Err(RegistryError::UnsupportedLabels(self.name.clone()));
        }
        if let Some(label) = self.labels.iter().find(|l| !is_valid_label_name(l)) {
            return Err(RegistryError::InvalidLabel {
                metric: self.name.clone(),
                label: label.clone(),
            });
        }
        Ok(())
    }

    /// Sample and check the label names of every sample.
    fn sample(&self) -> Result<Vec<Sample>, SamplingError> {
        let samples = self.sampler.sample()?;

        for sample in &samples {
            let matches = sample.labels.len() == self.labels.len()
                && sample
                    .labels
                    .iter()
                    .zip(&self.labels)
                    .all(|((name, _), declared)| name == declared);

            if !matches {
                return Err(SamplingError::LabelMismatch {
                    metric: self.name.clone(),
                    expected: self.labels.clone(),
                    found: sample.labels.iter().map(|(k, _)| k.clone()).collect(),
                });
            }
        }

        Ok(samples)
    }
}

impl std::fmt::Debug for MetricDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// Registry counters. Not rendered, so scrapes stay byte-identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered metrics.
    pub definitions: usize,
    /// Completed `collect()` passes.
    pub scrapes: u64,
    /// Metrics omitted because their sampler failed.
    pub sampling_errors: u64,
}

/// Labels resolved on every collect, after the static default labels.
pub type LabelSource = Box<dyn Fn() -> Vec<(String, String)> + Send + Sync>;

/// Registry of metric definitions.
#[derive(Default)]
pub struct MetricRegistry {
    definitions: RwLock<Vec<MetricDefinition>>,
    default_labels: RwLock<Vec<(String, String)>>,
    label_source: RwLock<Option<LabelSource>>,
    /// Summary observations of the pass in progress. Held for the whole
    /// pass so concurrent scrapes never interleave.
    window: Mutex<Vec<f64>>,
    scrapes: AtomicU64,
    sampling_errors: AtomicU64,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("definitions", &self.definitions)
            .field("default_labels", &self.default_labels)
            .field("label_source", &self.label_source.read().is_some())
            .finish_non_exhaustive()
    }
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric. Names must be unique.
    pub fn register(&self, definition: MetricDefinition) -> Result<(), RegistryError> {
        definition.validate()?;

        let mut definitions = self.definitions.write();
        if definitions.iter().any(|d| d.name == definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }

        trace!(metric = %definition.name, kind = definition.kind.as_str(), "Registered metric");
        definitions.push(definition);
        Ok(())
    }

    /// Replace the labels appended to every series.
    ///
    /// A series that already carries a label of the same name keeps its own.
    pub fn set_default_labels<K, V, I>(&self, labels: I) -> Result<(), RegistryError>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let labels: Vec<(String, String)> = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        if let Some((label, _)) = labels.iter().find(|(k, _)| !is_valid_label_name(k)) {
            return Err(RegistryError::InvalidLabel {
                metric: "default".to_string(),
                label: label.clone(),
            });
        }

        *self.default_labels.write() = labels;
        Ok(())
    }

    /// Install labels that are looked up on every collect.
    ///
    /// They follow the static default labels and never override them. A
    /// label with an invalid name is skipped with a warning.
    pub fn set_label_source<F>(&self, source: F)
    where
        F: Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    {
        *self.label_source.write() = Some(Box::new(source));
    }

    /// Remove every definition, default label and label source.
    pub fn clear(&self) {
        self.definitions.write().clear();
        self.default_labels.write().clear();
        *self.label_source.write() = None;
    }

    fn resolve_default_labels(&self) -> Vec<(String, String)> {
        let mut labels = self.default_labels.read().clone();
        if let Some(source) = self.label_source.read().as_ref() {
            for (name, value) in source() {
                if !is_valid_label_name(&name) {
                    warn!(label = %name, "Invalid dynamic label name, skipped");
                } else if !labels.iter().any(|(k, _)| *k == name) {
                    labels.push((name, value));
                }
            }
        }
        labels
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    /// Registered metric names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.definitions
            .read()
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            definitions: self.len(),
            scrapes: self.scrapes.load(Ordering::Relaxed),
            sampling_errors: self.sampling_errors.load(Ordering::Relaxed),
        }
    }

    /// Sample every metric in registration order and render the exposition
    /// text. A failing sampler omits only its own metric.
    pub fn collect(&self) -> String {
        let mut window = self.window.lock();
        let definitions = self.definitions.read();
        let default_labels = self.resolve_default_labels();

        let mut output = String::with_capacity(definitions.len() * 128);

        for definition in definitions.iter() {
            let samples = match definition.sample() {
                Ok(samples) => samples,
                Err(e) => {
                    self.sampling_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(metric = %definition.name, error = %e, "Sampling failed, metric omitted");
                    continue;
                }
            };

            writeln!(
                output,
                "# HELP {} {}",
                definition.name,
                escape_help(&definition.help)
            )
            .ok();
            writeln!(
                output,
                "# TYPE {} {}",
                definition.name,
                definition.kind.as_str()
            )
            .ok();

            match definition.kind {
                MetricKind::Gauge => {
                    for sample in samples {
                        let labels = with_defaults(sample.labels, &default_labels);
                        writeln!(
                            output,
                            "{}{} {}",
                            definition.name,
                            format_labels(&labels),
                            format_value(sample.value)
                        )
                        .ok();
                    }
                }
                MetricKind::Summary => {
                    window.clear();
                    window.extend(samples.iter().map(|s| s.value));
                    window.sort_by(f64::total_cmp);
                    render_summary(&mut output, &definition.name, &window, &default_labels);
                }
            }
        }

        self.scrapes.fetch_add(1, Ordering::Relaxed);
        output
    }
}

fn with_defaults(
    mut labels: Vec<(String, String)>,
    defaults: &[(String, String)],
) -> Vec<(String, String)> {
    for (k, v) in defaults {
        if !labels.iter().any(|(lk, _)| lk == k) {
            labels.push((k.clone(), v.clone()));
        }
    }
    labels
}

fn render_summary(
    output: &mut String,
    name: &str,
    sorted: &[f64],
    default_labels: &[(String, String)],
) {
    for q in SUMMARY_QUANTILES {
        let labels = with_defaults(
            vec![("quantile".to_string(), q.to_string())],
            default_labels,
        );
        writeln!(
            output,
            "{}{} {}",
            name,
            format_labels(&labels),
            format_value(quantile(sorted, q))
        )
        .ok();
    }

    let labels = format_labels(default_labels);
    let sum: f64 = sorted.iter().sum();
    writeln!(output, "{}_sum{} {}", name, labels, format_value(sum)).ok();
    writeln!(output, "{}_count{} {}", name, labels, sorted.len()).ok();
}
