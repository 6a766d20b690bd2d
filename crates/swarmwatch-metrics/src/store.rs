//! Gauge store — the two swarm gauge families and their registry.
//!
//! Values are always observed through label maps keyed by the caller's
//! (unsanitized) names; the store sanitizes them with the same function
//! used to register the family labels.

use std::collections::{HashMap, HashSet};

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

use crate::error::{MetricsError, MetricsResult};
use crate::sanitize::{Labels, sanitize_label_name, sanitize_label_names, sanitize_labels};

/// Desired replica count per service version.
pub const DESIRED_REPLICAS: &str = "swarm_service_desired_replicas";

/// Replica count per service and lifecycle state.
pub const REPLICAS_STATE: &str = "swarm_service_replicas_state";

/// Built-in labels of [`DESIRED_REPLICAS`], custom labels follow.
pub const DESIRED_REPLICAS_LABELS: [&str; 4] = ["stack", "service", "service_mode", "service_version"];

/// Built-in labels of [`REPLICAS_STATE`], custom labels follow.
pub const REPLICAS_STATE_LABELS: [&str; 4] = ["stack", "service", "service_mode", "state"];

/// Names a custom label may not take after sanitizing.
pub const RESERVED_LABELS: [&str; 5] = ["stack", "service", "service_mode", "service_version", "state"];

/// Content type of [`GaugeStore::render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Check operator-supplied custom label names before any family is built.
///
/// Rejects empty names, names that are not valid Prometheus label names
/// once sanitized, names that shadow a built-in label, and names that
/// collide with each other after sanitizing.
pub fn validate_custom_labels(labels: &[String]) -> MetricsResult<()> {
    let mut seen = HashSet::new();

    for raw in labels {
        if raw.is_empty() {
            return Err(MetricsError::InvalidLabel("empty label name".to_string()));
        }

        let name = sanitize_label_name(raw);
        if !is_valid_label_name(&name) {
            return Err(MetricsError::InvalidLabel(format!(
                "{raw:?} is not a valid metric label name"
            )));
        }
        if RESERVED_LABELS.contains(&name.as_str()) {
            return Err(MetricsError::InvalidLabel(format!(
                "{raw:?} collides with built-in label {name:?}"
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(MetricsError::InvalidLabel(format!(
                "{raw:?} collides with another custom label as {name:?}"
            )));
        }
    }
    Ok(())
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    first_ok && !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The externally observable metric surface.
///
/// Cheap to clone; clones share the same registry and families.
#[derive(Clone)]
pub struct GaugeStore {
    registry: Registry,
    desired: GaugeVec,
    state: GaugeVec,
    /// Custom label names as configured (unsanitized), in registration order.
    custom_labels: Vec<String>,
}

impl GaugeStore {
    /// Build the registry and register both families with the given
    /// custom labels appended to their built-in labels.
    pub fn new(custom_labels: &[String]) -> MetricsResult<Self> {
        validate_custom_labels(custom_labels)?;

        let registry = Registry::new();
        let desired = register_family(
            &registry,
            DESIRED_REPLICAS,
            "Number of desired replicas for swarm services",
            &DESIRED_REPLICAS_LABELS,
            custom_labels,
        )?;
        let state = register_family(
            &registry,
            REPLICAS_STATE,
            "State of service replicas",
            &REPLICAS_STATE_LABELS,
            custom_labels,
        )?;

        debug!(custom_labels = custom_labels.len(), "swarm gauge families registered");

        Ok(Self {
            registry,
            desired,
            state,
            custom_labels: custom_labels.to_vec(),
        })
    }

    /// Configured custom label names (unsanitized).
    pub fn custom_labels(&self) -> &[String] {
        &self.custom_labels
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Set a `swarm_service_desired_replicas` series.
    pub fn set_desired_replicas(&self, labels: &Labels, value: f64) -> MetricsResult<()> {
        observe(&self.desired, labels, value)
    }

    /// Set a `swarm_service_replicas_state` series.
    pub fn set_replicas_state(&self, labels: &Labels, value: f64) -> MetricsResult<()> {
        observe(&self.state, labels, value)
    }

    /// Current value of a desired-replicas series, if it has been published.
    pub fn desired_replicas(&self, labels: &Labels) -> Option<f64> {
        self.lookup(DESIRED_REPLICAS, labels)
    }

    /// Current value of a replicas-state series, if it has been published.
    pub fn replicas_state(&self, labels: &Labels) -> Option<f64> {
        self.lookup(REPLICAS_STATE, labels)
    }

    /// Number of published series in a family.
    pub fn series_count(&self, family: &str) -> usize {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.get_name() == family)
            .map(|mf| mf.get_metric().len())
            .unwrap_or(0)
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn render(&self) -> MetricsResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| MetricsError::Encode(e.to_string()))
    }

    fn lookup(&self, family: &str, labels: &Labels) -> Option<f64> {
        let clean = sanitize_labels(labels);
        let families = self.registry.gather();
        let family = families.iter().find(|mf| mf.get_name() == family)?;

        family
            .get_metric()
            .iter()
            .find(|m| {
                let pairs = m.get_label();
                pairs.len() == clean.len()
                    && pairs
                        .iter()
                        .all(|p| clean.get(p.get_name()).map(String::as_str) == Some(p.get_value()))
            })
            .map(|m| m.get_gauge().get_value())
    }
}

fn register_family(
    registry: &Registry,
    name: &str,
    help: &str,
    builtin: &[&str],
    custom: &[String],
) -> MetricsResult<GaugeVec> {
    let custom = sanitize_label_names(custom);
    let mut names: Vec<&str> = builtin.to_vec();
    names.extend(custom.iter().map(String::as_str));

    let family = GaugeVec::new(Opts::new(name, help), &names)?;
    registry.register(Box::new(family.clone()))?;
    Ok(family)
}

fn observe(family: &GaugeVec, labels: &Labels, value: f64) -> MetricsResult<()> {
    let clean = sanitize_labels(labels);
    let view: HashMap<&str, &str> = clean
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    family.get_metric_with(&view)?.set(value);
    Ok(())
}
