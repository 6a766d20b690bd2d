//! Per-service descriptive metadata.

use swarmwatch_cluster::{Service, ServiceId, ServiceMode, TaskState};
use swarmwatch_metrics::Labels;

/// Scheduling mode as exported in the `service_mode` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTag {
    Replicated,
    Global,
}

impl ModeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeTag::Replicated => "replicated",
            ModeTag::Global => "global",
        }
    }
}

impl From<ServiceMode> for ModeTag {
    fn from(mode: ServiceMode) -> Self {
        match mode {
            ServiceMode::Replicated { .. } => ModeTag::Replicated,
            ServiceMode::Global => ModeTag::Global,
        }
    }
}

/// An operator-selected service label mirrored onto both gauge families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomLabel {
    /// Label name as configured (may contain dots).
    pub name: String,
    /// `None` when the service does not carry the label.
    pub value: Option<String>,
}

/// Everything needed to label a service's series.
///
/// Built once per observation of the service and never mutated: an update
/// produces a new record that replaces the cached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub service_id: ServiceId,
    /// Stack namespace, empty when the service is not part of a stack.
    pub stack: String,
    pub service: String,
    /// Service object version; orders updates of the same service.
    pub version: u64,
    pub mode: ModeTag,
    /// One entry per configured custom label, in configuration order.
    pub custom_labels: Vec<CustomLabel>,
}

impl ServiceMetadata {
    pub fn from_service(service: &Service, custom_labels: &[String]) -> Self {
        Self {
            service_id: service.id.clone(),
            stack: service.stack().to_string(),
            service: service.name.clone(),
            version: service.version,
            mode: service.mode.into(),
            custom_labels: custom_labels
                .iter()
                .map(|name| CustomLabel {
                    name: name.clone(),
                    value: service.labels.get(name).cloned(),
                })
                .collect(),
        }
    }

    /// Labels of this service's `swarm_service_desired_replicas` series.
    pub fn desired_labels(&self) -> Labels {
        let mut labels = self.common_labels();
        labels.insert("service_version".to_string(), self.version.to_string());
        labels
    }

    /// Labels of this service's `swarm_service_replicas_state` series for `state`.
    pub fn state_labels(&self, state: TaskState) -> Labels {
        let mut labels = self.common_labels();
        labels.insert("state".to_string(), state.as_str().to_string());
        labels
    }

    fn common_labels(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert("stack".to_string(), self.stack.clone());
        labels.insert("service".to_string(), self.service.clone());
        labels.insert("service_mode".to_string(), self.mode.as_str().to_string());
        for custom in &self.custom_labels {
            // Absent labels are exported as empty values.
            labels.insert(
                custom.name.clone(),
                custom.value.clone().unwrap_or_default(),
            );
        }
        labels
    }
}
