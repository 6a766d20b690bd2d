//! swarmwatch-metrics — the exported metric surface.
//!
//! Owns the Prometheus registry with the two swarm gauge families and the
//! label sanitizer every label name passes through, both when a family is
//! registered and when a value is observed.
//!
//! # Architecture
//!
//! ```text
//! GaugeStore
//!   ├── swarm_service_desired_replicas{stack, service, service_mode, service_version, ...}
//!   ├── swarm_service_replicas_state{stack, service, service_mode, state, ...}
//!   └── render() → text/plain for /metrics endpoint
//!
//! sanitize_label_name()  "com.docker.stack.namespace" → "com_docker_stack_namespace"
//! ```

pub mod error;
pub mod sanitize;
pub mod store;

pub use error::{MetricsError, MetricsResult};
pub use sanitize::{Labels, sanitize_label_name, sanitize_label_names, sanitize_labels};
pub use store::{
    CONTENT_TYPE, DESIRED_REPLICAS, DESIRED_REPLICAS_LABELS, GaugeStore, REPLICAS_STATE,
    REPLICAS_STATE_LABELS, RESERVED_LABELS, validate_custom_labels,
};
