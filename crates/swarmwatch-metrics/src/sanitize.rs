//! Label name sanitizing.
//!
//! Service labels are dotted (`com.docker.stack.namespace`) but Prometheus
//! label names may not contain dots. Registration and observation both go
//! through [`sanitize_label_name`] so the two can never disagree.

use std::collections::BTreeMap;

/// Label name → value map used for observations, keyed by unsanitized names.
pub type Labels = BTreeMap<String, String>;

/// Replace every `.` with `_`. Idempotent.
pub fn sanitize_label_name(name: &str) -> String {
    name.replace('.', "_")
}

/// Sanitize a list of label names, preserving order.
pub fn sanitize_label_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|name| sanitize_label_name(name.as_ref()))
        .collect()
}

/// Sanitize the keys of a label map. Values are left untouched.
pub fn sanitize_labels(labels: &Labels) -> Labels {
    labels
        .iter()
        .map(|(name, value)| (sanitize_label_name(name), value.clone()))
        .collect()
}
