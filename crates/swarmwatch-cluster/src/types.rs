//! Swarm domain types.
//!
//! These are the exporter's own view of the cluster: only the fields the
//! reconciliation engine needs survive decoding from the Engine API.

use std::collections::HashMap;
use std::fmt;

/// Unique identifier of a swarm service.
pub type ServiceId = String;

/// Unique identifier of a swarm node.
pub type NodeId = String;

/// Service label set by `docker stack deploy`.
pub const STACK_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";

// ── Services ──────────────────────────────────────────────────────

/// Scheduling mode of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// A fixed number of replicas.
    Replicated { replicas: u64 },
    /// One replica per node.
    Global,
}

impl ServiceMode {
    /// Label value used on exported metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMode::Replicated { .. } => "replicated",
            ServiceMode::Global => "global",
        }
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A swarm service definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    /// `Version.Index` of the service object; grows on every update.
    pub version: u64,
    pub name: String,
    /// Service (spec annotation) labels.
    pub labels: HashMap<String, String>,
    pub mode: ServiceMode,
}

impl Service {
    /// Stack the service was deployed with, or `""` when unmanaged.
    pub fn stack(&self) -> &str {
        self.labels
            .get(STACK_NAMESPACE_LABEL)
            .map(String::as_str)
            .unwrap_or("")
    }
}

// ── Nodes ─────────────────────────────────────────────────────────

/// A swarm member node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
}

// ── Tasks ─────────────────────────────────────────────────────────

/// Lifecycle state of a task, as reported by the swarm orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskState {
    New,
    Allocated,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Ready,
    Starting,
    Running,
    Complete,
    Shutdown,
    Failed,
    Rejected,
    Remove,
    Orphaned,
}

impl TaskState {
    /// Number of known lifecycle states.
    pub const COUNT: usize = 15;

    /// Every lifecycle state, in orchestrator order.
    pub const ALL: [TaskState; TaskState::COUNT] = [
        TaskState::New,
        TaskState::Allocated,
        TaskState::Pending,
        TaskState::Assigned,
        TaskState::Accepted,
        TaskState::Preparing,
        TaskState::Ready,
        TaskState::Starting,
        TaskState::Running,
        TaskState::Complete,
        TaskState::Shutdown,
        TaskState::Failed,
        TaskState::Rejected,
        TaskState::Remove,
        TaskState::Orphaned,
    ];

    /// Wire name of the state (also the `state` label value).
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::New => "new",
            TaskState::Allocated => "allocated",
            TaskState::Pending => "pending",
            TaskState::Assigned => "assigned",
            TaskState::Accepted => "accepted",
            TaskState::Preparing => "preparing",
            TaskState::Ready => "ready",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Complete => "complete",
            TaskState::Shutdown => "shutdown",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
            TaskState::Remove => "remove",
            TaskState::Orphaned => "orphaned",
        }
    }

    /// Position of the state in [`TaskState::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a wire name. Returns `None` for states this build does not know.
    pub fn parse(s: &str) -> Option<Self> {
        TaskState::ALL.into_iter().find(|state| state.as_str() == s)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One replica instance of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub service_id: ServiceId,
    /// Replica slot; `None` for global services.
    pub slot: Option<u64>,
    pub version: u64,
    pub state: TaskState,
}

// ── Events ────────────────────────────────────────────────────────

/// Subject type of a cluster event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Service,
    Node,
    Other(String),
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "service" => EventKind::Service,
            "node" => EventKind::Node,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Service => "service",
            EventKind::Node => "node",
            EventKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the event subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    Create,
    Update,
    Remove,
    Other(String),
}

impl EventAction {
    pub fn parse(s: &str) -> Self {
        match s {
            "create" => EventAction::Create,
            "update" => EventAction::Update,
            "remove" => EventAction::Remove,
            other => EventAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Remove => "remove",
            EventAction::Other(s) => s,
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification from the cluster event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    pub kind: EventKind,
    pub action: EventAction,
    /// ID of the object the event is about.
    pub actor_id: String,
    pub attributes: HashMap<String, String>,
}

impl ClusterEvent {
    pub fn new(kind: EventKind, action: EventAction, actor_id: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            actor_id: actor_id.into(),
            attributes: HashMap::new(),
        }
    }

    /// The `name` attribute, when the engine provided one.
    pub fn actor_name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_names_round_trip() {
        for state in TaskState::ALL {
            assert_eq!(TaskState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TaskState::parse("exploded"), None);
    }

    #[test]
    fn task_state_index_matches_position() {
        for (i, state) in TaskState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn stack_defaults_to_empty() {
        let mut svc = Service {
            id: "svc-1".into(),
            version: 1,
            name: "web".into(),
            labels: HashMap::new(),
            mode: ServiceMode::Global,
        };
        assert_eq!(svc.stack(), "");

        svc.labels
            .insert(STACK_NAMESPACE_LABEL.into(), "shop".into());
        assert_eq!(svc.stack(), "shop");
    }

    #[test]
    fn event_kinds_and_actions_parse() {
        assert_eq!(EventKind::parse("service"), EventKind::Service);
        assert_eq!(EventKind::parse("node"), EventKind::Node);
        assert_eq!(EventKind::parse("network"), EventKind::Other("network".into()));
        assert_eq!(EventAction::parse("remove"), EventAction::Remove);
        assert_eq!(EventAction::parse("kill").as_str(), "kill");
    }
}
