//! In-memory cluster for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use swarmwatch_cluster::{
    BoxFuture, ClusterApi, ClusterError, ClusterEvent, ClusterResult, EventStream, Node, Service,
    ServiceMode, Task,
};

pub(crate) fn replicated(id: &str, name: &str, version: u64, replicas: u64) -> Service {
    Service {
        id: id.to_string(),
        version,
        name: name.to_string(),
        labels: HashMap::new(),
        mode: ServiceMode::Replicated { replicas },
    }
}

pub(crate) fn global(id: &str, name: &str, version: u64) -> Service {
    Service {
        mode: ServiceMode::Global,
        ..replicated(id, name, version, 0)
    }
}

/// A scripted inspect response: wait, then answer with this definition.
type Scripted = (Duration, ClusterResult<Service>);

#[derive(Default)]
pub(crate) struct FakeCluster {
    services: Mutex<HashMap<String, Service>>,
    nodes: Mutex<usize>,
    tasks: Mutex<Vec<Task>>,
    fail_tasks: AtomicBool,
    scripted: Mutex<HashMap<String, VecDeque<Scripted>>>,
    events: Mutex<Option<EventStream>>,
    inspect_calls: AtomicUsize,
}

impl FakeCluster {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_service(&self, service: Service) {
        self.services
            .lock()
            .unwrap()
            .insert(service.id.clone(), service);
    }

    pub(crate) fn remove_service(&self, id: &str) {
        self.services.lock().unwrap().remove(id);
    }

    pub(crate) fn set_nodes(&self, nodes: usize) {
        *self.nodes.lock().unwrap() = nodes;
    }

    pub(crate) fn set_tasks(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub(crate) fn fail_task_listing(&self, fail: bool) {
        self.fail_tasks.store(fail, Ordering::SeqCst);
    }

    /// Queue a delayed inspect answer for `id`; answers are consumed in order.
    pub(crate) fn script_inspect(&self, id: &str, delay: Duration, answer: ClusterResult<Service>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back((delay, answer));
    }

    /// Hand out the sending side of the next event subscription.
    pub(crate) fn event_channel(&self) -> mpsc::Sender<ClusterResult<ClusterEvent>> {
        let (tx, rx) = mpsc::channel(64);
        *self.events.lock().unwrap() = Some(rx);
        tx
    }

    pub(crate) fn inspect_calls(&self) -> usize {
        self.inspect_calls.load(Ordering::SeqCst)
    }
}

impl ClusterApi for FakeCluster {
    fn list_services(&self) -> BoxFuture<'_, ClusterResult<Vec<Service>>> {
        let services: ClusterResult<Vec<Service>> =
            Ok(self.services.lock().unwrap().values().cloned().collect());
        Box::pin(std::future::ready(services))
    }

    fn list_nodes(&self) -> BoxFuture<'_, ClusterResult<Vec<Node>>> {
        let count = *self.nodes.lock().unwrap();
        let nodes: ClusterResult<Vec<Node>> = Ok((0..count)
            .map(|n| Node {
                id: format!("node-{n}"),
            })
            .collect());
        Box::pin(std::future::ready(nodes))
    }

    fn list_tasks(&self) -> BoxFuture<'_, ClusterResult<Vec<Task>>> {
        let tasks = if self.fail_tasks.load(Ordering::SeqCst) {
            Err(ClusterError::Http("task listing unavailable".to_string()))
        } else {
            Ok(self.tasks.lock().unwrap().clone())
        };
        Box::pin(std::future::ready(tasks))
    }

    fn inspect_service<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ClusterResult<Service>> {
        self.inspect_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        let (delay, answer) = scripted.unwrap_or_else(|| {
            let answer = self
                .services
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ClusterError::NotFound(format!("service {id}")));
            (Duration::ZERO, answer)
        });

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            answer
        })
    }

    fn subscribe_events(&self) -> BoxFuture<'_, ClusterResult<EventStream>> {
        let stream = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or(ClusterError::StreamClosed);
        Box::pin(std::future::ready(stream))
    }
}
