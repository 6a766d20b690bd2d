//! Docker Engine API client.
//!
//! Speaks plain HTTP/1.1 to the engine over a unix socket or TCP, opening
//! one connection per request. Only the read-only swarm endpoints the
//! exporter needs are implemented.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{BoxFuture, ClusterApi, EventStream};
use crate::decode::LineDecoder;
use crate::error::{ClusterError, ClusterResult};
use crate::types::*;

/// Engine address used when `DOCKER_HOST` is not set.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// `{"type":["service","node"]}`, percent-encoded.
const EVENT_FILTERS: &str = "%7B%22type%22%3A%5B%22service%22%2C%22node%22%5D%7D";

const EVENT_BUFFER: usize = 256;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the Docker engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl DockerEndpoint {
    /// Parse a `DOCKER_HOST`-style address (`unix:///path` or `tcp://host:port`).
    pub fn parse(host: &str) -> ClusterResult<Self> {
        let host = host.trim();
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ClusterError::InvalidHost(host.to_string()));
            }
            return Ok(DockerEndpoint::Unix(PathBuf::from(path)));
        }

        let addr = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
            .map(|a| a.trim_end_matches('/'));
        match addr {
            Some(addr) if !addr.is_empty() => Ok(DockerEndpoint::Tcp(addr.to_string())),
            _ => Err(ClusterError::InvalidHost(format!(
                "{host} (expected unix:// or tcp://)"
            ))),
        }
    }

    /// Value of the `Host` header.
    fn authority(&self) -> &str {
        match self {
            DockerEndpoint::Unix(_) => "docker",
            DockerEndpoint::Tcp(addr) => addr,
        }
    }
}

/// [`ClusterApi`] implementation backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: DockerEndpoint,
    /// Applies to every request except the long-lived event stream body.
    timeout: Duration,
}

impl DockerClient {
    pub fn new(endpoint: DockerEndpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a client from a `DOCKER_HOST`-style address.
    pub fn from_host(host: &str) -> ClusterResult<Self> {
        Ok(Self::new(DockerEndpoint::parse(host)?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }

    async fn connect(&self) -> ClusterResult<SendRequest<Empty<Bytes>>> {
        match &self.endpoint {
            DockerEndpoint::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|e| ClusterError::Connect(format!("{addr}: {e}")))?;
                handshake(stream).await
            }
            #[cfg(unix)]
            DockerEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| ClusterError::Connect(format!("{}: {e}", path.display())))?;
                handshake(stream).await
            }
            #[cfg(not(unix))]
            DockerEndpoint::Unix(path) => Err(ClusterError::InvalidHost(format!(
                "unix sockets are not supported on this platform: {}",
                path.display()
            ))),
        }
    }

    /// Issue a GET and map non-2xx statuses to errors.
    async fn get(&self, path: &str) -> ClusterResult<Response<Incoming>> {
        let mut sender = self.connect().await?;

        let req = Request::builder()
            .method("GET")
            .uri(path)
            .header("host", self.endpoint.authority())
            .header("user-agent", concat!("swarmwatch/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
            .map_err(|e| ClusterError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClusterError::Http(format!("GET {path}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = error_message(resp).await;
        if status == StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound(message));
        }
        Err(ClusterError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<T> {
        tokio::time::timeout(self.timeout, self.fetch_json(path))
            .await
            .map_err(|_| ClusterError::Timeout(self.timeout))?
    }

    async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<T> {
        let resp = self.get(path).await?;
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClusterError::Http(format!("GET {path}: {e}")))?
            .to_bytes();
        serde_json::from_slice(&body).map_err(|e| ClusterError::Decode(format!("GET {path}: {e}")))
    }

    async fn services(&self) -> ClusterResult<Vec<Service>> {
        let services: Vec<WireService> = self.get_json("/services").await?;
        Ok(services.into_iter().map(Service::from).collect())
    }

    async fn nodes(&self) -> ClusterResult<Vec<Node>> {
        let nodes: Vec<WireNode> = self.get_json("/nodes").await?;
        Ok(nodes.into_iter().map(|n| Node { id: n.id }).collect())
    }

    async fn tasks(&self) -> ClusterResult<Vec<Task>> {
        let tasks: Vec<WireTask> = self.get_json("/tasks").await?;
        Ok(tasks.into_iter().filter_map(WireTask::into_task).collect())
    }

    async fn service(&self, id: &str) -> ClusterResult<Service> {
        let service: WireService = self.get_json(&format!("/services/{id}")).await?;
        Ok(Service::from(service))
    }

    async fn events(&self) -> ClusterResult<EventStream> {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = format!("/events?since={since}&filters={EVENT_FILTERS}");

        let resp = tokio::time::timeout(self.timeout, self.get(&path))
            .await
            .map_err(|_| ClusterError::Timeout(self.timeout))??;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(pump_events(resp.into_body(), tx));

        debug!(since, "subscribed to swarm events");
        Ok(rx)
    }
}

impl ClusterApi for DockerClient {
    fn list_services(&self) -> BoxFuture<'_, ClusterResult<Vec<Service>>> {
        Box::pin(self.services())
    }

    fn list_nodes(&self) -> BoxFuture<'_, ClusterResult<Vec<Node>>> {
        Box::pin(self.nodes())
    }

    fn list_tasks(&self) -> BoxFuture<'_, ClusterResult<Vec<Task>>> {
        Box::pin(self.tasks())
    }

    fn inspect_service<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ClusterResult<Service>> {
        Box::pin(self.service(id))
    }

    fn subscribe_events(&self) -> BoxFuture<'_, ClusterResult<EventStream>> {
        Box::pin(self.events())
    }
}

async fn handshake<S>(stream: S) -> ClusterResult<SendRequest<Empty<Bytes>>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ClusterError::Connect(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "docker connection closed with error");
        }
    });

    Ok(sender)
}

/// Best-effort extraction of the engine's `{"message": ...}` error body.
async fn error_message(resp: Response<Incoming>) -> String {
    let status = resp.status();
    let body = match resp.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return status.to_string(),
    };
    match serde_json::from_slice::<WireError>(&body) {
        Ok(err) => err.message,
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => String::from_utf8_lossy(&body).trim().to_string(),
    }
}

/// Forward decoded events from the streaming body until it ends.
async fn pump_events(mut body: Incoming, tx: mpsc::Sender<ClusterResult<ClusterEvent>>) {
    let mut decoder = LineDecoder::new();

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                let _ = tx
                    .send(Err(ClusterError::Http(format!("event stream: {e}"))))
                    .await;
                return;
            }
        };
        let Some(data) = frame.data_ref() else {
            continue;
        };

        let lines = match decoder.push(data) {
            Ok(lines) => lines,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        for line in lines {
            match parse_event(&line) {
                Ok(event) => {
                    if tx.send(Ok(event)).await.is_err() {
                        // Subscriber is gone.
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "skipping undecodable swarm event"),
            }
        }
    }

    let _ = tx.send(Err(ClusterError::StreamClosed)).await;
}

pub(crate) fn parse_event(line: &[u8]) -> ClusterResult<ClusterEvent> {
    let wire: WireEvent =
        serde_json::from_slice(line).map_err(|e| ClusterError::Decode(e.to_string()))?;
    Ok(ClusterEvent {
        kind: EventKind::parse(&wire.kind),
        action: EventAction::parse(&wire.action),
        actor_id: wire.actor.id,
        attributes: wire.actor.attributes.unwrap_or_default(),
    })
}

// ── Wire format ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireVersion {
    #[serde(default)]
    index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    version: WireVersion,
    spec: WireServiceSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireServiceSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    mode: WireMode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMode {
    #[serde(default)]
    replicated: Option<WireReplicated>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireReplicated {
    #[serde(default)]
    replicas: Option<u64>,
}

impl From<WireService> for Service {
    fn from(wire: WireService) -> Self {
        let mode = match wire.spec.mode.replicated {
            // The engine defaults an unset replica count to 1.
            Some(r) => ServiceMode::Replicated {
                replicas: r.replicas.unwrap_or(1),
            },
            None => ServiceMode::Global,
        };
        Service {
            id: wire.id,
            version: wire.version.index,
            name: wire.spec.name,
            labels: wire.spec.labels.unwrap_or_default(),
            mode,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireNode {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTask {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "ServiceID", default)]
    service_id: String,
    #[serde(default)]
    slot: Option<u64>,
    #[serde(default)]
    version: WireVersion,
    #[serde(default)]
    status: WireTaskStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTaskStatus {
    #[serde(default)]
    state: String,
}

impl WireTask {
    fn into_task(self) -> Option<Task> {
        let Some(state) = TaskState::parse(&self.status.state) else {
            debug!(task_id = %self.id, state = %self.status.state, "skipping task in unknown state");
            return None;
        };
        Some(Task {
            id: self.id,
            service_id: self.service_id,
            slot: self.slot,
            version: self.version.index,
            state,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor")]
    actor: WireActor,
}

#[derive(Debug, Deserialize)]
struct WireActor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: Option<HashMap<String, String>>,
}
